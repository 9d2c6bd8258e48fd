use std::path::PathBuf;

use notebook_lm::app::NotebookState;
use notebook_lm::services::read_files;
use notebook_lm::{App, AppError, Config, Result};

const USAGE: &str = "Usage:
  notebook-lm                                 list notebooks
  notebook-lm --new <name>                    create a notebook
  notebook-lm --add <notebook-id> <file>...   add .txt/.md/.pdf sources
  notebook-lm --ask <notebook-id> <question>  ask about a notebook's sources
  notebook-lm --clear <notebook-id>           clear a notebook's chat
  notebook-lm --delete <notebook-id>          delete a notebook";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Load configuration
    let config = Config::load()?;

    // Initialize app; a store that cannot be opened ends the process
    let mut app = match App::new(&config).await {
        Ok(app) => app,
        Err(e @ AppError::StoreOpen { .. }) => {
            eprintln!("Cannot open notebook store: {}", e);
            std::process::exit(2);
        }
        Err(e) => return Err(e),
    };

    let result = run_command(&mut app, &args).await;
    app.shutdown().await?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_command(app: &mut App, args: &[String]) -> Result<()> {
    match args {
        [] => {
            for state in &app.notebooks {
                print_notebook(state);
            }
        }
        [flag, name @ ..] if flag == "--new" && !name.is_empty() => {
            let id = app.create_notebook(&name.join(" ")).await?;
            println!("Created notebook {}", id);
        }
        [flag, id, files @ ..] if flag == "--add" && !files.is_empty() => {
            let paths = files.iter().map(PathBuf::from).collect();
            let added = app.add_sources(id, read_files(paths).await).await?;
            for source in &added {
                println!("Added {} ({})", source.name, source.source_type);
            }
        }
        [flag, id, question @ ..] if flag == "--ask" && !question.is_empty() => {
            let reply = app.send_message(id, &question.join(" ")).await?;
            println!("{}", reply.content);
        }
        [flag, id] if flag == "--clear" => {
            app.clear_messages(id).await?;
            println!("Cleared chat of {}", id);
        }
        [flag, id] if flag == "--delete" => {
            app.delete_notebook(id).await?;
            println!("Deleted notebook {}", id);
        }
        _ => return Err(AppError::InvalidArgument(USAGE.to_string())),
    }
    Ok(())
}

fn print_notebook(state: &NotebookState) {
    println!(
        "{}  {}  ({} sources, {} messages, created {})",
        state.notebook.id,
        state.notebook.name,
        state.sources.len(),
        state.messages.len(),
        state.notebook.created_at.format("%Y-%m-%d %H:%M")
    );
}
