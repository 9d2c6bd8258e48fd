use std::sync::Arc;

use crate::ai::{ChatBackend, ChatRequest, GroundedChat};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::legacy::run_legacy_import;
use crate::models::{generate_id, Message, NewSource, Notebook, Role, Settings, Source, SourceType};
use crate::prefs::{FilePreferences, Preferences};
use crate::services::FileDescriptor;
use crate::store::NotebookStore;

pub const DEFAULT_NOTEBOOK_ID: &str = "default";
pub const DEFAULT_NOTEBOOK_NAME: &str = "Untitled notebook";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotebookState {
    pub notebook: Notebook,
    pub sources: Vec<Source>,
    pub messages: Vec<Message>,
}

pub async fn load_notebooks(store: &NotebookStore) -> Result<Vec<NotebookState>> {
    let mut notebooks = Vec::new();
    for notebook in store.list_notebooks().await? {
        let sources = store.list_sources(&notebook.id).await?;
        let messages = store.list_messages(&notebook.id).await?;
        notebooks.push(NotebookState {
            notebook,
            sources,
            messages,
        });
    }
    Ok(notebooks)
}

/// Every mutation writes to the store before touching `notebooks`.
pub struct App {
    // Data
    pub notebooks: Vec<NotebookState>,
    pub settings: Settings,

    // UI State
    pub current_notebook_id: Option<String>,

    // Services
    store: NotebookStore,
    chat: Arc<dyn ChatBackend>,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let store = NotebookStore::open(&config.db_path).await?;
        let prefs = FilePreferences::new(&config.prefs_path);
        let chat: Arc<dyn ChatBackend> = Arc::new(GroundedChat::new(config)?);
        Self::start(store, &prefs, chat).await
    }

    pub async fn start(
        store: NotebookStore,
        prefs: &dyn Preferences,
        chat: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        if let Err(e) = run_legacy_import(&store, prefs).await {
            tracing::error!("Legacy import failed: {}", e);
        }

        let mut notebooks = load_notebooks(&store).await?;
        if notebooks.is_empty() {
            let notebook = store
                .create_notebook(DEFAULT_NOTEBOOK_ID, DEFAULT_NOTEBOOK_NAME)
                .await?;
            tracing::info!("Created default notebook");
            notebooks.push(NotebookState {
                notebook,
                sources: Vec::new(),
                messages: Vec::new(),
            });
        }

        let settings = store.get_settings().await?;
        let current_notebook_id = notebooks.first().map(|n| n.notebook.id.clone());

        Ok(Self {
            notebooks,
            settings,
            current_notebook_id,
            store,
            chat,
        })
    }

    pub fn store(&self) -> &NotebookStore {
        &self.store
    }

    pub async fn shutdown(self) -> Result<()> {
        self.store.close().await
    }

    fn index_of(&self, notebook_id: &str) -> Result<usize> {
        self.notebooks
            .iter()
            .position(|n| n.notebook.id == notebook_id)
            .ok_or_else(|| AppError::NotebookNotFound(notebook_id.to_string()))
    }

    pub fn notebook(&self, notebook_id: &str) -> Option<&NotebookState> {
        self.notebooks.iter().find(|n| n.notebook.id == notebook_id)
    }

    pub fn current_notebook(&self) -> Option<&NotebookState> {
        self.current_notebook_id
            .as_deref()
            .and_then(|id| self.notebook(id))
    }

    pub fn select_notebook(&mut self, notebook_id: &str) -> Result<()> {
        self.index_of(notebook_id)?;
        self.current_notebook_id = Some(notebook_id.to_string());
        Ok(())
    }

    // Notebooks

    pub async fn create_notebook(&mut self, name: &str) -> Result<String> {
        let notebook = self.store.create_notebook(&generate_id(), name).await?;
        let id = notebook.id.clone();
        self.notebooks.insert(
            0,
            NotebookState {
                notebook,
                sources: Vec::new(),
                messages: Vec::new(),
            },
        );
        self.current_notebook_id = Some(id.clone());
        Ok(id)
    }

    pub async fn rename_notebook(&mut self, notebook_id: &str, name: &str) -> Result<()> {
        let index = self.index_of(notebook_id)?;
        self.store.rename_notebook(notebook_id, name).await?;
        self.notebooks[index].notebook.name = name.to_string();
        Ok(())
    }

    pub async fn delete_notebook(&mut self, notebook_id: &str) -> Result<()> {
        let index = self.index_of(notebook_id)?;
        self.store.delete_notebook(notebook_id).await?;
        self.notebooks.remove(index);

        if self.current_notebook_id.as_deref() == Some(notebook_id) {
            self.current_notebook_id = self.notebooks.first().map(|n| n.notebook.id.clone());
        }
        Ok(())
    }

    // Sources

    pub async fn add_sources(&mut self, notebook_id: &str, files: Vec<FileDescriptor>) -> Result<Vec<Source>> {
        let index = self.index_of(notebook_id)?;
        let mut added = Vec::with_capacity(files.len());
        for file in files {
            let source = self
                .store
                .upsert_source(file.into_new_source(), notebook_id)
                .await?;
            self.notebooks[index].sources.push(source.clone());
            added.push(source);
        }
        Ok(added)
    }

    pub async fn add_note(&mut self, notebook_id: &str, title: &str) -> Result<Source> {
        let index = self.index_of(notebook_id)?;
        let note = NewSource {
            id: generate_id(),
            name: title.to_string(),
            source_type: SourceType::Note,
            content: String::new(),
        };
        let source = self.store.upsert_source(note, notebook_id).await?;
        self.notebooks[index].sources.push(source.clone());
        Ok(source)
    }

    pub async fn update_source_content(
        &mut self,
        notebook_id: &str,
        source_id: &str,
        content: &str,
    ) -> Result<Source> {
        let index = self.index_of(notebook_id)?;
        let position = self.notebooks[index]
            .sources
            .iter()
            .position(|s| s.id == source_id)
            .ok_or_else(|| AppError::SourceNotFound(source_id.to_string()))?;

        let replacement = self.notebooks[index].sources[position].with_content(content);
        let stored = self.store.upsert_source(replacement, notebook_id).await?;
        self.notebooks[index].sources[position] = stored.clone();
        Ok(stored)
    }

    pub async fn delete_source(&mut self, notebook_id: &str, source_id: &str) -> Result<()> {
        let index = self.index_of(notebook_id)?;
        let position = self.notebooks[index]
            .sources
            .iter()
            .position(|s| s.id == source_id)
            .ok_or_else(|| AppError::SourceNotFound(source_id.to_string()))?;

        self.store.delete_source(source_id).await?;
        self.notebooks[index].sources.remove(position);
        Ok(())
    }

    // Chat

    /// The question is stored before the chat backend is called.
    pub async fn send_message(&mut self, notebook_id: &str, text: &str) -> Result<Message> {
        if text.trim().is_empty() {
            return Err(AppError::InvalidArgument("message must not be empty".to_string()));
        }
        let index = self.index_of(notebook_id)?;

        let question = self.store.append_message(notebook_id, Role::User, text).await?;
        self.notebooks[index].messages.push(question);

        let state = &self.notebooks[index];
        let request = ChatRequest::for_notebook(&self.settings, &state.messages, &state.sources);
        tracing::info!(
            "Asking {} with {} sources",
            request.provider,
            request.sources.len()
        );
        let reply_text = self.chat.generate(&request).await;

        let reply = self
            .store
            .append_message(notebook_id, Role::Ai, &reply_text)
            .await?;
        self.notebooks[index].messages.push(reply.clone());
        Ok(reply)
    }

    pub async fn clear_messages(&mut self, notebook_id: &str) -> Result<()> {
        let index = self.index_of(notebook_id)?;
        self.store.clear_messages(notebook_id).await?;
        self.notebooks[index].messages.clear();
        Ok(())
    }

    // Settings

    pub async fn save_settings(&mut self, settings: Settings) -> Result<()> {
        if let Err(e) = self.store.save_settings(&settings).await {
            // Some keys may already be written; pick up whatever the store now holds.
            match self.store.get_settings().await {
                Ok(stored) => self.settings = stored,
                Err(reload) => tracing::error!("Failed to reload settings: {}", reload),
            }
            return Err(e);
        }
        self.settings = settings;
        Ok(())
    }
}
