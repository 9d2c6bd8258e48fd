use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{
    NewSource, Role, SourceType, API_KEYS_KEY, SELECTED_MODELS_KEY, SELECTED_PROVIDER_KEY,
};
use crate::prefs::Preferences;
use crate::store::{decode_settings, NotebookStore};

pub const MIGRATION_MARKER: &str = "sqlite_migrated";
pub const LEGACY_NOTEBOOKS_KEY: &str = "notebooks";

#[derive(Debug, Deserialize)]
struct LegacyNotebook {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    sources: Vec<Value>,
    #[serde(default)]
    messages: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct LegacySource {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    source_type: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct LegacyMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub ran: bool,
    pub notebooks: usize,
    pub sources: usize,
    pub messages: usize,
    pub settings: bool,
    pub failures: usize,
}

pub async fn run_legacy_import(
    store: &NotebookStore,
    prefs: &dyn Preferences,
) -> Result<ImportReport> {
    if prefs.get(MIGRATION_MARKER)?.is_some() {
        tracing::debug!("Legacy import already completed");
        return Ok(ImportReport::default());
    }

    let mut report = ImportReport {
        ran: true,
        ..ImportReport::default()
    };

    if let Some(raw) = prefs.get(LEGACY_NOTEBOOKS_KEY)? {
        match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(entries) => {
                tracing::info!("Importing {} legacy notebooks", entries.len());
                for entry in entries {
                    let parsed = parse_entry::<LegacyNotebook>("notebook", entry, &mut report);
                    if let Some(notebook) = parsed {
                        replay_notebook(store, notebook, &mut report).await;
                    }
                }
            }
            Err(e) => {
                tracing::warn!("Legacy notebook snapshot is unreadable: {}", e);
                report.failures += 1;
            }
        }
    }

    replay_settings(store, prefs, &mut report).await?;

    prefs.set(MIGRATION_MARKER, "true")?;

    if report.failures > 0 {
        tracing::warn!(
            "Legacy import finished with {} failures; those entries will not be retried",
            report.failures
        );
    } else {
        tracing::info!(
            "Legacy import finished: {} notebooks, {} sources, {} messages",
            report.notebooks,
            report.sources,
            report.messages
        );
    }

    Ok(report)
}

// A malformed entry is skipped on its own; its siblings still replay.
fn parse_entry<T: DeserializeOwned>(kind: &str, entry: Value, report: &mut ImportReport) -> Option<T> {
    match serde_json::from_value(entry) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Skipping malformed legacy {}: {}", kind, e);
            report.failures += 1;
            None
        }
    }
}

async fn replay_notebook(store: &NotebookStore, notebook: LegacyNotebook, report: &mut ImportReport) {
    match store.create_notebook(&notebook.id, &notebook.name).await {
        Ok(_) => report.notebooks += 1,
        Err(e) => {
            tracing::warn!("Failed to import notebook {}: {}", notebook.id, e);
            report.failures += 1;
        }
    }

    for entry in notebook.sources {
        let Some(source) = parse_entry::<LegacySource>("source", entry, report) else {
            continue;
        };
        let source_type = match source.source_type.parse::<SourceType>() {
            Ok(source_type) => source_type,
            Err(e) => {
                tracing::warn!("Skipping legacy source {}: {}", source.id, e);
                report.failures += 1;
                continue;
            }
        };
        let new_source = NewSource {
            id: source.id,
            name: source.name,
            source_type,
            content: source.content,
        };
        match store.upsert_source(new_source, &notebook.id).await {
            Ok(_) => report.sources += 1,
            Err(e) => {
                tracing::warn!("Failed to import source into {}: {}", notebook.id, e);
                report.failures += 1;
            }
        }
    }

    for entry in notebook.messages {
        let Some(message) = parse_entry::<LegacyMessage>("message", entry, report) else {
            continue;
        };
        let role = match message.role.parse::<Role>() {
            Ok(role) => role,
            Err(e) => {
                tracing::warn!("Skipping legacy message in {}: {}", notebook.id, e);
                report.failures += 1;
                continue;
            }
        };
        match store.append_message(&notebook.id, role, &message.content).await {
            Ok(_) => report.messages += 1,
            Err(e) => {
                tracing::warn!("Failed to import message into {}: {}", notebook.id, e);
                report.failures += 1;
            }
        }
    }
}

async fn replay_settings(
    store: &NotebookStore,
    prefs: &dyn Preferences,
    report: &mut ImportReport,
) -> Result<()> {
    let mut legacy = HashMap::new();
    for key in [API_KEYS_KEY, SELECTED_MODELS_KEY, SELECTED_PROVIDER_KEY] {
        if let Some(value) = prefs.get(key)? {
            legacy.insert(key.to_string(), value);
        }
    }
    if legacy.is_empty() {
        return Ok(());
    }

    let settings = decode_settings(&legacy);
    match store.save_settings(&settings).await {
        Ok(()) => report.settings = true,
        Err(e) => {
            tracing::warn!("Failed to import legacy settings: {}", e);
            report.failures += 1;
        }
    }
    Ok(())
}
