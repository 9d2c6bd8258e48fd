use std::collections::HashMap;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::db::Repository;
use crate::error::{AppError, Result};
use crate::models::{
    ApiKeys, Message, ModelSelection, NewSource, Notebook, Provider, Role, Settings, Source,
    API_KEYS_KEY, SELECTED_MODELS_KEY, SELECTED_PROVIDER_KEY,
};

#[derive(Clone)]
pub struct NotebookStore {
    repo: Repository,
}

fn require_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(AppError::InvalidArgument(format!("{kind} id must not be empty")));
    }
    Ok(())
}

impl NotebookStore {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Repository::open(db_path).await?))
    }

    pub async fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Repository::open_in_memory().await?))
    }

    pub async fn close(self) -> Result<()> {
        self.repo.close().await
    }

    // Notebooks

    pub async fn list_notebooks(&self) -> Result<Vec<Notebook>> {
        let notebooks = self.repo.get_all_notebooks().await?;
        tracing::debug!("list_notebooks: {} notebooks found", notebooks.len());
        Ok(notebooks)
    }

    pub async fn notebook_exists(&self, id: &str) -> Result<bool> {
        require_id("notebook", id)?;
        self.repo.notebook_exists(id).await
    }

    pub async fn create_notebook(&self, id: &str, name: &str) -> Result<Notebook> {
        require_id("notebook", id)?;
        tracing::debug!("create_notebook: {} {}", id, name);
        self.repo.insert_notebook(id, name).await
    }

    pub async fn rename_notebook(&self, id: &str, name: &str) -> Result<()> {
        require_id("notebook", id)?;
        tracing::debug!("rename_notebook: {} {}", id, name);
        self.repo.update_notebook_name(id, name).await?;
        Ok(())
    }

    pub async fn delete_notebook(&self, id: &str) -> Result<()> {
        require_id("notebook", id)?;
        tracing::debug!("delete_notebook: {}", id);
        self.repo.delete_notebook(id).await?;
        Ok(())
    }

    // Sources

    pub async fn list_sources(&self, notebook_id: &str) -> Result<Vec<Source>> {
        require_id("notebook", notebook_id)?;
        let sources = self.repo.get_sources_for_notebook(notebook_id).await?;
        tracing::debug!("list_sources: {} {} sources found", notebook_id, sources.len());
        Ok(sources)
    }

    pub async fn upsert_source(&self, source: NewSource, notebook_id: &str) -> Result<Source> {
        require_id("source", &source.id)?;
        require_id("notebook", notebook_id)?;
        tracing::debug!("upsert_source: {} {}", notebook_id, source.name);
        self.repo.upsert_source(source, notebook_id).await
    }

    pub async fn delete_source(&self, id: &str) -> Result<()> {
        require_id("source", id)?;
        tracing::debug!("delete_source: {}", id);
        self.repo.delete_source(id).await?;
        Ok(())
    }

    // Messages

    pub async fn list_messages(&self, notebook_id: &str) -> Result<Vec<Message>> {
        require_id("notebook", notebook_id)?;
        let messages = self.repo.get_messages_for_notebook(notebook_id).await?;
        tracing::debug!("list_messages: {} {} messages found", notebook_id, messages.len());
        Ok(messages)
    }

    pub async fn append_message(&self, notebook_id: &str, role: Role, content: &str) -> Result<Message> {
        require_id("notebook", notebook_id)?;
        tracing::debug!(
            "append_message: {} {} {}",
            notebook_id,
            role,
            content.chars().take(50).collect::<String>()
        );
        self.repo.insert_message(notebook_id, role, content).await
    }

    pub async fn clear_messages(&self, notebook_id: &str) -> Result<()> {
        require_id("notebook", notebook_id)?;
        let removed = self.repo.delete_messages_for_notebook(notebook_id).await?;
        tracing::debug!("clear_messages: {} removed {}", notebook_id, removed);
        Ok(())
    }

    // Settings

    pub async fn raw_settings(&self) -> Result<HashMap<String, String>> {
        self.repo.get_all_settings().await
    }

    /// Decoded settings. Absent or undecodable keys fall back to defaults.
    pub async fn get_settings(&self) -> Result<Settings> {
        let raw = self.raw_settings().await?;
        Ok(decode_settings(&raw))
    }

    pub async fn put_setting(&self, key: &str, value: &str) -> Result<()> {
        require_id("setting", key)?;
        tracing::debug!("put_setting: {}", key);
        self.repo.save_setting(key, value).await
    }

    /// Three separate writes; a failure part way leaves the earlier keys stored.
    pub async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_setting(API_KEYS_KEY, &serde_json::to_string(&settings.api_keys)?)
            .await?;
        self.put_setting(SELECTED_MODELS_KEY, &serde_json::to_string(&settings.models)?)
            .await?;
        self.put_setting(SELECTED_PROVIDER_KEY, settings.selected_provider.as_str())
            .await
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
        self.repo.execute_batch(sql).await
    }
}

fn decode_json_setting<T: DeserializeOwned + Default>(raw: &HashMap<String, String>, key: &str) -> T {
    match raw.get(key) {
        Some(value) => serde_json::from_str(value).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed setting {}: {}", key, e);
            T::default()
        }),
        None => T::default(),
    }
}

pub(crate) fn decode_settings(raw: &HashMap<String, String>) -> Settings {
    let api_keys: ApiKeys = decode_json_setting(raw, API_KEYS_KEY);
    let models: ModelSelection = decode_json_setting(raw, SELECTED_MODELS_KEY);
    let selected_provider = match raw.get(SELECTED_PROVIDER_KEY) {
        Some(value) if !value.is_empty() => value.parse::<Provider>().unwrap_or_else(|e| {
            tracing::warn!("Ignoring setting {}: {}", SELECTED_PROVIDER_KEY, e);
            Provider::default()
        }),
        _ => Provider::default(),
    };

    Settings {
        api_keys,
        models,
        selected_provider,
    }
}
