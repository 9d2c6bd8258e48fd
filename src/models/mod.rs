mod message;
mod notebook;
mod settings;
mod source;

pub use message::{Message, ParseRoleError, Role};
pub use notebook::{generate_id, Notebook};
pub use settings::{
    ApiKeys, ModelSelection, ParseProviderError, Provider, Settings, API_KEYS_KEY,
    DEFAULT_CLAUDE_MODEL, DEFAULT_GEMINI_MODEL, DEFAULT_OPENAI_MODEL, SELECTED_MODELS_KEY,
    SELECTED_PROVIDER_KEY,
};
pub use source::{NewSource, ParseSourceTypeError, Source, SourceType};
