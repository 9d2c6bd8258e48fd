//! Research notebooks grounded in their own sources.
//!
//! Notebooks, sources, chat transcripts and settings live in a SQLite store
//! ([`store::NotebookStore`]). [`app::App`] keeps the working set in memory and
//! writes every change through to the store before applying it locally.

pub mod ai;
pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod legacy;
pub mod models;
pub mod prefs;
pub mod services;
pub mod store;

pub use app::App;
pub use config::Config;
pub use error::{AppError, Result};
