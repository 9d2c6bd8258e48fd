use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Pdf,
    Text,
    Link,
    /// User-authored free text.
    Note,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Text => "text",
            SourceType::Link => "link",
            SourceType::Note => "note",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown source type: {0}")]
pub struct ParseSourceTypeError(String);

impl FromStr for SourceType {
    type Err = ParseSourceTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pdf" => Ok(SourceType::Pdf),
            "text" => Ok(SourceType::Text),
            "link" => Ok(SourceType::Link),
            "note" => Ok(SourceType::Note),
            other => Err(ParseSourceTypeError(other.to_string())),
        }
    }
}

impl ToSql for SourceType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for SourceType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

/// A source as callers hand it to the store. Saving one always carries the
/// full object: an existing row with the same id is replaced, never merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSource {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub notebook_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Source {
    /// The full replacement object for this source with new content.
    pub fn with_content(&self, content: impl Into<String>) -> NewSource {
        NewSource {
            id: self.id.clone(),
            name: self.name.clone(),
            source_type: self.source_type,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_parses_stored_names() {
        assert_eq!("note".parse::<SourceType>().unwrap(), SourceType::Note);
        assert_eq!("pdf".parse::<SourceType>().unwrap(), SourceType::Pdf);
        assert!("docx".parse::<SourceType>().is_err());
    }

    #[test]
    fn test_new_source_json_uses_type_key() {
        let json = r#"{"id":"s1","name":"Alpha","type":"text","content":"Alpha"}"#;
        let source: NewSource = serde_json::from_str(json).unwrap();
        assert_eq!(source.source_type, SourceType::Text);
        assert_eq!(source.content, "Alpha");
    }
}
