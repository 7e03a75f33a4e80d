//! Scheduler record parsing
//!
//! Slurm's one-line job listing (`scontrol show jobid <id> -o`) is a flat
//! sequence of `Key=Value` tokens separated by whitespace. This module turns
//! such a line into a lookup table so callers ask for fields by name instead
//! of pattern matching over raw text.

use thiserror::Error;

/// Errors produced while reading a scheduler record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The response held no non-blank line
    #[error("scheduler response is empty")]
    Empty,

    /// A required key was not present in the record
    #[error("scheduler response has no '{key}' field")]
    MissingKey { key: String },
}

/// A single `key=value` record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueRecord {
    fields: Vec<(String, String)>,
}

impl KeyValueRecord {
    /// Parses the first non-blank line of `text`
    ///
    /// A token without `=` continues the value of the preceding key, joined
    /// with a single space. Tokens before the first key are dropped.
    pub fn parse(text: &str) -> Result<Self, RecordError> {
        let line = text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or(RecordError::Empty)?;

        let mut fields: Vec<(String, String)> = Vec::new();

        for token in line.split_whitespace() {
            match token.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    fields.push((key.to_string(), value.to_string()));
                }
                _ => {
                    if let Some((_, value)) = fields.last_mut() {
                        value.push(' ');
                        value.push_str(token);
                    }
                }
            }
        }

        Ok(Self { fields })
    }

    /// Returns the value of the first occurrence of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Returns the value of `key`, failing if it is absent
    pub fn require(&self, key: &str) -> Result<&str, RecordError> {
        self.get(key).ok_or_else(|| RecordError::MissingKey {
            key: key.to_string(),
        })
    }

    /// Number of fields in the record
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
