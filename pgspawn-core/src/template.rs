//! Payload template rendering
//!
//! The batch script is opaque to the launcher: it only fills in a fixed set
//! of `{name}` placeholders. Everything else, shell `${VAR}` expansions
//! included, is passed through untouched.

use thiserror::Error;

use crate::domain::job::JobRequest;

/// Bootstrap script for a PostGIS server inside a Pyxis container
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/postgis.sbatch");

/// Placeholder that must occur exactly once
pub const PORT_PLACEHOLDER: &str = "{port}";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("template must contain {{port}} exactly once, found {count}")]
    PortPlaceholder { count: usize },
}

/// An unrendered batch script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadTemplate {
    text: String,
}

impl PayloadTemplate {
    /// Wraps template text, checking the port placeholder is present once
    pub fn new(text: impl Into<String>) -> Result<Self, TemplateError> {
        let text = text.into();
        let count = text
            .match_indices(PORT_PLACEHOLDER)
            .filter(|(idx, _)| !is_shell_expansion(&text, *idx))
            .count();
        if count != 1 {
            return Err(TemplateError::PortPlaceholder { count });
        }
        Ok(Self { text })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Renders the request's payload template
    pub fn render(request: &JobRequest) -> Result<String, TemplateError> {
        let template = Self::new(request.payload_template())?;
        Ok(template.render_with(request))
    }

    /// Substitutes the request fields in a single pass
    ///
    /// Substituted values are never rescanned, so a value that happens to
    /// look like a placeholder is emitted literally. A brace directly after
    /// `$` belongs to the shell and is left alone.
    pub fn render_with(&self, request: &JobRequest) -> String {
        let text = self.text.as_str();
        let mut out = String::with_capacity(text.len() + 256);
        let mut pos = 0;

        while let Some(found) = text[pos..].find('{') {
            let open = pos + found;
            out.push_str(&text[pos..open]);
            let candidate = &text[open + 1..];

            let replaced = if is_shell_expansion(text, open) {
                None
            } else {
                candidate.find('}').and_then(|close| {
                    let name = &candidate[..close];
                    lookup(request, name).map(|value| (value, close))
                })
            };

            match replaced {
                Some((value, close)) => {
                    out.push_str(&value);
                    pos = open + 1 + close + 1;
                }
                None => {
                    out.push('{');
                    pos = open + 1;
                }
            }
        }

        out.push_str(&text[pos..]);
        out
    }
}

impl Default for PayloadTemplate {
    fn default() -> Self {
        Self {
            text: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

/// `true` when the brace at `open` starts a shell `${...}` expansion
fn is_shell_expansion(text: &str, open: usize) -> bool {
    open > 0 && text.as_bytes()[open - 1] == b'$'
}

fn lookup(request: &JobRequest, name: &str) -> Option<String> {
    let value = match name {
        "image" => request.image_ref().to_string(),
        "partition" => request.partition().to_string(),
        "n_gpus" => request.gpu_count().to_string(),
        "n_cpus" => request.cpu_count().to_string(),
        "job_name" => request.job_name().to_string(),
        "port" => request.listen_port().to_string(),
        "time_limit" => request.time_limit().to_string(),
        "directives" => directives(request),
        "db_name" => request.database().name.clone(),
        "db_user" => request.database().user.clone(),
        "db_password" => request.database().password.clone(),
        _ => return None,
    };
    Some(value)
}

fn directives(request: &JobRequest) -> String {
    let mounts = request.container_mounts();
    if mounts.is_empty() {
        return String::new();
    }
    format!("#SBATCH --container-mounts {}", mounts.join(","))
}
