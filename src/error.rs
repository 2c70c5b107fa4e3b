use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("{name} is not a readable zip archive: {reason}")]
    ArchiveOpen { name: String, reason: String },

    #[error("{name} is nested more than {limit} archives deep")]
    ArchiveTooDeep { name: String, limit: usize },

    #[error("duplicate file {name}: another file was already staged under this name")]
    DuplicateFile { name: String },

    #[error("{name} has unsupported extension {}", display_extension(.extension))]
    UnsupportedExtension {
        name: String,
        extension: Option<String>,
    },

    #[error("{format} {base_name} is missing {}", .missing.join(", "))]
    IncompleteFormat {
        format: String,
        base_name: String,
        missing: Vec<String>,
    },

    #[error("inspector could not read file {path} or file is empty")]
    UnreadableFile { path: String },

    #[error("{context}: {reason}")]
    Io { context: String, reason: String },

    #[error("entry path {name} escapes the archive root")]
    UnsafeEntryPath { name: String },

    #[error("staging directory {path}: {reason}")]
    #[diagnostic(help("the staging directory must be absent or empty and writable"))]
    Staging { path: String, reason: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl StageError {
    /// Stable machine-readable identifier, used in JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            StageError::ArchiveOpen { .. } => "archive_open",
            StageError::ArchiveTooDeep { .. } => "archive_too_deep",
            StageError::DuplicateFile { .. } => "duplicate_file",
            StageError::UnsupportedExtension { .. } => "unsupported_extension",
            StageError::IncompleteFormat { .. } => "incomplete_format",
            StageError::UnreadableFile { .. } => "unreadable_file",
            StageError::Io { .. } => "io_failure",
            StageError::UnsafeEntryPath { .. } => "unsafe_entry_path",
            StageError::Staging { .. } => "staging",
            StageError::ConfigRead(_) => "config_read",
            StageError::ConfigParse(_) => "config_parse",
            StageError::InvalidConfig(_) => "invalid_config",
        }
    }

    /// Errors that abort the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StageError::Staging { .. })
    }

    pub(crate) fn io(context: impl Into<String>, err: impl std::fmt::Display) -> Self {
        StageError::Io {
            context: context.into(),
            reason: err.to_string(),
        }
    }
}

fn display_extension(extension: &Option<String>) -> String {
    match extension {
        Some(ext) => format!(".{ext}"),
        None => "(none)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_item() {
        let err = StageError::IncompleteFormat {
            format: "shapefile".to_string(),
            base_name: "extra_data".to_string(),
            missing: vec![".dbf".to_string(), ".shx".to_string()],
        };
        assert_eq!(err.to_string(), "shapefile extra_data is missing .dbf, .shx");

        let err = StageError::UnsupportedExtension {
            name: "notes".to_string(),
            extension: None,
        };
        assert_eq!(err.to_string(), "notes has unsupported extension (none)");
        assert_eq!(err.code(), "unsupported_extension");
    }
}
