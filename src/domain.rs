use std::fmt;
use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::StageError;

/// One uploaded byte source. Never modified once received.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    file_name: String,
    content: Vec<u8>,
    source_chain: Vec<String>,
}

impl UploadCandidate {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            source_chain: Vec::new(),
        }
    }

    /// Reads a local file fully into memory, named after its final component.
    pub fn from_path(path: &Path) -> Result<Self, StageError> {
        let content = fs::read(path)
            .map_err(|err| StageError::io(format!("read upload {}", path.display()), err))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| StageError::UnsafeEntryPath {
                name: path.display().to_string(),
            })?;
        Ok(Self::new(file_name, content))
    }

    /// Records the containers this candidate was taken from, outermost first.
    pub fn with_source_chain(mut self, chain: Vec<String>) -> Self {
        self.source_chain = chain;
        self
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn source_chain(&self) -> &[String] {
        &self.source_chain
    }
}

/// A file materialized in the staging directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlattenedFile {
    pub staged_name: String,
    /// Container names from the outermost upload down to the entry itself.
    pub source_chain: Vec<String>,
    pub byte_length: u64,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateKind {
    Plain,
    Archive,
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateKind::Plain => write!(f, "plain"),
            CandidateKind::Archive => write!(f, "archive"),
        }
    }
}
