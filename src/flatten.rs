use std::fs::File;
use std::io::{self, Read, Seek};

use zip::ZipArchive;

use crate::classify::is_archive_reader;
use crate::config::ResolvedConfig;
use crate::domain::FlattenedFile;
use crate::error::StageError;
use crate::naming::{EntryName, last_extension};
use crate::outcome::{Outcome, ValidationError};
use crate::staging::StagingDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    Directory,
    NestedArchive,
    Leaf,
}

/// Recursively extracts zip archives into one flat staging directory.
pub struct Flattener<'a> {
    config: &'a ResolvedConfig,
}

impl<'a> Flattener<'a> {
    pub fn new(config: &'a ResolvedConfig) -> Self {
        Self { config }
    }

    /// Extracts every leaf of `source`, descending into nested archives.
    ///
    /// `origin` is the upload name of the archive; it is recorded in each
    /// file's source chain but never enters the staged names. Per-entry
    /// failures are collected in the returned [`Outcome`]; only an unreadable
    /// top-level archive or a broken staging directory is an `Err`.
    pub fn flatten<R: Read + Seek>(
        &self,
        source: R,
        origin: &str,
        staging: &mut StagingDirectory,
        prefix: &str,
    ) -> Result<Outcome<Vec<FlattenedFile>>, StageError> {
        self.flatten_at(source, &[origin.to_string()], staging, prefix, 0)
    }

    fn flatten_at<R: Read + Seek>(
        &self,
        source: R,
        chain: &[String],
        staging: &mut StagingDirectory,
        prefix: &str,
        depth: usize,
    ) -> Result<Outcome<Vec<FlattenedFile>>, StageError> {
        let mut archive = ZipArchive::new(source).map_err(|err| StageError::ArchiveOpen {
            name: chain.join("/"),
            reason: err.to_string(),
        })?;
        tracing::debug!(
            archive = %chain.join("/"),
            depth,
            entries = archive.len(),
            "flattening archive"
        );

        let mut outcome = Outcome::new(Vec::new());
        for index in 0..archive.len() {
            let mut entry = match archive.by_index(index) {
                Ok(entry) => entry,
                Err(err) => {
                    self.record(
                        &mut outcome,
                        StageError::io(format!("read entry {index} of {}", chain.join("/")), err),
                    );
                    continue;
                }
            };
            let raw_name = entry.name().to_string();
            let Some(entry_name) = entry
                .enclosed_name()
                .and_then(|path| EntryName::from_path(&path))
            else {
                self.record(&mut outcome, StageError::UnsafeEntryPath { name: raw_name });
                continue;
            };

            let kind = self.kind_of(entry.is_dir(), &entry_name);
            let entry_chain = extend_chain(chain, &raw_name);
            let files = match kind {
                EntryKind::Directory => continue,
                EntryKind::Leaf => {
                    let staged_name = entry_name.staged_name(prefix);
                    self.stage_leaf(staging, staged_name, entry_chain, &mut entry, &mut outcome)?
                }
                EntryKind::NestedArchive => {
                    let nested = Nested {
                        name: &entry_name,
                        chain: entry_chain,
                        prefix,
                        depth,
                    };
                    self.flatten_nested(nested, &mut entry, staging, &mut outcome)?
                }
            };
            outcome.value.extend(files);
        }
        Ok(outcome)
    }

    fn flatten_nested(
        &self,
        nested: Nested<'_>,
        entry: &mut dyn Read,
        staging: &mut StagingDirectory,
        outcome: &mut Outcome<Vec<FlattenedFile>>,
    ) -> Result<Vec<FlattenedFile>, StageError> {
        let container = nested.chain.join("/");
        let mut spooled = match spool(entry) {
            Ok(file) => file,
            Err(err) => {
                self.record(outcome, StageError::io(format!("extract {container}"), err));
                return Ok(Vec::new());
            }
        };

        match is_archive_reader(&mut spooled) {
            Ok(true) => {}
            // Named like an archive but is not one: stage it as a plain leaf and
            // let the extension filter decide.
            Ok(false) => {
                let staged_name = nested.name.staged_name(nested.prefix);
                return self.stage_leaf(staging, staged_name, nested.chain, &mut spooled, outcome);
            }
            Err(err) => {
                self.record(outcome, StageError::io(format!("inspect {container}"), err));
                return Ok(Vec::new());
            }
        }

        if nested.depth + 1 > self.config.max_depth {
            tracing::warn!(archive = %container, limit = self.config.max_depth, "nesting limit reached");
            self.record(
                outcome,
                StageError::ArchiveTooDeep {
                    name: container,
                    limit: self.config.max_depth,
                },
            );
            return Ok(Vec::new());
        }

        let child_prefix = nested.name.nested_prefix(nested.prefix);
        match self.flatten_at(
            spooled,
            &nested.chain,
            staging,
            &child_prefix,
            nested.depth + 1,
        ) {
            Ok(child) => Ok(outcome.absorb(child)),
            Err(err @ StageError::ArchiveOpen { .. }) => {
                self.record(outcome, err);
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    fn stage_leaf(
        &self,
        staging: &mut StagingDirectory,
        staged_name: String,
        source_chain: Vec<String>,
        reader: &mut dyn Read,
        outcome: &mut Outcome<Vec<FlattenedFile>>,
    ) -> Result<Vec<FlattenedFile>, StageError> {
        match staging.stage(&staged_name, reader) {
            Ok((path, byte_length)) => Ok(vec![FlattenedFile {
                staged_name,
                source_chain,
                byte_length,
                path,
            }]),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.record(outcome, err);
                Ok(Vec::new())
            }
        }
    }

    fn kind_of(&self, is_dir: bool, name: &EntryName) -> EntryKind {
        if is_dir || name.is_directory_marker() {
            return EntryKind::Directory;
        }
        match last_extension(name.leaf()) {
            Some(ext) if self.config.is_archive_extension(&ext) => EntryKind::NestedArchive,
            _ => EntryKind::Leaf,
        }
    }

    fn record<T>(&self, outcome: &mut Outcome<T>, error: StageError) {
        tracing::warn!(code = error.code(), "{error}");
        outcome.push(ValidationError::new(&self.config.field, error));
    }
}

struct Nested<'n> {
    name: &'n EntryName,
    chain: Vec<String>,
    prefix: &'n str,
    depth: usize,
}

fn extend_chain(chain: &[String], name: &str) -> Vec<String> {
    let mut extended = chain.to_vec();
    extended.push(name.to_string());
    extended
}

// Anonymous temp file outside the staging directory; removed when dropped.
fn spool(entry: &mut dyn Read) -> io::Result<File> {
    let mut file = tempfile::tempfile()?;
    io::copy(entry, &mut file)?;
    file.rewind()?;
    Ok(file)
}
