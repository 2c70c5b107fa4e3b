use std::fmt;
use std::io::Cursor;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::classify::classify;
use crate::config::ResolvedConfig;
use crate::domain::{FlattenedFile, UploadCandidate};
use crate::error::StageError;
use crate::filter::{check_completeness, filter_extensions};
use crate::flatten::Flattener;
use crate::inspect::{Inspector, ReadabilityValidator};
use crate::naming::upload_file_name;
use crate::outcome::{Outcome, ValidationError};
use crate::staging::StagingDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Flatten,
    Filter,
    Inspect,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classify => write!(f, "classify"),
            Stage::Flatten => write!(f, "flatten"),
            Stage::Filter => write!(f, "filter"),
            Stage::Inspect => write!(f, "inspect"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub staging_dir: Utf8PathBuf,
    pub validated_at: String,
    pub accepted: Vec<FlattenedFile>,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn accepted_names(&self) -> Vec<&str> {
        self.accepted
            .iter()
            .map(|file| file.staged_name.as_str())
            .collect()
    }

    pub fn accepted_paths(&self) -> Vec<&Utf8Path> {
        self.accepted.iter().map(|file| file.path.as_path()).collect()
    }

    pub fn errors_with_code(&self, code: &str) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|error| error.error.code() == code)
            .collect()
    }
}

/// Runs classify, flatten, filter and inspect over one batch of uploads.
pub struct Pipeline<I> {
    config: ResolvedConfig,
    validator: ReadabilityValidator<I>,
}

impl<I: Inspector> Pipeline<I> {
    pub fn new(config: ResolvedConfig, inspector: I) -> Self {
        Self {
            config,
            validator: ReadabilityValidator::new(inspector),
        }
    }

    /// Validates `candidates` into `staging`.
    ///
    /// Every per-file problem ends up in `ValidationResult::errors` and the
    /// file is left out of `accepted`; the run only fails outright when a
    /// top-level archive cannot be opened or the staging directory is unusable.
    /// Rejected files are left on disk.
    pub fn run(
        &self,
        candidates: Vec<UploadCandidate>,
        staging: &mut StagingDirectory,
        sink: &dyn ProgressSink,
    ) -> Result<ValidationResult, StageError> {
        let started = Instant::now();
        if !staging.root().as_std_path().is_dir() {
            return Err(StageError::Staging {
                path: staging.root().to_string(),
                reason: "directory does not exist".to_string(),
            });
        }

        let total = candidates.len();
        let classified = classify(candidates);
        self.progress(
            sink,
            Stage::Classify,
            format!(
                "{total} uploads: {} plain, {} archives",
                classified.plain.len(),
                classified.archives.len()
            ),
            started,
        );

        let mut outcome = Outcome::new(Vec::new());
        for candidate in &classified.plain {
            let files = self.stage_plain(candidate, staging, &mut outcome)?;
            outcome.value.extend(files);
        }
        let flattener = Flattener::new(&self.config);
        for candidate in &classified.archives {
            let flattened = flattener.flatten(
                Cursor::new(candidate.content()),
                candidate.file_name(),
                staging,
                "",
            )?;
            let files = outcome.absorb(flattened);
            outcome
                .value
                .extend(files.into_iter().map(|file| with_origin(file, candidate)));
        }
        self.progress(
            sink,
            Stage::Flatten,
            format!("{} files staged", outcome.value.len()),
            started,
        );

        let staged = std::mem::take(&mut outcome.value);
        let (mut accepted, rejected) = filter_extensions(staged, &self.config.allowed_extensions);
        for (_, error) in rejected {
            self.record(&mut outcome, error);
        }
        let completeness =
            check_completeness(&accepted, &self.config.format_rules, &self.config.field);
        if self.config.incomplete_blocks {
            accepted.retain(|file| !completeness.is_incomplete_member(&file.staged_name));
        }
        for error in completeness.errors {
            tracing::warn!(code = error.error.code(), "{}", error.error);
            outcome.push(error);
        }
        self.progress(
            sink,
            Stage::Filter,
            format!("{} files passed extension and completeness checks", accepted.len()),
            started,
        );

        let mut inspected = Vec::with_capacity(accepted.len());
        for file in accepted {
            if self.validator.check(file.path.as_std_path()) {
                inspected.push(file);
            } else {
                self.record(
                    &mut outcome,
                    StageError::UnreadableFile {
                        path: file.path.to_string(),
                    },
                );
            }
        }
        self.progress(
            sink,
            Stage::Inspect,
            format!("{} files accepted", inspected.len()),
            started,
        );

        Ok(ValidationResult {
            staging_dir: staging.root().to_owned(),
            validated_at: chrono::Utc::now().to_rfc3339(),
            accepted: inspected,
            errors: outcome.errors,
        })
    }

    fn stage_plain(
        &self,
        candidate: &UploadCandidate,
        staging: &mut StagingDirectory,
        outcome: &mut Outcome<Vec<FlattenedFile>>,
    ) -> Result<Vec<FlattenedFile>, StageError> {
        let Some(name) = upload_file_name(candidate.file_name()) else {
            self.record(
                outcome,
                StageError::UnsafeEntryPath {
                    name: candidate.file_name().to_string(),
                },
            );
            return Ok(Vec::new());
        };

        let mut content = candidate.content();
        match staging.stage(name, &mut content) {
            Ok((path, byte_length)) => {
                let mut source_chain = candidate.source_chain().to_vec();
                source_chain.push(candidate.file_name().to_string());
                Ok(vec![FlattenedFile {
                    staged_name: name.to_string(),
                    source_chain,
                    byte_length,
                    path,
                }])
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.record(outcome, err);
                Ok(Vec::new())
            }
        }
    }

    fn record<T>(&self, outcome: &mut Outcome<T>, error: StageError) {
        tracing::warn!(code = error.code(), "{error}");
        outcome.push(ValidationError::new(&self.config.field, error));
    }

    fn progress(&self, sink: &dyn ProgressSink, stage: Stage, message: String, started: Instant) {
        tracing::info!(%stage, "{message}");
        sink.event(ProgressEvent {
            stage,
            message,
            elapsed: Some(started.elapsed()),
        });
    }
}

fn with_origin(mut file: FlattenedFile, candidate: &UploadCandidate) -> FlattenedFile {
    if !candidate.source_chain().is_empty() {
        let mut chain = candidate.source_chain().to_vec();
        chain.append(&mut file.source_chain);
        file.source_chain = chain;
    }
    file
}
