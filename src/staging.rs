use std::fs;
use std::io::{self, Read};

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};

use crate::error::StageError;
use crate::naming::NameRegistry;

/// The flat directory one validation run writes into.
///
/// Owns the run's [`NameRegistry`], so every name handed out by [`stage`]
/// is unique within the directory. A directory made by [`temporary`] is
/// removed on drop unless [`persist`] is called.
///
/// [`stage`]: StagingDirectory::stage
/// [`temporary`]: StagingDirectory::temporary
/// [`persist`]: StagingDirectory::persist
#[derive(Debug)]
pub struct StagingDirectory {
    root: Utf8PathBuf,
    registry: NameRegistry,
    guard: Option<TempDir>,
}

impl StagingDirectory {
    /// Uses `root`, creating it if needed. An existing directory must be empty.
    pub fn create(root: &Utf8Path) -> Result<Self, StageError> {
        let std_root = root.as_std_path();
        if std_root.exists() {
            let mut entries = fs::read_dir(std_root).map_err(|err| staging_err(root, err))?;
            if entries.next().is_some() {
                return Err(staging_err(root, "directory is not empty"));
            }
        }
        fs::create_dir_all(std_root).map_err(|err| staging_err(root, err))?;
        let root = root
            .canonicalize_utf8()
            .map_err(|err| staging_err(root, err))?;

        Ok(Self {
            root,
            registry: NameRegistry::new(),
            guard: None,
        })
    }

    /// A fresh directory under the system temp location.
    pub fn temporary() -> Result<Self, StageError> {
        let dir = Builder::new()
            .prefix("geostage-")
            .tempdir()
            .map_err(|err| StageError::Staging {
                path: std::env::temp_dir().display().to_string(),
                reason: err.to_string(),
            })?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            StageError::Staging {
                path: path.display().to_string(),
                reason: "path is not valid UTF-8".to_string(),
            }
        })?;

        Ok(Self {
            root,
            registry: NameRegistry::new(),
            guard: Some(dir),
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_of(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn names(&self) -> &NameRegistry {
        &self.registry
    }

    /// Copies `reader` into the directory under `name` and returns the path and
    /// byte count.
    ///
    /// Fails with `DuplicateFile` if the name was already staged in this run,
    /// `Io` if the write fails (the name is released again), and `Staging` if
    /// the directory itself has disappeared.
    pub fn stage(
        &mut self,
        name: &str,
        reader: &mut dyn Read,
    ) -> Result<(Utf8PathBuf, u64), StageError> {
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(StageError::UnsafeEntryPath {
                name: name.to_string(),
            });
        }
        if !self.root.as_std_path().is_dir() {
            return Err(staging_err(&self.root, "directory no longer exists"));
        }
        self.registry.claim(name)?;

        let target = self.path_of(name);
        match write_new_file(&self.root, &target, reader) {
            Ok(bytes) => {
                tracing::debug!(name, bytes, "staged file");
                Ok((target, bytes))
            }
            Err(err) => {
                self.registry.release(name);
                Err(StageError::io(format!("write {target}"), err))
            }
        }
    }

    /// Names of the regular files currently on disk, sorted. Fails if the
    /// directory is not flat.
    pub fn files_on_disk(&self) -> Result<Vec<String>, StageError> {
        let mut names = Vec::new();
        for entry in self
            .root
            .read_dir_utf8()
            .map_err(|err| staging_err(&self.root, err))?
        {
            let entry = entry.map_err(|err| staging_err(&self.root, err))?;
            let file_type = entry
                .file_type()
                .map_err(|err| staging_err(&self.root, err))?;
            if file_type.is_dir() {
                return Err(staging_err(
                    &self.root,
                    format!("unexpected subdirectory {}", entry.file_name()),
                ));
            }
            names.push(entry.file_name().to_string());
        }
        names.sort();
        Ok(names)
    }

    /// Keeps the directory on disk after this value is dropped.
    pub fn persist(mut self) -> Utf8PathBuf {
        if let Some(guard) = self.guard.take() {
            let _ = guard.keep();
        }
        self.root
    }

    pub fn cleanup(mut self) -> Result<(), StageError> {
        match self.guard.take() {
            Some(guard) => guard.close().map_err(|err| staging_err(&self.root, err)),
            None => fs::remove_dir_all(self.root.as_std_path())
                .map_err(|err| staging_err(&self.root, err)),
        }
    }
}

// Writes through a temp file in the same directory so a failed copy never
// leaves a partial file under the final name.
fn write_new_file(root: &Utf8Path, target: &Utf8Path, reader: &mut dyn Read) -> io::Result<u64> {
    let mut temp = Builder::new()
        .prefix(".geostage-part")
        .tempfile_in(root.as_std_path())?;
    let bytes = io::copy(reader, temp.as_file_mut())?;
    temp.persist_noclobber(target.as_std_path())
        .map_err(|err| err.error)?;
    Ok(bytes)
}

fn staging_err(path: &Utf8Path, reason: impl std::fmt::Display) -> StageError {
    StageError::Staging {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}
