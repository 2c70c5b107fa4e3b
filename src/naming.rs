use std::collections::BTreeSet;
use std::path::{Component, Path};

use crate::error::StageError;

/// Joins nesting levels in a staged name.
pub const PREFIX_SEPARATOR: char = '_';

const EXTENSION_SEPARATOR: char = '.';

/// Splits a file name at its first `.` into base name and lower-cased extension.
///
/// `layer.shp.xml` yields `("layer", Some("shp.xml"))`; a name without a
/// separator, or ending in one, has no extension.
pub fn split_name(name: &str) -> (&str, Option<String>) {
    match name.split_once(EXTENSION_SEPARATOR) {
        Some((base, ext)) if !ext.is_empty() => (base, Some(ext.to_lowercase())),
        Some((base, _)) => (base, None),
        None => (name, None),
    }
}

pub fn extension_of(name: &str) -> Option<String> {
    split_name(name).1
}

/// The text after the last `.`, lower-cased. Used to recognise containers such
/// as `roads.v2.zip`, whose first-separator extension would be `v2.zip`.
pub fn last_extension(name: &str) -> Option<String> {
    name.rsplit_once(EXTENSION_SEPARATOR)
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Normalizes an extension written in configuration (`.SHP`, ` shp `).
pub fn normalize_extension(raw: &str) -> String {
    raw.trim().trim_start_matches(EXTENSION_SEPARATOR).to_lowercase()
}

/// The final path component of an uploaded file name, accepting either
/// separator since browsers differ in what they send.
pub fn upload_file_name(raw: &str) -> Option<&str> {
    raw.rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
}

/// An archive member path split into its directory chain and leaf name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryName {
    dirs: Vec<String>,
    leaf: String,
}

impl EntryName {
    /// Builds from an already enclosed (relative, `..`-free) entry path.
    pub fn from_path(path: &Path) -> Option<Self> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?.to_string()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        let leaf = parts.pop()?;
        Some(Self { dirs: parts, leaf })
    }

    pub fn leaf(&self) -> &str {
        &self.leaf
    }

    /// Entries whose leaf has no extension are directory markers.
    pub fn is_directory_marker(&self) -> bool {
        split_name(&self.leaf).1.is_none()
    }

    /// `prefix` followed by the subdirectory chain and the leaf name.
    pub fn staged_name(&self, prefix: &str) -> String {
        let mut name = self.dir_prefix(prefix);
        name.push_str(&self.leaf);
        name
    }

    /// Prefix for the members of this entry when it is itself an archive: the
    /// archive's name without its container suffix stands in for one more
    /// nesting level, so `roads.v1.zip` and `roads.v2.zip` stay distinct.
    pub fn nested_prefix(&self, prefix: &str) -> String {
        let mut name = self.dir_prefix(prefix);
        let stem = self
            .leaf
            .rsplit_once(EXTENSION_SEPARATOR)
            .map_or(self.leaf.as_str(), |(stem, _)| stem);
        name.push_str(&flatten_component(stem));
        name.push(PREFIX_SEPARATOR);
        name
    }

    fn dir_prefix(&self, prefix: &str) -> String {
        let mut name = prefix.to_string();
        for dir in &self.dirs {
            name.push_str(&flatten_component(dir));
            name.push(PREFIX_SEPARATOR);
        }
        name
    }
}

// Prefix parts must not contain the extension separator, otherwise the
// first-separator rule would cut the extension inside the prefix.
fn flatten_component(part: &str) -> String {
    part.replace(EXTENSION_SEPARATOR, &PREFIX_SEPARATOR.to_string())
}

/// Names already claimed in one staging directory.
#[derive(Debug, Default, Clone)]
pub struct NameRegistry {
    names: BTreeSet<String>,
}

impl NameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves `name`; a second claim of the same name is a duplicate and the
    /// first claimant keeps it.
    pub fn claim(&mut self, name: &str) -> Result<(), StageError> {
        if self.names.insert(name.to_string()) {
            Ok(())
        } else {
            Err(StageError::DuplicateFile {
                name: name.to_string(),
            })
        }
    }

    pub fn release(&mut self, name: &str) {
        self.names.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
