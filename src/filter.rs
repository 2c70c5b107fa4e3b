use std::collections::{BTreeMap, BTreeSet};

use crate::config::FormatRule;
use crate::domain::FlattenedFile;
use crate::error::StageError;
use crate::naming::split_name;
use crate::outcome::ValidationError;

/// Anything carrying a staged file name.
pub trait StagedName {
    fn staged_name(&self) -> &str;
}

impl StagedName for FlattenedFile {
    fn staged_name(&self) -> &str {
        &self.staged_name
    }
}

impl StagedName for String {
    fn staged_name(&self) -> &str {
        self
    }
}

impl StagedName for &str {
    fn staged_name(&self) -> &str {
        self
    }
}

/// Splits `items` into those whose extension is allow-listed and those that
/// are not, each rejection carrying its `UnsupportedExtension` error.
///
/// `allow_list` holds normalized (lower-case, dotless) extensions; archive
/// extensions are expected to have been removed from it already.
pub fn filter_extensions<T: StagedName>(
    items: Vec<T>,
    allow_list: &BTreeSet<String>,
) -> (Vec<T>, Vec<(T, StageError)>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for item in items {
        let extension = split_name(item.staged_name()).1;
        match extension {
            Some(ext) if allow_list.contains(&ext) => accepted.push(item),
            extension => {
                let error = StageError::UnsupportedExtension {
                    name: item.staged_name().to_string(),
                    extension,
                };
                rejected.push((item, error));
            }
        }
    }
    (accepted, rejected)
}

/// A base name that has some, but not all, members of a format family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncompleteGroup {
    pub format: String,
    pub base_name: String,
    /// Staged names that belong to the group.
    pub members: Vec<String>,
    pub missing: Vec<String>,
}

impl IncompleteGroup {
    pub fn to_error(&self) -> StageError {
        StageError::IncompleteFormat {
            format: self.format.clone(),
            base_name: self.base_name.clone(),
            missing: self.missing.iter().map(|ext| format!(".{ext}")).collect(),
        }
    }
}

/// Result of the completeness check: the incomplete groups and one
/// `IncompleteFormat` error per group. Advisory: nothing is removed here.
#[derive(Debug)]
pub struct Completeness {
    pub groups: Vec<IncompleteGroup>,
    pub errors: Vec<ValidationError>,
}

impl Completeness {
    pub fn is_complete(&self) -> bool {
        self.groups.is_empty()
    }

    /// Whether `name` belongs to some incomplete group.
    pub fn is_incomplete_member(&self, name: &str) -> bool {
        self.groups
            .iter()
            .any(|group| group.members.iter().any(|member| member == name))
    }
}

/// Groups `items` by base name and, for every rule, reports each base name
/// that has some but not all of the required extensions. Groups are ordered
/// by rule, then base name.
pub fn check_completeness<T: StagedName>(
    items: &[T],
    rules: &[FormatRule],
    field: &str,
) -> Completeness {
    let groups = incomplete_groups(items, rules);
    let errors = groups
        .iter()
        .map(|group| ValidationError::new(field, group.to_error()))
        .collect();
    Completeness { groups, errors }
}

fn incomplete_groups<T: StagedName>(items: &[T], rules: &[FormatRule]) -> Vec<IncompleteGroup> {
    let mut by_base: BTreeMap<&str, BTreeMap<String, Vec<String>>> = BTreeMap::new();
    for item in items {
        let name = item.staged_name();
        if let (base, Some(ext)) = split_name(name) {
            by_base
                .entry(base)
                .or_default()
                .entry(ext)
                .or_default()
                .push(name.to_string());
        }
    }

    let mut groups = Vec::new();
    for rule in rules {
        for (base, extensions) in &by_base {
            let present = rule
                .required
                .iter()
                .filter(|ext| extensions.contains_key(*ext))
                .collect::<Vec<_>>();
            if present.is_empty() || present.len() == rule.required.len() {
                continue;
            }
            let missing = rule
                .required
                .iter()
                .filter(|ext| !extensions.contains_key(*ext))
                .cloned()
                .collect();
            let members = present
                .iter()
                .flat_map(|ext| extensions[*ext].iter().cloned())
                .collect();
            groups.push(IncompleteGroup {
                format: rule.name.clone(),
                base_name: base.to_string(),
                members,
                missing,
            });
        }
    }
    groups
}
