use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::StageError;
use crate::naming::normalize_extension;

pub const DEFAULT_CONFIG_FILE: &str = "geostage.json";
pub const DEFAULT_MAX_DEPTH: usize = 20;
pub const DEFAULT_FIELD: &str = "file";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub allowed_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub archive_extensions: Option<Vec<String>>,
    #[serde(default)]
    pub format_rules: Option<Vec<FormatRuleEntry>>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub incomplete_blocks: Option<bool>,
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FormatRuleEntry {
    pub name: String,
    pub required: Vec<String>,
}

/// Extensions that must co-occur under one base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRule {
    pub name: String,
    pub required: BTreeSet<String>,
}

impl FormatRule {
    pub fn new(name: &str, required: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            required: required.iter().map(|ext| normalize_extension(ext)).collect(),
        }
    }

    pub fn shapefile() -> Self {
        Self::new("shapefile", &["shp", "dbf", "shx", "prj"])
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    /// Leaf payload extensions; never contains an archive extension.
    pub allowed_extensions: BTreeSet<String>,
    pub archive_extensions: BTreeSet<String>,
    pub format_rules: Vec<FormatRule>,
    pub max_depth: usize,
    /// Drop the members of incomplete multi-part groups from the accepted set.
    pub incomplete_blocks: bool,
    pub field: String,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            allowed_extensions: default_allowed_extensions(),
            archive_extensions: default_archive_extensions(),
            format_rules: vec![FormatRule::shapefile()],
            max_depth: DEFAULT_MAX_DEPTH,
            incomplete_blocks: true,
            field: DEFAULT_FIELD.to_string(),
        }
    }
}

impl ResolvedConfig {
    pub fn is_archive_extension(&self, ext: &str) -> bool {
        self.archive_extensions.contains(ext)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `geostage.json` in the current directory. Only the
    /// implicit file may be absent, in which case defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, StageError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Ok(ResolvedConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| StageError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| StageError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, StageError> {
        let schema_version = config.schema_version.unwrap_or(1);
        if schema_version != 1 {
            return Err(StageError::InvalidConfig(format!(
                "unsupported schema_version {schema_version}"
            )));
        }

        let archive_extensions = config
            .archive_extensions
            .map(|list| normalize_set(&list))
            .unwrap_or_else(default_archive_extensions);

        let allowed_extensions = config
            .allowed_extensions
            .map(|list| normalize_set(&list))
            .unwrap_or_else(default_allowed_extensions)
            .into_iter()
            .filter(|ext| !archive_extensions.contains(ext))
            .collect::<BTreeSet<_>>();
        if allowed_extensions.is_empty() {
            return Err(StageError::InvalidConfig(
                "allowed_extensions has no payload extensions".to_string(),
            ));
        }

        let format_rules = match config.format_rules {
            Some(entries) => entries
                .into_iter()
                .map(resolve_rule)
                .collect::<Result<Vec<_>, StageError>>()?,
            None => vec![FormatRule::shapefile()],
        };

        Ok(ResolvedConfig {
            schema_version,
            allowed_extensions,
            archive_extensions,
            format_rules,
            max_depth: config.max_depth.unwrap_or(DEFAULT_MAX_DEPTH),
            incomplete_blocks: config.incomplete_blocks.unwrap_or(true),
            field: config.field.unwrap_or_else(|| DEFAULT_FIELD.to_string()),
        })
    }
}

fn resolve_rule(entry: FormatRuleEntry) -> Result<FormatRule, StageError> {
    let required = normalize_set(&entry.required);
    if required.is_empty() {
        return Err(StageError::InvalidConfig(format!(
            "format rule {} has no required extensions",
            entry.name
        )));
    }
    Ok(FormatRule {
        name: entry.name,
        required,
    })
}

fn normalize_set(list: &[String]) -> BTreeSet<String> {
    list.iter()
        .map(|ext| normalize_extension(ext))
        .filter(|ext| !ext.is_empty())
        .collect()
}

pub fn default_allowed_extensions() -> BTreeSet<String> {
    [
        "shp", "shx", "prj", "dbf", "kml", "geojson", "json", "tif", "tiff", "gpkg", "csv", "xml",
        "sld",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub fn default_archive_extensions() -> BTreeSet<String> {
    ["zip".to_string()].into_iter().collect()
}
