#![allow(dead_code)]

use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use std::path::Path;

use geostage::inspect::{InspectError, Inspector};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// Builds a zip in memory. Names ending in `/` become directory entries.
pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        if name.ends_with('/') {
            writer
                .add_directory(*name, SimpleFileOptions::default())
                .unwrap();
        } else {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap().into_inner()
}

pub fn zip_owned(entries: &[(String, Vec<u8>)]) -> Vec<u8> {
    let refs: Vec<(&str, &[u8])> = entries
        .iter()
        .map(|(name, content)| (name.as_str(), content.as_slice()))
        .collect();
    zip_of(&refs)
}

pub fn shape_header() -> Vec<u8> {
    let mut bytes = vec![0u8; 100];
    bytes[..4].copy_from_slice(&[0x00, 0x00, 0x27, 0x0A]);
    bytes
}

pub fn dbf_header() -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[0] = 0x03;
    bytes
}

pub const PRJ: &[u8] = b"GEOGCS[\"GCS_WGS_1984\",DATUM[\"D_WGS_1984\"]]";

/// A complete, signature-valid shapefile set under `base`.
pub fn shapefile_set(base: &str) -> Vec<(String, Vec<u8>)> {
    vec![
        (format!("{base}.shp"), shape_header()),
        (format!("{base}.dbf"), dbf_header()),
        (format!("{base}.shx"), shape_header()),
        (format!("{base}.prj"), PRJ.to_vec()),
    ]
}

pub struct AcceptAll;

impl Inspector for AcceptAll {
    fn can_read(&self, _path: &Path) -> Result<bool, InspectError> {
        Ok(true)
    }
}

/// Rejects the listed staged names and accepts everything else.
pub struct RejectNames(pub BTreeSet<String>);

impl RejectNames {
    pub fn new(names: &[&str]) -> Self {
        Self(names.iter().map(|name| name.to_string()).collect())
    }
}

impl Inspector for RejectNames {
    fn can_read(&self, path: &Path) -> Result<bool, InspectError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        Ok(!self.0.contains(name))
    }
}

pub fn sorted(names: Vec<&str>) -> Vec<String> {
    let mut names: Vec<String> = names.into_iter().map(str::to_string).collect();
    names.sort();
    names
}
