use std::fs::{self, File};
use std::io::Read;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::naming::extension_of;

pub type InspectError = Box<dyn std::error::Error + Send + Sync>;

/// Decides whether a staged file is a well-formed instance of a supported
/// format. Implementations must not modify the file.
pub trait Inspector {
    fn can_read(&self, path: &Path) -> Result<bool, InspectError>;
}

impl<I: Inspector + ?Sized> Inspector for &I {
    fn can_read(&self, path: &Path) -> Result<bool, InspectError> {
        (**self).can_read(path)
    }
}

impl<I: Inspector + ?Sized> Inspector for Box<I> {
    fn can_read(&self, path: &Path) -> Result<bool, InspectError> {
        (**self).can_read(path)
    }
}

/// Wraps an [`Inspector`] so that nothing it does can fail the run.
pub struct ReadabilityValidator<I> {
    inspector: I,
}

impl<I: Inspector> ReadabilityValidator<I> {
    pub fn new(inspector: I) -> Self {
        Self { inspector }
    }

    /// `false` for empty or missing files, for files the inspector rejects,
    /// and whenever the inspector errors or panics.
    pub fn check(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {}
            Ok(_) => {
                tracing::debug!(path = %path.display(), "empty or not a regular file");
                return false;
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "cannot stat staged file");
                return false;
            }
        }

        match panic::catch_unwind(AssertUnwindSafe(|| self.inspector.can_read(path))) {
            Ok(Ok(readable)) => {
                if !readable {
                    tracing::debug!(path = %path.display(), "inspector rejected file");
                }
                readable
            }
            Ok(Err(err)) => {
                tracing::warn!(path = %path.display(), error = %err, "inspector failed");
                false
            }
            Err(_) => {
                tracing::warn!(path = %path.display(), "inspector panicked");
                false
            }
        }
    }
}

const HEADER_LEN: u64 = 100;
const SHAPE_FILE_CODE: [u8; 4] = [0x00, 0x00, 0x27, 0x0A];
const DBASE_VERSIONS: [u8; 12] = [
    0x02, 0x03, 0x30, 0x31, 0x32, 0x43, 0x63, 0x83, 0x8B, 0xCB, 0xF5, 0xFB,
];
const WKT_KEYWORDS: [&str; 10] = [
    "PROJCS", "GEOGCS", "GEOCCS", "COMPD_CS", "VERT_CS", "LOCAL_CS", "PROJCRS", "GEOGCRS",
    "GEODCRS", "COMPOUNDCRS",
];
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Built-in inspector that recognises each supported format by its leading
/// bytes. It proves a file plausibly has the claimed format; it does not
/// parse geometry.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureInspector;

impl Inspector for SignatureInspector {
    fn can_read(&self, path: &Path) -> Result<bool, InspectError> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or("file name is not valid UTF-8")?;
        let Some(ext) = extension_of(name) else {
            return Ok(false);
        };
        // `data.shp.xml` is checked as xml.
        let ext = ext.rsplit('.').next().unwrap_or_default().to_string();

        match ext.as_str() {
            "shp" | "shx" => {
                let header = read_header(path)?;
                Ok(header.len() >= HEADER_LEN as usize && header[..4] == SHAPE_FILE_CODE)
            }
            "dbf" => {
                let header = read_header(path)?;
                Ok(header.len() >= 32 && DBASE_VERSIONS.contains(&header[0]))
            }
            "prj" => {
                let text = fs::read_to_string(path)?;
                let text = text.trim_start_matches('\u{feff}').trim_start();
                Ok(WKT_KEYWORDS.iter().any(|keyword| text.starts_with(keyword)))
            }
            "geojson" | "json" => {
                let content = fs::read(path)?;
                let value: serde_json::Value = serde_json::from_slice(&content)?;
                Ok(value.get("type").and_then(|kind| kind.as_str()).is_some())
            }
            "kml" | "gml" | "xml" | "sld" => {
                let text = fs::read_to_string(path)?;
                Ok(text.trim_start_matches('\u{feff}').trim_start().starts_with('<'))
            }
            "tif" | "tiff" => {
                let header = read_header(path)?;
                Ok(matches!(
                    header.get(..4),
                    Some(b"II*\0") | Some(b"MM\0*") | Some(b"II+\0") | Some(b"MM\0+")
                ))
            }
            "gpkg" => {
                let header = read_header(path)?;
                Ok(header.starts_with(SQLITE_HEADER))
            }
            "csv" => {
                let text = fs::read_to_string(path)?;
                Ok(text
                    .lines()
                    .next()
                    .is_some_and(|header| !header.trim().is_empty()))
            }
            other => Err(format!("no signature known for .{other}").into()),
        }
    }
}

fn read_header(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    File::open(path)?.take(HEADER_LEN).read_to_end(&mut header)?;
    Ok(header)
}
