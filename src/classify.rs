use std::io::{self, Read, Seek};

use crate::domain::{CandidateKind, UploadCandidate};

const LOCAL_FILE_HEADER: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const EMPTY_ARCHIVE: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];
const SPANNED_ARCHIVE: [u8; 4] = [0x50, 0x4B, 0x07, 0x08];

/// Cheap signature check; it does not prove the archive can be opened.
pub fn is_archive(data: &[u8]) -> bool {
    matches!(
        data.get(..4),
        Some(header) if header == LOCAL_FILE_HEADER
            || header == EMPTY_ARCHIVE
            || header == SPANNED_ARCHIVE
    )
}

/// Signature check on a seekable source, leaving it rewound.
pub fn is_archive_reader<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = Vec::with_capacity(4);
    reader.by_ref().take(4).read_to_end(&mut header)?;
    reader.rewind()?;
    Ok(is_archive(&header))
}

pub fn kind_of(candidate: &UploadCandidate) -> CandidateKind {
    if is_archive(candidate.content()) {
        CandidateKind::Archive
    } else {
        CandidateKind::Plain
    }
}

#[derive(Debug, Default)]
pub struct Classified {
    pub plain: Vec<UploadCandidate>,
    pub archives: Vec<UploadCandidate>,
}

/// Partitions uploads by content, not by file name, preserving upload order.
pub fn classify(candidates: Vec<UploadCandidate>) -> Classified {
    let mut classified = Classified::default();
    for candidate in candidates {
        match kind_of(&candidate) {
            CandidateKind::Archive => classified.archives.push(candidate),
            CandidateKind::Plain => classified.plain.push(candidate),
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn detects_zip_signatures() {
        assert!(is_archive(&[0x50, 0x4B, 0x03, 0x04, 0x14, 0x00]));
        assert!(is_archive(&[0x50, 0x4B, 0x05, 0x06]));
        assert!(!is_archive(b"PK"));
        assert!(!is_archive(&[0x00, 0x00, 0x27, 0x0A]));
    }

    #[test]
    fn reader_check_rewinds() {
        let mut cursor = Cursor::new(vec![0x50, 0x4B, 0x03, 0x04, 0xFF]);
        assert!(is_archive_reader(&mut cursor).unwrap());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn classify_by_content_not_name() {
        let classified = classify(vec![
            UploadCandidate::new("fake.zip", b"not a zip".to_vec()),
            UploadCandidate::new("bundle.bin", LOCAL_FILE_HEADER.to_vec()),
        ]);
        assert_eq!(classified.plain.len(), 1);
        assert_eq!(classified.plain[0].file_name(), "fake.zip");
        assert_eq!(classified.archives[0].file_name(), "bundle.bin");
    }
}
