//! Normalises a fetched buffer into an ordered sequence of PDF units (§4.2).

use etl_core::ErrorKind;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use thiserror::Error;
use tracing::warn;

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Error, Debug)]
pub enum UnpackError {
  #[error("neither PDF nor ZIP magic bytes found")]
  UnsupportedType,
  #[error("corrupt ZIP archive: {0}")]
  CorruptArchive(String),
  #[error("ZIP archive contains no .pdf entries")]
  NoPdfInArchive,
  #[error("archive declares {declared} bytes uncompressed, exceeding bomb threshold {threshold}")]
  ArchiveBomb { declared: u64, threshold: u64 },
}

impl UnpackError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      UnpackError::UnsupportedType => ErrorKind::UnsupportedType,
      UnpackError::CorruptArchive(_) => ErrorKind::CorruptArchive,
      UnpackError::NoPdfInArchive => ErrorKind::UnsupportedType,
      UnpackError::ArchiveBomb { .. } => ErrorKind::ArchiveBomb,
    }
  }
}

/// One `(file_name, pdf_bytes)` pair yielded by the unpacker, in archive/declared order (I5).
#[derive(Debug, Clone)]
pub struct PdfUnit {
  pub file_name: String,
  pub pdf_bytes: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct Unpacker {
  max_bytes: u64,
}

impl Unpacker {
  pub fn new(max_bytes: u64) -> Self {
    Self { max_bytes }
  }

  /// `declared_name` is only used as the single PDF unit's file name when `buffer` is a bare
  /// PDF; for ZIPs the entry names (flattened to basename) are used instead.
  pub fn unpack(&self, buffer: &[u8], declared_name: &str) -> Result<Vec<PdfUnit>, UnpackError> {
    if buffer.starts_with(PDF_MAGIC) {
      return Ok(vec![PdfUnit {
        file_name: declared_name.to_string(),
        pdf_bytes: buffer.to_vec(),
      }]);
    }

    if buffer.starts_with(ZIP_MAGIC) {
      return self.unpack_zip(buffer);
    }

    Err(UnpackError::UnsupportedType)
  }

  fn unpack_zip(&self, buffer: &[u8]) -> Result<Vec<PdfUnit>, UnpackError> {
    let mut archive =
      zip::ZipArchive::new(Cursor::new(buffer)).map_err(|e| UnpackError::CorruptArchive(e.to_string()))?;

    let bomb_threshold = self.max_bytes.saturating_mul(10);
    let declared_total: u64 = (0..archive.len())
      .filter_map(|i| archive.by_index(i).ok().map(|f| f.size()))
      .sum();
    if declared_total > bomb_threshold {
      return Err(UnpackError::ArchiveBomb {
        declared: declared_total,
        threshold: bomb_threshold,
      });
    }

    let mut seen_basenames: HashMap<String, usize> = HashMap::new();
    let mut units = Vec::new();

    for i in 0..archive.len() {
      let mut entry = archive
        .by_index(i)
        .map_err(|e| UnpackError::CorruptArchive(e.to_string()))?;

      let raw_name = entry.name().to_string();
      if !raw_name.to_lowercase().ends_with(".pdf") {
        continue;
      }
      if entry.size() > self.max_bytes {
        warn!("skipping oversize ZIP entry {raw_name} ({} bytes)", entry.size());
        continue;
      }

      let basename = std::path::Path::new(&raw_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or(raw_name);

      let file_name = match seen_basenames.get(&basename) {
        None => {
          seen_basenames.insert(basename.clone(), 1);
          basename
        }
        Some(count) => {
          let deduped = format!("{basename}#{count}");
          seen_basenames.insert(basename, count + 1);
          deduped
        }
      };

      let mut pdf_bytes = Vec::with_capacity(entry.size() as usize);
      entry
        .read_to_end(&mut pdf_bytes)
        .map_err(|e| UnpackError::CorruptArchive(e.to_string()))?;

      units.push(PdfUnit { file_name, pdf_bytes });
    }

    if units.is_empty() {
      return Err(UnpackError::NoPdfInArchive);
    }

    Ok(units)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use zip::write::SimpleFileOptions;

  fn make_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    {
      let mut writer = zip::ZipWriter::new(Cursor::new(&mut buf));
      for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content).unwrap();
      }
      writer.finish().unwrap();
    }
    buf
  }

  #[test]
  fn unpacks_bare_pdf() {
    let unpacker = Unpacker::new(1024 * 1024);
    let buffer = b"%PDF-1.4\n...";
    let units = unpacker.unpack(buffer, "doc.pdf").unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].file_name, "doc.pdf");
  }

  #[test]
  fn rejects_unsupported_type() {
    let unpacker = Unpacker::new(1024);
    let err = unpacker.unpack(b"not a pdf or zip", "x").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedType);
  }

  #[test]
  fn unpacks_zip_preserving_archive_order() {
    let zip = make_zip(&[
      ("a.pdf", b"%PDF-a"),
      ("b.pdf", b"%PDF-b"),
      ("notes.txt", b"ignore me"),
      ("c.pdf", b"%PDF-c"),
    ]);
    let unpacker = Unpacker::new(1024 * 1024);
    let units = unpacker.unpack(&zip, "archive.zip").unwrap();
    let names: Vec<_> = units.iter().map(|u| u.file_name.as_str()).collect();
    assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf"]);
  }

  #[test]
  fn flattens_nested_paths_and_dedupes_basenames() {
    let zip = make_zip(&[("dir1/report.pdf", b"%PDF-1"), ("dir2/report.pdf", b"%PDF-2")]);
    let unpacker = Unpacker::new(1024 * 1024);
    let units = unpacker.unpack(&zip, "archive.zip").unwrap();
    let names: Vec<_> = units.iter().map(|u| u.file_name.as_str()).collect();
    assert_eq!(names, vec!["report.pdf", "report.pdf#1"]);
  }

  #[test]
  fn empty_zip_of_pdfs_fails() {
    let zip = make_zip(&[("readme.txt", b"hello")]);
    let unpacker = Unpacker::new(1024 * 1024);
    let err = unpacker.unpack(&zip, "archive.zip").unwrap_err();
    assert!(matches!(err, UnpackError::NoPdfInArchive));
  }

  #[test]
  fn archive_bomb_is_rejected() {
    // Declared size check operates on what the ZIP central directory claims, not actual bytes.
    let zip = make_zip(&[("a.pdf", &vec![0u8; 2048])]);
    let unpacker = Unpacker::new(100); // bomb threshold = 1000, declared = 2048
    let err = unpacker.unpack(&zip, "archive.zip").unwrap_err();
    assert!(matches!(err, UnpackError::ArchiveBomb { .. }));
  }

  #[test]
  fn oversize_entries_are_skipped_not_fatal() {
    let zip = make_zip(&[("small.pdf", b"%PDF-small"), ("big.pdf", &vec![0u8; 5000])]);
    let unpacker = Unpacker::new(4000); // big.pdf exceeds cap, bomb threshold=40000 so no bomb
    let units = unpacker.unpack(&zip, "archive.zip").unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].file_name, "small.pdf");
  }
}
