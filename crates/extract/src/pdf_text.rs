//! Step 1 of the Extractor algorithm (§4.3): read the PDF's native text layer, page by page,
//! in document order.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfTextError {
  #[error("failed to parse PDF: {0}")]
  Parse(String),
}

/// Per-page text layer content, in page order (page 1 first).
pub fn extract_text_layer(pdf_bytes: &[u8]) -> Result<Vec<String>, PdfTextError> {
  let document = lopdf::Document::load_mem(pdf_bytes).map_err(|e| PdfTextError::Parse(e.to_string()))?;

  // `get_pages` returns a `BTreeMap<page_number, ObjectId>`, iteration order follows the
  // (sorted) page number, not dictionary insertion order, so concatenation is deterministic.
  let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();

  let mut pages = Vec::with_capacity(page_numbers.len());
  for page_number in page_numbers {
    let text = document
      .extract_text(&[page_number])
      .unwrap_or_default()
      .trim()
      .to_string();
    pages.push(text);
  }
  Ok(pages)
}

/// Number of pages in the PDF, used to decide how many pages to rasterise for OCR.
pub fn page_count(pdf_bytes: &[u8]) -> Result<usize, PdfTextError> {
  let document = lopdf::Document::load_mem(pdf_bytes).map_err(|e| PdfTextError::Parse(e.to_string()))?;
  Ok(document.get_pages().len())
}

/// Count of non-whitespace characters across all pages, used against `text_threshold_chars`.
pub fn non_whitespace_char_count(pages: &[String]) -> usize {
  pages.iter().flat_map(|p| p.chars()).filter(|c| !c.is_whitespace()).count()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn non_whitespace_count_ignores_spaces_and_newlines() {
    let pages = vec!["a b\nc".to_string(), "  d  ".to_string()];
    assert_eq!(non_whitespace_char_count(&pages), 4);
  }

  #[test]
  fn non_whitespace_count_of_empty_pages_is_zero() {
    let pages = vec!["   ".to_string(), "\n\t".to_string()];
    assert_eq!(non_whitespace_char_count(&pages), 0);
  }

  #[test]
  fn malformed_bytes_fail_to_parse() {
    let err = extract_text_layer(b"not a pdf at all").unwrap_err();
    assert!(matches!(err, PdfTextError::Parse(_)));
  }
}
