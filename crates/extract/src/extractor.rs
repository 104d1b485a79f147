//! Produces UTF-8 text from a PDF (§4.3): native text layer first, OCR fallback second.

use crate::ocr::OcrEngine;
use crate::pdf_text::{self, PdfTextError};
use crate::raster::{self, RasterError};
use etl_core::{ErrorKind, ExtractionMode};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExtractError {
  #[error("unreadable PDF: {0}")]
  UnreadablePdf(String),
  #[error("OCR failed: {0}")]
  OcrFailed(String),
  #[error("extraction produced empty text after OCR")]
  EmptyAfterOcr,
}

impl ExtractError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      ExtractError::UnreadablePdf(_) => ErrorKind::UnreadablePdf,
      ExtractError::OcrFailed(_) => ErrorKind::OcrFailed,
      ExtractError::EmptyAfterOcr => ErrorKind::EmptyAfterOcr,
    }
  }
}

impl From<PdfTextError> for ExtractError {
  fn from(e: PdfTextError) -> Self {
    ExtractError::UnreadablePdf(e.to_string())
  }
}

impl From<RasterError> for ExtractError {
  fn from(e: RasterError) -> Self {
    ExtractError::OcrFailed(e.to_string())
  }
}

#[derive(Debug, Clone)]
pub struct ExtractOutcome {
  pub text: String,
  pub extraction_mode: ExtractionMode,
}

pub struct Extractor<'a> {
  pub ocr_engine: &'a dyn OcrEngine,
  pub text_threshold_chars: usize,
  pub render_scale: f64,
  pub ocr_languages: String,
}

impl<'a> Extractor<'a> {
  pub fn new(ocr_engine: &'a dyn OcrEngine, text_threshold_chars: usize, render_scale: f64, ocr_languages: impl Into<String>) -> Self {
    Self {
      ocr_engine,
      text_threshold_chars,
      render_scale,
      ocr_languages: ocr_languages.into(),
    }
  }

  pub async fn extract(&self, pdf_bytes: &[u8]) -> Result<ExtractOutcome, ExtractError> {
    let pages = pdf_text::extract_text_layer(pdf_bytes)?;
    let non_whitespace = pdf_text::non_whitespace_char_count(&pages);

    if non_whitespace >= self.text_threshold_chars {
      let text = pages.join("\n\n").trim().to_string();
      debug!("text layer sufficient: {} non-whitespace chars", non_whitespace);
      return Ok(ExtractOutcome {
        text,
        extraction_mode: ExtractionMode::TextLayer,
      });
    }

    info!(
      "text layer below threshold ({} < {}), falling back to OCR",
      non_whitespace, self.text_threshold_chars
    );

    let pages_needing_ocr: Vec<usize> = pages
      .iter()
      .enumerate()
      .filter(|(_, text)| text.trim().is_empty())
      .map(|(i, _)| i)
      .collect();
    let had_partial_text_layer = non_whitespace > 0 && pages_needing_ocr.len() < pages.len();

    let rasterised = raster::rasterize_pages(pdf_bytes, self.render_scale)?;

    let mut ocr_pages = Vec::with_capacity(rasterised.len());
    for raster_page in &rasterised {
      let recognised = self
        .ocr_engine
        .recognize(&raster_page.png_bytes, &self.ocr_languages, "auto")
        .await
        .map_err(|e| ExtractError::OcrFailed(e.to_string()))?;
      ocr_pages.push(recognised.trim().to_string());
    }

    let merged: Vec<String> = if had_partial_text_layer {
      pages
        .iter()
        .enumerate()
        .map(|(i, text_layer)| {
          if text_layer.trim().is_empty() {
            ocr_pages.get(i).cloned().unwrap_or_default()
          } else {
            text_layer.clone()
          }
        })
        .collect()
    } else {
      ocr_pages
    };

    let text = merged.join("\n\n").trim().to_string();
    if text.is_empty() {
      return Err(ExtractError::EmptyAfterOcr);
    }

    let extraction_mode = if had_partial_text_layer {
      ExtractionMode::Mixed
    } else {
      ExtractionMode::Ocr
    };

    Ok(ExtractOutcome { text, extraction_mode })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ocr::NullOcrEngine;

  #[tokio::test]
  async fn unreadable_pdf_fails_before_touching_ocr() {
    let ocr = NullOcrEngine;
    let extractor = Extractor::new(&ocr, 200, 2.0, "rus+eng");
    let err = extractor.extract(b"not a pdf").await.unwrap_err();
    assert_eq!(err.kind(), etl_core::ErrorKind::UnreadablePdf);
  }
}
