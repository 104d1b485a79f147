//! The `OcrEngine` external collaborator (§6): `Recognize(image, languages, psm) -> text`.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

#[derive(Error, Debug)]
pub enum OcrError {
  #[error("tesseract process failed to start: {0}")]
  Spawn(String),
  #[error("tesseract exited with status {status}: {stderr}")]
  NonZeroExit { status: i32, stderr: String },
  #[error("OCR call timed out")]
  Timeout,
  #[error("tesseract output was not valid UTF-8")]
  InvalidUtf8,
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
  async fn recognize(&self, png_bytes: &[u8], languages: &str, psm: &str) -> Result<String, OcrError>;
}

/// Shells out to an external `tesseract` binary: `tesseract - stdout -l <languages> --psm <psm>`,
/// piping the PNG bytes on stdin and reading recognised text from stdout.
pub struct TesseractOcrEngine {
  timeout: Duration,
}

impl TesseractOcrEngine {
  pub fn new(timeout: Duration) -> Self {
    Self { timeout }
  }
}

#[async_trait]
impl OcrEngine for TesseractOcrEngine {
  async fn recognize(&self, png_bytes: &[u8], languages: &str, psm: &str) -> Result<String, OcrError> {
    let run = async {
      let mut child = Command::new("tesseract")
        .args(["-", "stdout", "-l", languages, "--psm", psm])
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .map_err(|e| OcrError::Spawn(e.to_string()))?;

      if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(png_bytes).await.map_err(|e| OcrError::Spawn(e.to_string()))?;
      }

      let output = child.wait_with_output().await.map_err(|e| OcrError::Spawn(e.to_string()))?;

      if !output.status.success() {
        return Err(OcrError::NonZeroExit {
          status: output.status.code().unwrap_or(-1),
          stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
      }

      String::from_utf8(output.stdout).map_err(|_| OcrError::InvalidUtf8)
    };

    match tokio::time::timeout(self.timeout, run).await {
      Ok(result) => result,
      Err(_) => {
        warn!("tesseract OCR call exceeded timeout of {:?}", self.timeout);
        Err(OcrError::Timeout)
      }
    }
  }
}

/// Test double that recognises nothing; used where `tesseract` is not installed. Scenarios
/// that actually exercise the OCR path substitute a recording/fixture-returning engine.
pub struct NullOcrEngine;

#[async_trait]
impl OcrEngine for NullOcrEngine {
  async fn recognize(&self, _png_bytes: &[u8], _languages: &str, _psm: &str) -> Result<String, OcrError> {
    Ok(String::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn null_engine_returns_empty_text() {
    let engine = NullOcrEngine;
    let text = engine.recognize(b"not really a png", "rus+eng", "auto").await.unwrap();
    assert!(text.is_empty());
  }

  // Requires a `tesseract` binary on PATH; skips gracefully when absent, matching the
  // external-service test convention used elsewhere in this core.
  #[tokio::test]
  async fn tesseract_engine_skips_without_binary() {
    let engine = TesseractOcrEngine::new(Duration::from_secs(5));
    match engine.recognize(b"\x89PNG\r\n\x1a\n", "eng", "6").await {
      Ok(_) => {}
      Err(OcrError::Spawn(_)) => {
        eprintln!("tesseract not installed, skipping");
      }
      Err(e) => panic!("unexpected OCR error: {e}"),
    }
  }
}
