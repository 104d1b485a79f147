pub mod extractor;
pub mod ocr;
pub mod pdf_text;
pub mod raster;

pub use extractor::{ExtractError, ExtractOutcome, Extractor};
pub use ocr::{NullOcrEngine, OcrEngine, OcrError, TesseractOcrEngine};
pub use raster::{RasterError, RasterPage};
