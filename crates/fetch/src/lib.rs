pub mod fetcher;
pub mod unpacker;

pub use fetcher::{FetchError, FetchOutcome, Fetcher};
pub use unpacker::{PdfUnit, UnpackError, Unpacker};
