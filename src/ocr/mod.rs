//! OCR response handling: vendor JSON validation and box reconstruction.

mod document;
mod reconstruct;

pub use document::{Annotation, Block, OcrDocument, Page, Paragraph, Symbol, Word, parse_document};
pub use reconstruct::{Granularity, ParagraphBox, reconstruct, reconstruct_json};
