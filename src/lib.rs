//! Image-to-text capture pipeline: photo normalization for OCR upload, OCR
//! response reconstruction, an interactive selection overlay and a voice
//! input session.

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod geometry;
pub mod imaging;
pub mod ocr;
pub mod overlay;
pub mod speech;
pub mod text_utils;
