use super::document::{OcrDocument, Paragraph, parse_document};
use crate::geometry::BoundingPolygon;
use crate::text_utils::sanitize_text;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which level of the response becomes a selectable box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// One box per paragraph of the full-text hierarchy.
    #[default]
    #[serde(alias = "full-text")]
    Paragraph,
    /// One box per word/phrase annotation.
    #[serde(alias = "word")]
    Annotation,
}

impl Granularity {
    pub fn toggled(self) -> Self {
        match self {
            Granularity::Paragraph => Granularity::Annotation,
            Granularity::Annotation => Granularity::Paragraph,
        }
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Granularity::Paragraph => "paragraph",
            Granularity::Annotation => "annotation",
        };
        write!(f, "{}", label)
    }
}

impl std::str::FromStr for Granularity {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "paragraph" | "full-text" => Ok(Granularity::Paragraph),
            "annotation" | "word" => Ok(Granularity::Annotation),
            other => Err(anyhow::anyhow!("Unknown granularity: {other}")),
        }
    }
}

/// A reconstructed text region.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParagraphBox {
    pub text: String,
    pub bounds: BoundingPolygon,
    /// Mean word height in source pixels. `None` when there is no reliable
    /// height: zero-word paragraphs and annotation-level boxes.
    pub average_glyph_height: Option<f32>,
}

/// Flatten a validated document into boxes at the requested granularity.
pub fn reconstruct(document: &OcrDocument, mode: Granularity) -> Vec<ParagraphBox> {
    let boxes: Vec<ParagraphBox> = match mode {
        Granularity::Paragraph => document
            .pages
            .iter()
            .flat_map(|page| page.blocks.iter())
            .flat_map(|block| block.paragraphs.iter())
            .map(paragraph_box)
            .collect(),
        Granularity::Annotation => document
            .annotations
            .iter()
            .skip(1)
            .map(|annotation| ParagraphBox {
                text: sanitize_text(&annotation.text),
                bounds: annotation.bounds.clone(),
                average_glyph_height: None,
            })
            .collect(),
    };
    debug!(mode = %mode, count = boxes.len(), "Reconstructed OCR boxes");
    boxes
}

/// Parse, validate and reconstruct in one step.
pub fn reconstruct_json(json: &str, mode: Granularity) -> Result<Vec<ParagraphBox>> {
    let document = parse_document(json)?;
    Ok(reconstruct(&document, mode))
}

fn paragraph_box(paragraph: &Paragraph) -> ParagraphBox {
    let joined = paragraph
        .words
        .iter()
        .map(|word| word.text())
        .collect::<Vec<_>>()
        .join(" ");
    ParagraphBox {
        text: sanitize_text(&joined),
        bounds: paragraph.bounds.clone(),
        average_glyph_height: average_word_height(paragraph),
    }
}

fn average_word_height(paragraph: &Paragraph) -> Option<f32> {
    if paragraph.words.is_empty() {
        return None;
    }
    let total: f32 = paragraph.words.iter().map(|word| word.bounds.height()).sum();
    Some(total / paragraph.words.len() as f32)
}
