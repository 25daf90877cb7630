//! Vendor OCR response parsing.
//!
//! The response is first deserialized into permissive `Raw*` types that mirror
//! the wire format (every nested array optional), then validated into the
//! strict `OcrDocument` the reconstructor works on. Validation is all or
//! nothing: a single missing array or polygon rejects the whole response.

use crate::geometry::{BoundingPolygon, Point, Size};
use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct OcrDocument {
    pub pages: Vec<Page>,
    pub annotations: Vec<Annotation>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Pixel size the service reports for the page, when present.
    pub size: Option<Size>,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub bounds: BoundingPolygon,
    pub paragraphs: Vec<Paragraph>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    pub bounds: BoundingPolygon,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub bounds: BoundingPolygon,
    pub symbols: Vec<Symbol>,
}

impl Word {
    pub fn text(&self) -> String {
        self.symbols.iter().map(|s| s.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub text: String,
}

/// Flat word/phrase level entry. The first one in a response covers the whole
/// image.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub bounds: BoundingPolygon,
}

impl OcrDocument {
    pub fn empty() -> Self {
        Self {
            pages: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn paragraph_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|page| page.blocks.iter())
            .map(|block| block.paragraphs.len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.paragraph_count() == 0 && self.annotations.is_empty()
    }
}

/// Parse and validate a vendor response body.
///
/// Accepts either a single response object or the batch envelope
/// `{"responses": [..]}`, in which case the first response is used.
pub fn parse_document(json: &str) -> Result<OcrDocument> {
    let envelope: RawEnvelope =
        serde_json::from_str(json).context("OCR response is not valid JSON")?;
    let response = match envelope {
        RawEnvelope::Batch { mut responses } => {
            if responses.is_empty() {
                bail!("OCR response batch is empty");
            }
            responses.swap_remove(0)
        }
        RawEnvelope::Single(response) => response,
    };
    let document = response.validate()?;
    debug!(
        pages = document.pages.len(),
        paragraphs = document.paragraph_count(),
        annotations = document.annotations.len(),
        "Validated OCR document"
    );
    Ok(document)
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEnvelope {
    Batch { responses: Vec<RawResponse> },
    Single(RawResponse),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    text_annotations: Option<Vec<RawAnnotation>>,
    #[serde(default)]
    full_text_annotation: Option<RawFullText>,
    #[serde(default)]
    error: Option<RawStatus>,
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAnnotation {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    bounding_poly: Option<RawPoly>,
}

#[derive(Debug, Deserialize)]
struct RawFullText {
    #[serde(default)]
    pages: Option<Vec<RawPage>>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    width: Option<f32>,
    #[serde(default)]
    height: Option<f32>,
    #[serde(default)]
    blocks: Option<Vec<RawBlock>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBlock {
    #[serde(default)]
    bounding_box: Option<RawPoly>,
    #[serde(default)]
    paragraphs: Option<Vec<RawParagraph>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParagraph {
    #[serde(default)]
    bounding_box: Option<RawPoly>,
    #[serde(default)]
    words: Option<Vec<RawWord>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawWord {
    #[serde(default)]
    bounding_box: Option<RawPoly>,
    #[serde(default)]
    symbols: Option<Vec<RawSymbol>>,
}

#[derive(Debug, Deserialize)]
struct RawSymbol {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPoly {
    #[serde(default)]
    vertices: Option<Vec<RawVertex>>,
}

/// The service omits a coordinate when it is zero.
#[derive(Debug, Deserialize)]
struct RawVertex {
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
}

impl RawResponse {
    fn validate(self) -> Result<OcrDocument> {
        if let Some(status) = self.error {
            return Err(anyhow!(
                "OCR service reported an error (code {}): {}",
                status.code.unwrap_or_default(),
                status.message.unwrap_or_else(|| "no message".to_string())
            ));
        }

        let annotations = self
            .text_annotations
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let path = format!("textAnnotations[{i}]");
                Ok(Annotation {
                    text: raw
                        .description
                        .ok_or_else(|| missing(&path, "description"))?,
                    bounds: polygon(raw.bounding_poly, &path, "boundingPoly")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let pages = match self.full_text_annotation {
            None => Vec::new(),
            Some(full) => full
                .pages
                .ok_or_else(|| missing("fullTextAnnotation", "pages"))?
                .into_iter()
                .enumerate()
                .map(|(i, page)| page.validate(&format!("fullTextAnnotation.pages[{i}]")))
                .collect::<Result<Vec<_>>>()?,
        };

        Ok(OcrDocument { pages, annotations })
    }
}

impl RawPage {
    fn validate(self, path: &str) -> Result<Page> {
        let size = match (self.width, self.height) {
            (Some(width), Some(height)) => Some(Size::new(width, height)),
            _ => None,
        };
        let blocks = self
            .blocks
            .ok_or_else(|| missing(path, "blocks"))?
            .into_iter()
            .enumerate()
            .map(|(i, block)| block.validate(&format!("{path}.blocks[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Page { size, blocks })
    }
}

impl RawBlock {
    fn validate(self, path: &str) -> Result<Block> {
        let bounds = polygon(self.bounding_box, path, "boundingBox")?;
        let paragraphs = self
            .paragraphs
            .ok_or_else(|| missing(path, "paragraphs"))?
            .into_iter()
            .enumerate()
            .map(|(i, paragraph)| paragraph.validate(&format!("{path}.paragraphs[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Block { bounds, paragraphs })
    }
}

impl RawParagraph {
    fn validate(self, path: &str) -> Result<Paragraph> {
        let bounds = polygon(self.bounding_box, path, "boundingBox")?;
        let words = self
            .words
            .ok_or_else(|| missing(path, "words"))?
            .into_iter()
            .enumerate()
            .map(|(i, word)| word.validate(&format!("{path}.words[{i}]")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Paragraph { bounds, words })
    }
}

impl RawWord {
    fn validate(self, path: &str) -> Result<Word> {
        let bounds = polygon(self.bounding_box, path, "boundingBox")?;
        let symbols = self
            .symbols
            .ok_or_else(|| missing(path, "symbols"))?
            .into_iter()
            .enumerate()
            .map(|(i, symbol)| {
                symbol
                    .text
                    .map(|text| Symbol { text })
                    .ok_or_else(|| missing(&format!("{path}.symbols[{i}]"), "text"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Word { bounds, symbols })
    }
}

fn polygon(raw: Option<RawPoly>, path: &str, field: &str) -> Result<BoundingPolygon> {
    let vertices = raw
        .and_then(|poly| poly.vertices)
        .ok_or_else(|| missing(path, &format!("{field}.vertices")))?;
    if vertices.is_empty() {
        bail!("{path}.{field}.vertices is empty");
    }
    Ok(BoundingPolygon::new(
        vertices.into_iter().map(|v| Point::new(v.x, v.y)).collect(),
    ))
}

fn missing(path: &str, field: &str) -> anyhow::Error {
    anyhow!("{path}.{field} is missing")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_without_text_is_an_empty_document() {
        let doc = parse_document("{}").expect("empty response should parse");
        assert!(doc.is_empty());
        let doc = parse_document(r#"{"responses":[{}]}"#).expect("empty batch entry should parse");
        assert_eq!(doc, OcrDocument::empty());
    }

    #[test]
    fn omitted_coordinates_default_to_zero() {
        let doc = parse_document(
            r#"{"textAnnotations":[{"description":"hi","boundingPoly":{"vertices":[{},{"x":5},{"x":5,"y":7},{"y":7}]}}]}"#,
        )
        .expect("annotation should parse");
        let vertices = &doc.annotations[0].bounds.vertices;
        assert_eq!(vertices[0], Point::new(0.0, 0.0));
        assert_eq!(vertices[1], Point::new(5.0, 0.0));
        assert_eq!(vertices[3], Point::new(0.0, 7.0));
    }

    #[test]
    fn missing_nested_array_names_its_path() {
        let json = r#"{"fullTextAnnotation":{"pages":[{"blocks":[
            {"boundingBox":{"vertices":[{"x":1,"y":1}]},"paragraphs":[]},
            {"boundingBox":{"vertices":[{"x":1,"y":1}]}}
        ]}]}}"#;
        let err = parse_document(json).expect_err("missing paragraphs must fail");
        assert_eq!(
            err.to_string(),
            "fullTextAnnotation.pages[0].blocks[1].paragraphs is missing"
        );
    }

    #[test]
    fn missing_word_polygon_rejects_document() {
        let json = r#"{"fullTextAnnotation":{"pages":[{"blocks":[
            {"boundingBox":{"vertices":[{"x":1,"y":1}]},"paragraphs":[
                {"boundingBox":{"vertices":[{"x":1,"y":1}]},"words":[{"symbols":[{"text":"a"}]}]}
            ]}
        ]}]}}"#;
        let err = parse_document(json).expect_err("missing word polygon must fail");
        assert!(err.to_string().contains("words[0].boundingBox.vertices is missing"));
    }

    #[test]
    fn service_error_is_reported() {
        let err = parse_document(r#"{"error":{"code":3,"message":"Bad image data."}}"#)
            .expect_err("error payload must fail");
        assert!(err.to_string().contains("Bad image data."));
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(parse_document("{\"textAnnotations\": [").is_err());
    }

    #[test]
    fn page_size_is_kept_when_reported() {
        let doc = parse_document(
            r#"{"fullTextAnnotation":{"pages":[{"width":640,"height":480,"blocks":[]}]}}"#,
        )
        .expect("page should parse");
        assert_eq!(doc.pages[0].size, Some(Size::new(640.0, 480.0)));
    }
}
