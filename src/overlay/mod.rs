//! Zoomable OCR overlay: box placement, viewport and selection.
//!
//! `OverlayState` is the single holder for everything the presentation layer
//! needs to draw one captured image with its recognized regions. Every change
//! goes through `reduce`, mirroring how gesture callbacks arrive one after the
//! other on the input channel.

mod selection;
mod viewport;

pub use hit_test::{HitRect, HitRectCache, first_hit, map_box};
pub use selection::{DragSelect, SelectionSet};
pub use viewport::{ViewportState, ZoomLimits};

use crate::config::AppConfig;
use crate::geometry::{Offset, Point, Size};
use crate::ocr::{Granularity, OcrDocument, ParagraphBox, reconstruct};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum OverlayMessage {
    DocumentLoaded {
        document: OcrDocument,
        image_size: Size,
    },
    GranularityToggled,
    GranularitySet(Granularity),
    ContainerResized(Size),
    Transformed {
        pan: Offset,
        zoom: f32,
    },
    Tapped(Point),
    DragStarted(Point),
    DragMoved(Point),
    DragEnded,
    SelectAllToggled,
    Reset,
}

/// What the presentation layer has to redraw after a message.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEffect {
    BoxesRebuilt { count: usize },
    SelectionChanged { selected: Vec<usize> },
    ViewportChanged,
}

#[derive(Debug)]
pub struct OverlayState {
    document: Option<OcrDocument>,
    image_size: Size,
    granularity: Granularity,
    boxes: Vec<ParagraphBox>,
    revision: u64,
    selection: SelectionSet,
    drag: DragSelect,
    viewport: ViewportState,
    hit_cache: HitRectCache,
    hit_inset: f32,
}

impl OverlayState {
    pub fn new(granularity: Granularity, limits: ZoomLimits, hit_inset: f32) -> Self {
        Self {
            document: None,
            image_size: Size::default(),
            granularity,
            boxes: Vec::new(),
            revision: 0,
            selection: SelectionSet::default(),
            drag: DragSelect::default(),
            viewport: ViewportState::new(Size::default(), limits),
            hit_cache: HitRectCache::default(),
            hit_inset,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.default_granularity,
            config.zoom_limits(),
            config.hit_inset,
        )
    }

    pub fn reduce(&mut self, message: OverlayMessage) -> Vec<OverlayEffect> {
        let mut effects = Vec::new();
        match message {
            OverlayMessage::DocumentLoaded {
                document,
                image_size,
            } => self.handle_document_loaded(document, image_size, &mut effects),
            OverlayMessage::GranularityToggled => {
                self.handle_granularity_set(self.granularity.toggled(), &mut effects)
            }
            OverlayMessage::GranularitySet(mode) => {
                self.handle_granularity_set(mode, &mut effects)
            }
            OverlayMessage::ContainerResized(size) => {
                self.viewport.set_container(size);
                effects.push(OverlayEffect::ViewportChanged);
            }
            OverlayMessage::Transformed { pan, zoom } => {
                let before = self.viewport;
                self.viewport.apply_gesture(pan, zoom);
                if self.viewport != before {
                    effects.push(OverlayEffect::ViewportChanged);
                }
            }
            OverlayMessage::Tapped(point) => self.handle_tap(point, &mut effects),
            OverlayMessage::DragStarted(point) => {
                self.drag.begin(self.viewport.to_content(point));
            }
            OverlayMessage::DragMoved(point) => self.handle_drag_moved(point, &mut effects),
            OverlayMessage::DragEnded => self.drag.end(),
            OverlayMessage::SelectAllToggled => {
                self.selection.toggle_all(self.boxes.len());
                effects.push(self.selection_effect());
            }
            OverlayMessage::Reset => self.handle_reset(&mut effects),
        }
        effects
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn boxes(&self) -> &[ParagraphBox] {
        &self.boxes
    }

    pub fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub fn viewport(&self) -> &ViewportState {
        &self.viewport
    }

    pub fn drag_path(&self) -> &[Point] {
        self.drag.path()
    }

    /// Current hit rectangles in unzoomed container space.
    pub fn hit_rects(&mut self) -> &[HitRect] {
        self.hit_cache.rects(
            self.revision,
            &self.boxes,
            self.image_size,
            self.viewport.container,
            self.hit_inset,
        )
    }

    pub fn selected_boxes(&self) -> Vec<&ParagraphBox> {
        self.selection
            .indices()
            .into_iter()
            .filter_map(|idx| self.boxes.get(idx))
            .collect()
    }

    /// Selected texts in box order, ready to hand to translation.
    pub fn selected_text(&self) -> String {
        let separator = match self.granularity {
            Granularity::Paragraph => "\n",
            Granularity::Annotation => " ",
        };
        self.selected_boxes()
            .into_iter()
            .map(|b| b.text.as_str())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(separator)
    }

    fn handle_document_loaded(
        &mut self,
        document: OcrDocument,
        image_size: Size,
        effects: &mut Vec<OverlayEffect>,
    ) {
        info!(
            paragraphs = document.paragraph_count(),
            annotations = document.annotations.len(),
            width = image_size.width,
            height = image_size.height,
            "Loaded OCR document into overlay"
        );
        self.document = Some(document);
        self.image_size = image_size;
        self.viewport.reset();
        self.drag.end();
        self.rebuild_boxes(effects);
        effects.push(OverlayEffect::ViewportChanged);
    }

    fn handle_granularity_set(&mut self, mode: Granularity, effects: &mut Vec<OverlayEffect>) {
        if mode == self.granularity {
            return;
        }
        debug!(from = %self.granularity, to = %mode, "Switching granularity");
        self.granularity = mode;
        self.drag.end();
        self.rebuild_boxes(effects);
    }

    fn handle_tap(&mut self, point: Point, effects: &mut Vec<OverlayEffect>) {
        let content = self.viewport.to_content(point);
        let Some(index) = first_hit(self.hit_rects(), content) else {
            return;
        };
        self.selection.toggle(index);
        effects.push(self.selection_effect());
    }

    fn handle_drag_moved(&mut self, point: Point, effects: &mut Vec<OverlayEffect>) {
        if !self.drag.is_active() {
            return;
        }
        let content = self.viewport.to_content(point);
        let rects = self.hit_cache.rects(
            self.revision,
            &self.boxes,
            self.image_size,
            self.viewport.container,
            self.hit_inset,
        );
        if self.drag.update(content, rects, &mut self.selection).is_some() {
            effects.push(self.selection_effect());
        }
    }

    fn handle_reset(&mut self, effects: &mut Vec<OverlayEffect>) {
        self.document = None;
        self.image_size = Size::default();
        self.viewport.reset();
        self.drag.end();
        self.rebuild_boxes(effects);
        effects.push(OverlayEffect::ViewportChanged);
    }

    fn rebuild_boxes(&mut self, effects: &mut Vec<OverlayEffect>) {
        self.boxes = self
            .document
            .as_ref()
            .map(|doc| reconstruct(doc, self.granularity))
            .unwrap_or_default();
        self.revision = self.revision.wrapping_add(1);
        let had_selection = !self.selection.is_empty();
        self.selection.clear();
        effects.push(OverlayEffect::BoxesRebuilt {
            count: self.boxes.len(),
        });
        if had_selection {
            effects.push(self.selection_effect());
        }
    }

    fn selection_effect(&self) -> OverlayEffect {
        OverlayEffect::SelectionChanged {
            selected: self.selection.indices(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingPolygon;
    use crate::ocr::{Annotation, Block, Page, Paragraph, Symbol, Word};

    fn quad(x0: f32, y0: f32, x1: f32, y1: f32) -> BoundingPolygon {
        BoundingPolygon::new(vec![
            Point::new(x0, y0),
            Point::new(x1, y0),
            Point::new(x1, y1),
            Point::new(x0, y1),
        ])
    }

    fn word(text: &str, y0: f32, y1: f32) -> Word {
        Word {
            bounds: quad(0.0, y0, 50.0, y1),
            symbols: text
                .chars()
                .map(|c| Symbol {
                    text: c.to_string(),
                })
                .collect(),
        }
    }

    /// Three stacked paragraphs in a 400x300 image plus word annotations.
    fn document() -> OcrDocument {
        let paragraphs = ["guten tag", "wie geht", "es dir"]
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let top = 20.0 + i as f32 * 100.0;
                Paragraph {
                    bounds: quad(20.0, top, 380.0, top + 40.0),
                    words: text
                        .split(' ')
                        .map(|w| word(w, top, top + 40.0))
                        .collect(),
                }
            })
            .collect();
        OcrDocument {
            pages: vec![Page {
                size: None,
                blocks: vec![Block {
                    bounds: quad(0.0, 0.0, 400.0, 300.0),
                    paragraphs,
                }],
            }],
            annotations: vec![
                Annotation {
                    text: "guten tag wie geht es dir".to_string(),
                    bounds: quad(0.0, 0.0, 400.0, 300.0),
                },
                Annotation {
                    text: "guten".to_string(),
                    bounds: quad(20.0, 20.0, 120.0, 60.0),
                },
                Annotation {
                    text: "tag".to_string(),
                    bounds: quad(200.0, 20.0, 280.0, 60.0),
                },
            ],
        }
    }

    fn loaded_overlay() -> OverlayState {
        let mut overlay = OverlayState::new(Granularity::Paragraph, ZoomLimits::default(), 4.0);
        overlay.reduce(OverlayMessage::ContainerResized(Size::new(400.0, 300.0)));
        overlay.reduce(OverlayMessage::DocumentLoaded {
            document: document(),
            image_size: Size::new(400.0, 300.0),
        });
        overlay
    }

    #[test]
    fn config_picks_granularity_and_zoom_limits() {
        let mut config = AppConfig::default();
        config.default_granularity = Granularity::Annotation;
        config.max_scale = 2.0;
        let mut overlay = OverlayState::from_config(&config);
        overlay.reduce(OverlayMessage::ContainerResized(Size::new(400.0, 300.0)));
        overlay.reduce(OverlayMessage::DocumentLoaded {
            document: document(),
            image_size: Size::new(400.0, 300.0),
        });
        assert_eq!(overlay.granularity(), Granularity::Annotation);
        assert_eq!(overlay.boxes().len(), 2);
        overlay.reduce(OverlayMessage::Transformed {
            pan: Offset::ZERO,
            zoom: 5.0,
        });
        assert_eq!(overlay.viewport().scale, 2.0);
    }

    #[test]
    fn loading_builds_paragraph_boxes() {
        let overlay = loaded_overlay();
        assert_eq!(overlay.boxes().len(), 3);
        assert_eq!(overlay.boxes()[1].text, "wie geht");
        assert_eq!(overlay.boxes()[0].average_glyph_height, Some(40.0));
    }

    #[test]
    fn tap_toggles_box_under_pointer() {
        let mut overlay = loaded_overlay();
        let effects = overlay.reduce(OverlayMessage::Tapped(Point::new(200.0, 140.0)));
        assert_eq!(
            effects,
            vec![OverlayEffect::SelectionChanged { selected: vec![1] }]
        );
        assert!(overlay.reduce(OverlayMessage::Tapped(Point::new(200.0, 90.0))).is_empty());
    }

    #[test]
    fn drag_selects_crossed_boxes_once_and_keeps_selection() {
        let mut overlay = loaded_overlay();
        overlay.reduce(OverlayMessage::DragStarted(Point::new(100.0, 10.0)));
        for y in (10..300).step_by(5) {
            overlay.reduce(OverlayMessage::DragMoved(Point::new(100.0, y as f32)));
        }
        overlay.reduce(OverlayMessage::DragEnded);
        assert_eq!(overlay.selection().indices(), vec![0, 1, 2]);
        assert!(overlay.drag_path().is_empty());
        assert_eq!(overlay.selected_text(), "guten tag\nwie geht\nes dir");
    }

    #[test]
    fn drag_move_without_start_is_ignored() {
        let mut overlay = loaded_overlay();
        overlay.reduce(OverlayMessage::DragMoved(Point::new(100.0, 40.0)));
        assert!(overlay.selection().is_empty());
    }

    #[test]
    fn toggling_granularity_clears_selection_and_rebuilds() {
        let mut overlay = loaded_overlay();
        overlay.reduce(OverlayMessage::SelectAllToggled);
        assert_eq!(overlay.selection().len(), 3);
        let effects = overlay.reduce(OverlayMessage::GranularityToggled);
        assert_eq!(overlay.granularity(), Granularity::Annotation);
        assert_eq!(overlay.boxes().len(), 2);
        assert!(overlay.selection().is_empty());
        assert!(effects.contains(&OverlayEffect::BoxesRebuilt { count: 2 }));

        overlay.reduce(OverlayMessage::SelectAllToggled);
        assert_eq!(overlay.selected_text(), "guten tag");

        overlay.reduce(OverlayMessage::GranularityToggled);
        assert_eq!(overlay.boxes().len(), 3);
        assert_eq!(overlay.boxes()[2].text, "es dir");
    }

    #[test]
    fn hit_rects_are_memoized_across_frames() {
        let mut overlay = loaded_overlay();
        overlay.hit_rects();
        overlay.reduce(OverlayMessage::Transformed {
            pan: Offset::new(3.0, 3.0),
            zoom: 1.5,
        });
        overlay.hit_rects();
        assert_eq!(overlay.hit_cache.computations(), 1);
        overlay.reduce(OverlayMessage::ContainerResized(Size::new(800.0, 600.0)));
        let rects = overlay.hit_rects().to_vec();
        assert_eq!(overlay.hit_cache.computations(), 2);
        assert_eq!(rects[0].rect.left, 36.0);
    }

    #[test]
    fn tap_accounts_for_zoom() {
        let mut overlay = loaded_overlay();
        overlay.reduce(OverlayMessage::Transformed {
            pan: Offset::ZERO,
            zoom: 2.0,
        });
        // content y=40 (box 0) is drawn at screen y = 150 + (40 - 150) * 2 = -70,
        // so screen y=30 lands on content y=90, the gap between boxes 0 and 1.
        assert!(overlay.reduce(OverlayMessage::Tapped(Point::new(200.0, 30.0))).is_empty());
        // screen y=150 stays at the center: content y=150 is box 1.
        overlay.reduce(OverlayMessage::Tapped(Point::new(200.0, 150.0)));
        assert_eq!(overlay.selection().indices(), vec![1]);
    }

    #[test]
    fn reset_drops_document_and_viewport() {
        let mut overlay = loaded_overlay();
        overlay.reduce(OverlayMessage::Transformed {
            pan: Offset::new(10.0, 0.0),
            zoom: 2.0,
        });
        overlay.reduce(OverlayMessage::SelectAllToggled);
        overlay.reduce(OverlayMessage::Reset);
        assert!(overlay.boxes().is_empty());
        assert!(overlay.selection().is_empty());
        assert_eq!(overlay.viewport().scale, 1.0);
        assert_eq!(overlay.viewport().translation, Offset::ZERO);
    }
}
