//! Plain geometry values shared by the OCR and overlay layers.
//!
//! Source-image coordinates are pixels of the decoded bitmap; container
//! coordinates are pixels of the on-screen area the image is laid out in.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// A 2D displacement (pan delta or translation).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Offset {
    pub x: f32,
    pub y: f32,
}

impl Offset {
    pub const ZERO: Offset = Offset { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    pub fn center(&self) -> Point {
        Point::new(self.width / 2.0, self.height / 2.0)
    }
}

/// Axis-aligned rectangle with inclusive edges.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.left && point.x <= self.right && point.y >= self.top && point.y <= self.bottom
    }

    /// Grow the rectangle by `margin` on every side.
    pub fn inflate(&self, margin: f32) -> Rect {
        Rect {
            left: self.left - margin,
            top: self.top - margin,
            right: self.right + margin,
            bottom: self.bottom + margin,
        }
    }
}

/// Ordered polygon vertices in source-image pixels, usually a quadrilateral.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingPolygon {
    pub vertices: Vec<Point>,
}

impl BoundingPolygon {
    pub fn new(vertices: Vec<Point>) -> Self {
        Self { vertices }
    }

    /// `max(y) - min(y)` over the vertices; zero for an empty polygon.
    pub fn height(&self) -> f32 {
        self.bounding_rect().map(|rect| rect.height()).unwrap_or(0.0)
    }

    pub fn bounding_rect(&self) -> Option<Rect> {
        let first = self.vertices.first()?;
        let init = Rect::new(first.x, first.y, first.x, first.y);
        Some(self.vertices.iter().skip(1).fold(init, |acc, p| Rect {
            left: acc.left.min(p.x),
            top: acc.top.min(p.y),
            right: acc.right.max(p.x),
            bottom: acc.bottom.max(p.y),
        }))
    }

    /// Scale every vertex independently along each axis.
    pub fn scaled(&self, sx: f32, sy: f32) -> BoundingPolygon {
        BoundingPolygon {
            vertices: self
                .vertices
                .iter()
                .map(|p| Point::new(p.x * sx, p.y * sy))
                .collect(),
        }
    }
}
