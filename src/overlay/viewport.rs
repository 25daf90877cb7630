use crate::geometry::{Offset, Point, Size};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomLimits {
    pub min: f32,
    pub max: f32,
}

impl Default for ZoomLimits {
    fn default() -> Self {
        Self { min: 0.5, max: 3.0 }
    }
}

impl ZoomLimits {
    /// Positive, finite and ordered limits. Unusable values fall back to the
    /// defaults and swapped bounds are put back in order.
    pub fn normalized(self) -> Self {
        let defaults = ZoomLimits::default();
        let usable = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let min = usable(self.min, defaults.min);
        let max = usable(self.max, defaults.max);
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }
}

/// Zoom and pan applied to the displayed image.
///
/// The image is scaled about the container center and then translated. The
/// translation is kept within `±(scale - 1) * container / 2` on each axis, so
/// the image edge can never be dragged past the container edge, and at
/// `scale <= 1` no translation is possible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scale: f32,
    pub translation: Offset,
    pub container: Size,
    limits: ZoomLimits,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self::new(Size::default(), ZoomLimits::default())
    }
}

impl ViewportState {
    pub fn new(container: Size, limits: ZoomLimits) -> Self {
        Self {
            scale: 1.0,
            translation: Offset::ZERO,
            container,
            limits: limits.normalized(),
        }
    }

    /// Largest allowed translation magnitude on each axis.
    pub fn pan_bounds(&self) -> Offset {
        Offset::new(
            ((self.scale - 1.0) * self.container.width / 2.0).max(0.0),
            ((self.scale - 1.0) * self.container.height / 2.0).max(0.0),
        )
    }

    pub fn apply_pinch(&mut self, zoom: f32) {
        if !zoom.is_finite() || zoom <= 0.0 {
            return;
        }
        self.scale = (self.scale * zoom).clamp(self.limits.min, self.limits.max);
        self.clamp_translation();
        trace!(scale = self.scale, "Applied pinch");
    }

    /// Move by a delta that is already multiplied by the current scale.
    pub fn apply_pan(&mut self, scaled_delta: Offset) {
        let bounds = self.pan_bounds();
        self.translation = Offset::new(
            (self.translation.x + scaled_delta.x).clamp(-bounds.x, bounds.x),
            (self.translation.y + scaled_delta.y).clamp(-bounds.y, bounds.y),
        );
    }

    /// One transform-gesture sample: zoom first, then pan scaled by the new zoom.
    pub fn apply_gesture(&mut self, pan: Offset, zoom: f32) {
        self.apply_pinch(zoom);
        self.apply_pan(pan.scaled(self.scale));
    }

    pub fn set_container(&mut self, container: Size) {
        self.container = container;
        self.clamp_translation();
    }

    pub fn reset(&mut self) {
        self.scale = 1.0;
        self.translation = Offset::ZERO;
    }

    /// Map an on-screen pointer position into unzoomed container space.
    pub fn to_content(&self, screen: Point) -> Point {
        let center = self.container.center();
        Point::new(
            center.x + (screen.x - self.translation.x - center.x) / self.scale,
            center.y + (screen.y - self.translation.y - center.y) / self.scale,
        )
    }

    pub fn to_screen(&self, content: Point) -> Point {
        let center = self.container.center();
        Point::new(
            center.x + (content.x - center.x) * self.scale + self.translation.x,
            center.y + (content.y - center.y) * self.scale + self.translation.y,
        )
    }

    fn clamp_translation(&mut self) {
        self.apply_pan(Offset::ZERO);
    }
}
