use super::hit_test::HitRect;
use crate::geometry::Point;
use std::collections::{BTreeSet, HashSet};

/// Indices of the currently highlighted boxes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    selected: BTreeSet<usize>,
}

impl SelectionSet {
    /// Flip membership of `index`; returns whether it is now selected.
    pub fn toggle(&mut self, index: usize) -> bool {
        if self.selected.remove(&index) {
            false
        } else {
            self.selected.insert(index);
            true
        }
    }

    /// Select everything when nothing is selected, otherwise clear.
    pub fn toggle_all(&mut self, count: usize) {
        if self.selected.is_empty() {
            self.selected = (0..count).collect();
        } else {
            self.selected.clear();
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Selected indices in ascending (box) order.
    pub fn indices(&self) -> Vec<usize> {
        self.selected.iter().copied().collect()
    }
}

/// Per-gesture bookkeeping for drag multi-select.
#[derive(Debug, Clone, Default)]
pub struct DragSelect {
    path: Vec<Point>,
    touched: HashSet<usize>,
}

impl DragSelect {
    pub fn begin(&mut self, start: Point) {
        self.path.clear();
        self.touched.clear();
        self.path.push(start);
    }

    /// Feed one pointer sample; toggles the first untouched box under it.
    pub fn update(
        &mut self,
        point: Point,
        rects: &[HitRect],
        selection: &mut SelectionSet,
    ) -> Option<usize> {
        self.path.push(point);
        let hit = rects
            .iter()
            .find(|hit| !self.touched.contains(&hit.index) && hit.rect.contains(point))?;
        selection.toggle(hit.index);
        self.touched.insert(hit.index);
        Some(hit.index)
    }

    /// Finish the gesture; the selection itself is left alone.
    pub fn end(&mut self) {
        self.path.clear();
        self.touched.clear();
    }

    pub fn path(&self) -> &[Point] {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        !self.path.is_empty()
    }
}
