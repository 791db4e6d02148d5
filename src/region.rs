// src/region.rs
// Region-of-interest selection over a displayed image.
//
// Coordinates are percentages (0-100) of the image, origin top-left. The
// selector turns a pointer drag into a normalized rectangle whatever the drag
// direction.

use serde::{Deserialize, Serialize};

/// Below this many percent in either dimension a rectangle selects nothing.
pub const MIN_EFFECTIVE_EXTENT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    /// Rectangle spanned by two arbitrary corner points.
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            x: a.x.min(b.x),
            y: a.y.min(b.y),
            width: (a.x - b.x).abs(),
            height: (a.y - b.y).abs(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width < MIN_EFFECTIVE_EXTENT || self.height < MIN_EFFECTIVE_EXTENT
    }

    /// `None` for an absent or degenerate rectangle.
    pub fn effective(region: Option<Region>) -> Option<Region> {
        region.filter(|r| !r.is_empty())
    }

    /// Human-readable placement, used in prompts.
    pub fn describe(&self) -> String {
        format!(
            "the rectangle starting {:.0}% from the left and {:.0}% from the top, \
             {:.0}% wide and {:.0}% tall",
            self.x, self.y, self.width, self.height
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Bounding box of the image as displayed, in client pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    /// Client position as image percentages, clamped to the image.
    pub fn to_percent(&self, client_x: f64, client_y: f64) -> Point {
        let percent = |offset: f64, extent: f64| {
            if extent <= 0.0 {
                0.0
            } else {
                (offset / extent * 100.0).clamp(0.0, 100.0)
            }
        };
        Point::new(
            percent(client_x - self.left, self.width),
            percent(client_y - self.top, self.height),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegionSelector {
    selecting: bool,
    drag_start: Option<Point>,
    region: Option<Region>,
}

impl RegionSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_start.is_some()
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    pub fn set_selecting(&mut self, selecting: bool) {
        self.selecting = selecting;
        if !selecting {
            self.drag_start = None;
            self.region = None;
        }
    }

    pub fn toggle_selecting(&mut self) {
        self.set_selecting(!self.selecting);
    }

    pub fn pointer_down(&mut self, viewport: &Viewport, client_x: f64, client_y: f64) {
        if !self.selecting {
            return;
        }
        let start = viewport.to_percent(client_x, client_y);
        self.drag_start = Some(start);
        self.region = Some(Region::from_corners(start, start));
    }

    pub fn pointer_move(&mut self, viewport: &Viewport, client_x: f64, client_y: f64) {
        let Some(start) = self.drag_start else {
            return;
        };
        let current = viewport.to_percent(client_x, client_y);
        self.region = Some(Region::from_corners(start, current));
    }

    /// Ends the drag; the rectangle stays.
    pub fn pointer_up(&mut self) {
        self.drag_start = None;
    }

    /// Forget everything, e.g. when a different asset is displayed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIEWPORT: Viewport = Viewport {
        left: 100.0,
        top: 50.0,
        width: 400.0,
        height: 200.0,
    };

    #[test]
    fn corners_normalize_in_every_order() {
        let expected = Region {
            x: 10.0,
            y: 20.0,
            width: 30.0,
            height: 40.0,
        };
        let (x1, y1, x2, y2) = (10.0, 20.0, 40.0, 60.0);
        let permutations = [
            (Point::new(x1, y1), Point::new(x2, y2)),
            (Point::new(x2, y2), Point::new(x1, y1)),
            (Point::new(x1, y2), Point::new(x2, y1)),
            (Point::new(x2, y1), Point::new(x1, y2)),
        ];
        for (a, b) in permutations {
            assert_eq!(Region::from_corners(a, b), expected);
        }
    }

    #[test]
    fn drag_produces_percent_rectangle() {
        let mut selector = RegionSelector::new();
        selector.set_selecting(true);
        selector.pointer_down(&VIEWPORT, 300.0, 150.0);
        selector.pointer_move(&VIEWPORT, 200.0, 100.0);

        assert_eq!(
            selector.region(),
            Some(Region {
                x: 25.0,
                y: 25.0,
                width: 25.0,
                height: 25.0,
            })
        );

        selector.pointer_up();
        assert!(!selector.is_dragging());
        assert!(selector.region().is_some());

        // Moves after release are ignored.
        selector.pointer_move(&VIEWPORT, 500.0, 250.0);
        assert_eq!(selector.region().map(|r| r.width), Some(25.0));
    }

    #[test]
    fn pointer_outside_image_is_clamped() {
        let mut selector = RegionSelector::new();
        selector.set_selecting(true);
        selector.pointer_down(&VIEWPORT, 400.0, 150.0);
        selector.pointer_move(&VIEWPORT, 900.0, 900.0);
        let region = selector.region().unwrap();
        assert!(region.x + region.width <= 100.0);
        assert!(region.y + region.height <= 100.0);
    }

    #[test]
    fn pointer_down_outside_selection_mode_does_nothing() {
        let mut selector = RegionSelector::new();
        selector.pointer_down(&VIEWPORT, 300.0, 150.0);
        assert!(!selector.is_dragging());
        assert_eq!(selector.region(), None);
    }

    #[test]
    fn leaving_selection_mode_clears_rectangle() {
        let mut selector = RegionSelector::new();
        selector.toggle_selecting();
        selector.pointer_down(&VIEWPORT, 300.0, 150.0);
        selector.pointer_move(&VIEWPORT, 350.0, 200.0);
        selector.toggle_selecting();
        assert!(!selector.is_selecting());
        assert_eq!(selector.region(), None);
    }

    #[test]
    fn click_without_drag_is_stored_but_not_effective() {
        let mut selector = RegionSelector::new();
        selector.set_selecting(true);
        selector.pointer_down(&VIEWPORT, 300.0, 150.0);
        selector.pointer_up();

        let stored = selector.region();
        assert_eq!(stored.map(|r| (r.width, r.height)), Some((0.0, 0.0)));
        assert_eq!(Region::effective(stored), None);
        assert_eq!(Region::effective(None), None);
    }

    #[test]
    fn thin_rectangle_is_not_effective() {
        let sliver = Region {
            x: 10.0,
            y: 10.0,
            width: 30.0,
            height: 0.2,
        };
        assert!(sliver.is_empty());

        let real = Region {
            height: 5.0,
            ..sliver
        };
        assert_eq!(Region::effective(Some(real)), Some(real));
    }

    #[test]
    fn reset_forgets_selection() {
        let mut selector = RegionSelector::new();
        selector.set_selecting(true);
        selector.pointer_down(&VIEWPORT, 300.0, 150.0);
        selector.reset();
        assert!(!selector.is_selecting());
        assert!(!selector.is_dragging());
        assert_eq!(selector.region(), None);
    }
}
