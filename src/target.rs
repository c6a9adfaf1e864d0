use crate::locator::{MatchHit, Region};

/// A single actionable screen coordinate. Consumed immediately by an input
/// primitive and then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn offset(self, dx: i32, dy: i32) -> Point {
        Point {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Center of a match's bounding box.
pub fn center(hit: &MatchHit) -> Point {
    Point {
        x: hit.bbox.left + hit.bbox.width as i32 / 2,
        y: hit.bbox.top + hit.bbox.height as i32 / 2,
    }
}

/// Center of an optional match. Undefined exactly when the match is absent;
/// callers treat `None` as "no action", never as coordinate (0, 0).
pub fn center_of(hit: Option<&MatchHit>) -> Option<Point> {
    hit.map(center)
}

/// Neutral resting position near the bottom-left of the client area, away
/// from actionable elements so the parked cursor cannot raise hover tooltips
/// that would occlude the next capture.
pub fn rest_point(region: &Region) -> Point {
    Point {
        x: region.left + 16,
        y: region.top + region.height as i32 - 16,
    }
}
