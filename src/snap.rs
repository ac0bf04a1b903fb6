use kurbo::Point;

use crate::model::SurfaceGeometry;

/// Activation distance for a guide line, in surface pixels.
pub const SNAP_THRESHOLD_PX: f64 = 10.0;

/// Candidate guide lines for one axis: edges, quarters, thirds, center.
#[derive(Clone, Debug, PartialEq)]
pub struct GuideLines {
    pub vertical: [f64; 7],
    pub horizontal: [f64; 7],
}

fn axis_lines(extent: f64) -> [f64; 7] {
    [
        0.0,
        extent / 4.0,
        extent / 3.0,
        extent / 2.0,
        extent * 2.0 / 3.0,
        extent * 3.0 / 4.0,
        extent,
    ]
}

impl GuideLines {
    pub fn for_surface(surface: SurfaceGeometry) -> Self {
        Self {
            vertical: axis_lines(surface.width),
            horizontal: axis_lines(surface.height),
        }
    }
}

/// Guides currently engaged, for overlay rendering. `None` per axis when the
/// anchor is outside every line's threshold.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SnapState {
    pub vertical: Option<f64>,
    pub horizontal: Option<f64>,
}

impl SnapState {
    pub fn is_engaged(self) -> bool {
        self.vertical.is_some() || self.horizontal.is_some()
    }
}

/// The first line within threshold wins, in the fixed candidate order, even
/// when a later line is closer. Changing this to nearest-wins would alter how
/// positions resolve between adjacent thirds and quarters.
fn snap_axis(value: f64, lines: &[f64; 7]) -> Option<f64> {
    lines
        .iter()
        .copied()
        .find(|line| (value - line).abs() < SNAP_THRESHOLD_PX)
}

/// Snap an anchor to the surface's guide lines, per axis independently.
/// Returns the (possibly adjusted) anchor and which guides engaged.
pub fn snap_anchor(anchor: Point, guides: &GuideLines) -> (Point, SnapState) {
    let v = snap_axis(anchor.x, &guides.vertical);
    let h = snap_axis(anchor.y, &guides.horizontal);
    let snapped = Point::new(v.unwrap_or(anchor.x), h.unwrap_or(anchor.y));
    (
        snapped,
        SnapState {
            vertical: v,
            horizontal: h,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface() -> SurfaceGeometry {
        SurfaceGeometry::new(800.0, 600.0)
    }

    #[test]
    fn lines_cover_edges_fractions_and_center() {
        let g = GuideLines::for_surface(surface());
        assert_eq!(g.vertical, [0.0, 200.0, 800.0 / 3.0, 400.0, 1600.0 / 3.0, 600.0, 800.0]);
        assert_eq!(g.horizontal, [0.0, 150.0, 200.0, 300.0, 400.0, 450.0, 600.0]);
    }

    #[test]
    fn anchor_within_threshold_snaps() {
        let g = GuideLines::for_surface(surface());
        let (p, s) = snap_anchor(Point::new(395.0, 304.0), &g);
        assert_eq!(p, Point::new(400.0, 300.0));
        assert_eq!(s.vertical, Some(400.0));
        assert_eq!(s.horizontal, Some(300.0));
    }

    #[test]
    fn anchor_at_exact_threshold_does_not_snap() {
        let g = GuideLines::for_surface(surface());
        let (p, s) = snap_anchor(Point::new(410.0, 310.0), &g);
        assert_eq!(p, Point::new(410.0, 310.0));
        assert!(!s.is_engaged());
    }

    #[test]
    fn axes_snap_independently() {
        let g = GuideLines::for_surface(surface());
        let (p, s) = snap_anchor(Point::new(397.0, 275.0), &g);
        assert_eq!(p, Point::new(400.0, 275.0));
        assert_eq!(s.vertical, Some(400.0));
        assert_eq!(s.horizontal, None);
    }

    #[test]
    fn first_line_in_order_wins_over_closer_later_line() {
        // On a small surface adjacent candidates overlap: with width 36 the
        // lines are [0, 9, 12, 18, 24, 27, 36]. x = 8 is 8px from the edge and
        // 1px from the quarter line, but the edge comes first in the order.
        let g = GuideLines::for_surface(SurfaceGeometry::new(36.0, 36.0));
        let (p, s) = snap_anchor(Point::new(8.0, 50.0), &g);
        assert_eq!(p.x, 0.0);
        assert_eq!(s.vertical, Some(0.0));
    }

    #[test]
    fn edges_are_snappable() {
        let g = GuideLines::for_surface(surface());
        let (p, s) = snap_anchor(Point::new(794.0, 3.0), &g);
        assert_eq!(p, Point::new(800.0, 0.0));
        assert!(s.is_engaged());
    }
}
