use kurbo::{Point, Vec2};

use crate::{
    model::SurfaceGeometry,
    snap::{GuideLines, SnapState, snap_anchor},
};

/// One processed pointer-move: where the anchor ends up and which guides lit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragUpdate {
    pub anchor: Point,
    pub snap: SnapState,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum DragPhase {
    Idle,
    /// Offset from the pointer to the watermark anchor, captured at press so
    /// the watermark does not jump under the cursor.
    Dragging { grab_offset: Vec2 },
}

/// Pointer-driven placement of the watermark anchor. Events are fed by the
/// host; the controller is synchronous and owns no timers.
///
/// While a drag is live the anchor is snapped to guide lines and clamped to
/// the surface on every move. On a degenerate surface both are skipped: there
/// is no meaningful range to clamp into and no lines worth engaging.
#[derive(Clone, Debug)]
pub struct DragController {
    phase: DragPhase,
    snap: SnapState,
    last_anchor: Option<Point>,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new()
    }
}

impl DragController {
    pub fn new() -> Self {
        Self {
            phase: DragPhase::Idle,
            snap: SnapState::default(),
            last_anchor: None,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, DragPhase::Dragging { .. })
    }

    /// Guides to draw in the overlay right now.
    pub fn active_snap(&self) -> SnapState {
        self.snap
    }

    /// Begin a drag. `hit` is the host's hit-test verdict for the watermark
    /// layer; a press elsewhere leaves the controller idle.
    pub fn pointer_down(&mut self, pointer: Point, anchor: Point, hit: bool) {
        if !hit {
            return;
        }
        self.phase = DragPhase::Dragging {
            grab_offset: anchor - pointer,
        };
        self.snap = SnapState::default();
        self.last_anchor = Some(anchor);
    }

    /// Process a pointer move. Returns the new anchor when a drag is live,
    /// `None` otherwise (moves while idle are ignored).
    pub fn pointer_move(
        &mut self,
        pointer: Point,
        surface: SurfaceGeometry,
    ) -> Option<DragUpdate> {
        let DragPhase::Dragging { grab_offset } = self.phase else {
            return None;
        };
        let raw = pointer + grab_offset;
        if surface.is_degenerate() {
            self.snap = SnapState::default();
            self.last_anchor = Some(raw);
            return Some(DragUpdate {
                anchor: raw,
                snap: self.snap,
            });
        }
        // Snap against the raw position, then clamp. A pointer far outside
        // the surface lights no guides even though the clamped anchor lands
        // on an edge line.
        let guides = GuideLines::for_surface(surface);
        let (snapped, snap) = snap_anchor(raw, &guides);
        let anchor = Point::new(
            snapped.x.clamp(0.0, surface.width),
            snapped.y.clamp(0.0, surface.height),
        );
        self.snap = snap;
        self.last_anchor = Some(anchor);
        Some(DragUpdate { anchor, snap })
    }

    /// End the drag. Emits one final update with the last committed anchor
    /// and cleared guides; a release while idle emits nothing.
    pub fn pointer_up(&mut self) -> Option<DragUpdate> {
        let was_dragging = self.is_dragging();
        self.phase = DragPhase::Idle;
        self.snap = SnapState::default();
        if !was_dragging {
            return None;
        }
        self.last_anchor.map(|anchor| DragUpdate {
            anchor,
            snap: SnapState::default(),
        })
    }
}
