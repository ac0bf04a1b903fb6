//! The narrow seams toward the hosting application: authorization,
//! maintenance gating and preset persistence all live on the host side; the
//! engine only consumes them.

use std::collections::HashMap;

use kurbo::Point;
use std::sync::Arc;

use crate::{
    drag::{DragController, DragUpdate},
    error::{AquamarkError, AquamarkResult},
    geometry::{PresetPosition, preset_anchor},
    model::{SurfaceGeometry, WatermarkKind, WatermarkSpec},
    raster::Pixmap,
    snap::SnapState,
};

/// Whether a user may use the editor at all.
pub trait AccessControl {
    fn is_authorized(&self, user_id: &str) -> bool;
}

/// Global kill switch; when active the editor is not mounted.
pub trait MaintenanceGate {
    fn is_active(&self) -> bool;
}

/// The mount decision: authorized and not under maintenance.
pub fn can_mount_editor(
    access: &dyn AccessControl,
    gate: &dyn MaintenanceGate,
    user_id: &str,
) -> bool {
    !gate.is_active() && access.is_authorized(user_id)
}

/// A saved watermark configuration. `content` is the text for text
/// watermarks and an opaque host reference (URL, object key) for image ones;
/// the host resolves it to pixels before `resolve`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WatermarkPreset {
    pub name: String,
    pub kind: WatermarkKind,
    pub content: String,
    pub anchor: Point,
    pub opacity_percent: f64,
    pub scale_percent: f64,
    pub rotation_degrees: f64,
}

impl WatermarkPreset {
    /// Capture a spec as a preset. Text presets carry their content inline.
    /// Image pixels never leave the host, so `image_ref` supplies the host's
    /// reference for image specs; it is ignored for text.
    pub fn from_spec(
        name: impl Into<String>,
        spec: &WatermarkSpec,
        image_ref: Option<String>,
    ) -> Self {
        let content = match spec.kind {
            WatermarkKind::Text => spec.text.clone().unwrap_or_default(),
            WatermarkKind::Image => image_ref.unwrap_or_default(),
        };
        Self {
            name: name.into(),
            kind: spec.kind,
            content,
            anchor: spec.anchor,
            opacity_percent: spec.opacity_percent,
            scale_percent: spec.scale_percent,
            rotation_degrees: spec.rotation_degrees,
        }
    }

    /// Turn the preset back into a working spec. Image presets need the
    /// host-resolved pixels.
    pub fn resolve(&self, image: Option<Arc<Pixmap>>) -> AquamarkResult<WatermarkSpec> {
        let mut spec = match self.kind {
            WatermarkKind::Text => WatermarkSpec::text(self.content.clone()),
            WatermarkKind::Image => {
                let pixmap = image.ok_or_else(|| {
                    AquamarkError::validation(format!(
                        "preset `{}` needs its image resolved by the host",
                        self.name
                    ))
                })?;
                WatermarkSpec::image(pixmap)
            }
        };
        spec.anchor = self.anchor;
        spec.opacity_percent = self.opacity_percent;
        spec.scale_percent = self.scale_percent;
        spec.rotation_degrees = self.rotation_degrees;
        spec.validate()?;
        Ok(spec)
    }
}

/// Per-user preset persistence. Saving under an existing name replaces it.
pub trait PresetStore {
    fn list(&self, user_id: &str) -> AquamarkResult<Vec<WatermarkPreset>>;
    fn get(&self, user_id: &str, name: &str) -> AquamarkResult<Option<WatermarkPreset>>;
    fn save(&mut self, user_id: &str, preset: WatermarkPreset) -> AquamarkResult<()>;
    fn delete(&mut self, user_id: &str, name: &str) -> AquamarkResult<bool>;
}

/// Default store for tests and single-process hosts.
#[derive(Default, Debug)]
pub struct InMemoryPresetStore {
    by_user: HashMap<String, Vec<WatermarkPreset>>,
}

impl InMemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PresetStore for InMemoryPresetStore {
    fn list(&self, user_id: &str) -> AquamarkResult<Vec<WatermarkPreset>> {
        Ok(self.by_user.get(user_id).cloned().unwrap_or_default())
    }

    fn get(&self, user_id: &str, name: &str) -> AquamarkResult<Option<WatermarkPreset>> {
        Ok(self
            .by_user
            .get(user_id)
            .and_then(|ps| ps.iter().find(|p| p.name == name))
            .cloned())
    }

    fn save(&mut self, user_id: &str, preset: WatermarkPreset) -> AquamarkResult<()> {
        let presets = self.by_user.entry(user_id.to_owned()).or_default();
        if let Some(existing) = presets.iter_mut().find(|p| p.name == preset.name) {
            *existing = preset;
        } else {
            presets.push(preset);
        }
        Ok(())
    }

    fn delete(&mut self, user_id: &str, name: &str) -> AquamarkResult<bool> {
        let Some(presets) = self.by_user.get_mut(user_id) else {
            return Ok(false);
        };
        let before = presets.len();
        presets.retain(|p| p.name != name);
        Ok(presets.len() != before)
    }
}

/// The working state of one editor session: the spec being edited, the
/// current surface geometry and the live drag. One place to mutate, so the
/// preview, exports and persistence all read the same values.
#[derive(Debug)]
pub struct EditorState {
    pub spec: WatermarkSpec,
    pub surface: SurfaceGeometry,
    drag: DragController,
}

impl EditorState {
    pub fn new(spec: WatermarkSpec, surface: SurfaceGeometry) -> Self {
        Self {
            spec,
            surface,
            drag: DragController::new(),
        }
    }

    pub fn active_snap(&self) -> SnapState {
        self.drag.active_snap()
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_dragging()
    }

    pub fn pointer_down(&mut self, pointer: Point, hit: bool) {
        self.drag.pointer_down(pointer, self.spec.anchor, hit);
    }

    pub fn pointer_move(&mut self, pointer: Point) -> Option<DragUpdate> {
        let update = self.drag.pointer_move(pointer, self.surface)?;
        self.spec.anchor = update.anchor;
        Some(update)
    }

    pub fn pointer_up(&mut self) -> Option<DragUpdate> {
        let update = self.drag.pointer_up()?;
        self.spec.anchor = update.anchor;
        Some(update)
    }

    pub fn apply_preset_position(&mut self, position: PresetPosition) {
        self.spec.anchor = preset_anchor(position, self.surface);
    }

    /// Surface resized or re-measured. The anchor keeps its surface-space
    /// value, clamped into the new bounds when they exist.
    pub fn set_surface(&mut self, surface: SurfaceGeometry) {
        self.surface = surface;
        if !surface.is_degenerate() {
            self.spec.anchor = Point::new(
                self.spec.anchor.x.clamp(0.0, surface.width),
                self.spec.anchor.y.clamp(0.0, surface.height),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preset() -> WatermarkPreset {
        WatermarkPreset {
            name: "brand".into(),
            kind: WatermarkKind::Text,
            content: "ACME".into(),
            anchor: Point::new(70.0, 50.0),
            opacity_percent: 60.0,
            scale_percent: 40.0,
            rotation_degrees: 15.0,
        }
    }

    struct Allow(bool);
    impl AccessControl for Allow {
        fn is_authorized(&self, _user_id: &str) -> bool {
            self.0
        }
    }
    struct Gate(bool);
    impl MaintenanceGate for Gate {
        fn is_active(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn editor_mounts_only_when_authorized_and_open() {
        assert!(can_mount_editor(&Allow(true), &Gate(false), "u1"));
        assert!(!can_mount_editor(&Allow(false), &Gate(false), "u1"));
        assert!(!can_mount_editor(&Allow(true), &Gate(true), "u1"));
    }

    #[test]
    fn save_then_get_round_trips() {
        let mut store = InMemoryPresetStore::new();
        store.save("u1", preset()).unwrap();
        let got = store.get("u1", "brand").unwrap().unwrap();
        assert_eq!(got, preset());
        assert!(store.get("u2", "brand").unwrap().is_none());
    }

    #[test]
    fn save_replaces_same_name() {
        let mut store = InMemoryPresetStore::new();
        store.save("u1", preset()).unwrap();
        let mut changed = preset();
        changed.opacity_percent = 90.0;
        store.save("u1", changed).unwrap();
        let list = store.list("u1").unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].opacity_percent, 90.0);
    }

    #[test]
    fn delete_reports_whether_anything_went() {
        let mut store = InMemoryPresetStore::new();
        store.save("u1", preset()).unwrap();
        assert!(store.delete("u1", "brand").unwrap());
        assert!(!store.delete("u1", "brand").unwrap());
    }

    #[test]
    fn preset_resolves_to_working_spec() {
        let spec = preset().resolve(None).unwrap();
        assert_eq!(spec.text.as_deref(), Some("ACME"));
        assert_eq!(spec.anchor, Point::new(70.0, 50.0));
        assert_eq!(spec.opacity_percent, 60.0);
        assert_eq!(spec.rotation_degrees, 15.0);
    }

    #[test]
    fn text_spec_captures_its_content() {
        let mut spec = WatermarkSpec::text("ACME");
        spec.anchor = Point::new(70.0, 50.0);
        let p = WatermarkPreset::from_spec("brand", &spec, None);
        assert_eq!(p.content, "ACME");
        assert_eq!(p.kind, WatermarkKind::Text);
    }

    #[test]
    fn image_preset_keeps_host_reference() {
        let pixmap = Arc::new(Pixmap::new(8, 8));
        let spec = WatermarkSpec::image(pixmap.clone());
        let p = WatermarkPreset::from_spec("logo", &spec, Some("uploads/acme.png".into()));
        assert_eq!(p.content, "uploads/acme.png");

        // The reference survives persistence and the host can resolve it
        // back to a working spec.
        let mut store = InMemoryPresetStore::new();
        store.save("u1", p).unwrap();
        let got = store.get("u1", "logo").unwrap().unwrap();
        assert_eq!(got.content, "uploads/acme.png");
        let resolved = got.resolve(Some(pixmap)).unwrap();
        assert_eq!(resolved.kind, WatermarkKind::Image);
    }

    #[test]
    fn image_preset_without_pixels_fails_to_resolve() {
        let mut p = preset();
        p.kind = WatermarkKind::Image;
        assert!(p.resolve(None).is_err());
    }

    #[test]
    fn preset_serde_round_trip() {
        let json = serde_json::to_string(&preset()).unwrap();
        let back: WatermarkPreset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, preset());
    }

    #[test]
    fn editor_drag_updates_spec_anchor() {
        let mut spec = WatermarkSpec::text("hi");
        spec.anchor = Point::new(100.0, 100.0);
        let mut state = EditorState::new(spec, SurfaceGeometry::new(800.0, 600.0));
        state.pointer_down(Point::new(100.0, 100.0), true);
        let _ = state.pointer_move(Point::new(396.0, 296.0));
        assert_eq!(state.spec.anchor, Point::new(400.0, 300.0));
        assert!(state.active_snap().is_engaged());
        let _ = state.pointer_up();
        assert!(!state.active_snap().is_engaged());
        assert_eq!(state.spec.anchor, Point::new(400.0, 300.0));
    }

    #[test]
    fn preset_position_moves_anchor() {
        let mut state = EditorState::new(
            WatermarkSpec::text("hi"),
            SurfaceGeometry::new(800.0, 600.0),
        );
        state.apply_preset_position(PresetPosition::Center);
        assert_eq!(state.spec.anchor, Point::new(400.0, 300.0));
        state.apply_preset_position(PresetPosition::BottomRight);
        assert_eq!(state.spec.anchor, Point::new(730.0, 550.0));
    }

    #[test]
    fn resize_clamps_anchor_into_new_bounds() {
        let mut spec = WatermarkSpec::text("hi");
        spec.anchor = Point::new(700.0, 500.0);
        let mut state = EditorState::new(spec, SurfaceGeometry::new(800.0, 600.0));
        state.set_surface(SurfaceGeometry::new(400.0, 300.0));
        assert_eq!(state.spec.anchor, Point::new(400.0, 300.0));
    }
}
