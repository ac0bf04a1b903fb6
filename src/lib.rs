//! aquamark: a watermark compositing engine.
//!
//! Models an interactive editor surface — a text or image watermark dragged
//! over an image or video, with snap guides and placement presets — and bakes
//! the overlay into exports at the media's native resolution: PNG for images,
//! an encoded video file for videos. Everything draws through one shared
//! stamping policy, so the live preview and both exporters always agree on
//! placement, rotation, scale and opacity.
//!
//! The hosting application stays behind narrow traits (`host`, the
//! `MediaElement` playback seam, `RecorderFactory`); video IO runs through
//! ffmpeg subprocesses.

pub mod blur;
pub mod composite;
pub mod drag;
pub mod error;
pub mod export_image;
pub mod export_video;
pub mod geometry;
pub mod host;
pub mod media;
pub mod model;
pub mod raster;
pub mod record;
pub mod snap;
pub mod surface;
pub mod text;
pub mod watermark;

pub use error::{AquamarkError, AquamarkResult};
pub use model::{
    MediaAsset, MediaKind, NamedBinary, NativeSize, SurfaceGeometry, WatermarkKind, WatermarkSpec,
};

pub use drag::{DragController, DragUpdate};
pub use export_image::export_image;
pub use export_video::{ExportEvent, ExportProgress, VideoExportJob, export_video};
pub use geometry::{PresetPosition, preset_anchor, surface_to_native_scale};
pub use host::{
    AccessControl, EditorState, InMemoryPresetStore, MaintenanceGate, PresetStore,
    WatermarkPreset, can_mount_editor,
};
pub use raster::Pixmap;
pub use record::{CodecChoice, CodecProbe, FrameRecorder, RecorderFactory, negotiate_codec};
pub use snap::{GuideLines, SnapState, snap_anchor};
pub use surface::{MediaElement, MediaSurface, PlaybackState};
pub use text::WatermarkFont;
pub use watermark::{PreparedWatermark, prepare_watermark, stamp_watermark};
