use tracing::warn;

use crate::{
    error::{AquamarkError, AquamarkResult},
    geometry::contain_fit,
    model::{NativeSize, SurfaceGeometry, WatermarkSpec},
    raster::Pixmap,
    watermark::{PreparedWatermark, stamp_watermark},
};

/// Why a play attempt did not start playback.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayError {
    /// The platform wants a user gesture first. Recoverable; never retried
    /// automatically.
    Blocked,
    /// Decode or pipeline failure.
    Failed(String),
}

/// The playback seam between the engine and whatever actually plays media.
pub trait MediaElement {
    fn play(&mut self) -> Result<(), PlayError>;
    fn pause(&mut self);
    fn seek(&mut self, time_sec: f64);
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn set_volume(&mut self, volume: f64);
    fn set_muted(&mut self, muted: bool);
    /// Tear down and re-open the current source. Used for the single retry
    /// after a generic playback failure.
    fn reload(&mut self);
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub volume: f64,
    pub muted: bool,
    pub fullscreen: bool,
}

/// Object-safe slice of the transport that an export pass needs: the ability
/// to take the media over (pause, rewind, mute) before frames are pulled.
pub trait Transport {
    fn begin_export(&mut self);
}

/// Transport state machine wrapped around a `MediaElement`. Keeps its own
/// `PlaybackState` mirror so hosts can render controls without poking the
/// element.
pub struct MediaSurface<E: MediaElement> {
    element: E,
    state: PlaybackState,
}

impl<E: MediaElement> MediaSurface<E> {
    pub fn new(element: E) -> Self {
        let state = PlaybackState {
            duration: element.duration(),
            volume: 1.0,
            ..PlaybackState::default()
        };
        Self { element, state }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn element_mut(&mut self) -> &mut E {
        &mut self.element
    }

    /// Play when paused, pause when playing. A blocked play surfaces
    /// immediately; a failed play is retried exactly once after reloading
    /// the source.
    pub fn toggle_play(&mut self) -> AquamarkResult<()> {
        if self.state.is_playing {
            self.element.pause();
            self.state.is_playing = false;
            return Ok(());
        }
        match self.element.play() {
            Ok(()) => {
                self.state.is_playing = true;
                Ok(())
            }
            Err(PlayError::Blocked) => Err(AquamarkError::PlaybackBlocked),
            Err(PlayError::Failed(first)) => {
                warn!(error = %first, "playback failed, reloading source and retrying");
                self.element.reload();
                match self.element.play() {
                    Ok(()) => {
                        self.state.is_playing = true;
                        Ok(())
                    }
                    Err(PlayError::Blocked) => Err(AquamarkError::PlaybackBlocked),
                    Err(PlayError::Failed(second)) => Err(AquamarkError::playback(second)),
                }
            }
        }
    }

    pub fn seek(&mut self, time_sec: f64) {
        let t = time_sec.clamp(0.0, self.state.duration.max(0.0));
        self.element.seek(t);
        self.state.current_time = t;
    }

    /// Volume zero mutes; raising the volume from zero while muted unmutes.
    pub fn set_volume(&mut self, volume: f64) {
        let v = volume.clamp(0.0, 1.0);
        self.element.set_volume(v);
        self.state.volume = v;
        if v == 0.0 {
            self.element.set_muted(true);
            self.state.muted = true;
        } else if self.state.muted {
            self.element.set_muted(false);
            self.state.muted = false;
        }
    }

    pub fn toggle_mute(&mut self) {
        let muted = !self.state.muted;
        self.element.set_muted(muted);
        self.state.muted = muted;
    }

    pub fn toggle_fullscreen(&mut self) {
        self.state.fullscreen = !self.state.fullscreen;
    }

    /// Hand the element over to an export pass: paused, rewound, muted.
    pub fn begin_export(&mut self) {
        self.element.pause();
        self.element.seek(0.0);
        self.element.set_muted(true);
        self.state.is_playing = false;
        self.state.current_time = 0.0;
        self.state.muted = true;
    }

    /// Refresh the mirrored clock from the element.
    pub fn sync(&mut self) {
        self.state.current_time = self.element.current_time();
        self.state.duration = self.element.duration();
    }
}

impl<E: MediaElement> Transport for MediaSurface<E> {
    fn begin_export(&mut self) {
        MediaSurface::begin_export(self);
    }
}

/// Compose the editor preview at surface resolution: base media contain-fit
/// inside the surface, watermark stamped at editor scale. The same stamp
/// policy as the exporters, so what the user drags is what they get.
pub fn render_preview(
    base: &Pixmap,
    prepared: &PreparedWatermark,
    spec: &WatermarkSpec,
    surface: SurfaceGeometry,
) -> AquamarkResult<Pixmap> {
    if surface.is_degenerate() {
        return Err(AquamarkError::degenerate_surface(format!(
            "preview surface {}x{} has no area",
            surface.width, surface.height
        )));
    }
    let width = surface.width.round().max(1.0) as u32;
    let height = surface.height.round().max(1.0) as u32;
    let mut canvas = Pixmap::new(width, height);

    let native = NativeSize {
        width: base.width,
        height: base.height,
    };
    let fit = contain_fit(native, surface);
    if fit.width() > 0.0 && fit.height() > 0.0 {
        let affine = kurbo::Affine::translate(kurbo::Vec2::new(fit.x0, fit.y0))
            * kurbo::Affine::scale_non_uniform(
                fit.width() / f64::from(base.width.max(1)),
                fit.height() / f64::from(base.height.max(1)),
            );
        canvas.stamp_affine(base, affine, 1.0);
    }

    // At preview scale the surface is its own native target.
    let preview_native = NativeSize { width, height };
    stamp_watermark(&mut canvas, prepared, spec, surface, preview_native)?;
    Ok(canvas)
}
