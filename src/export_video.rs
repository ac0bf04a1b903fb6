use std::time::Instant;

use tracing::{debug, warn};

use crate::{
    error::{AquamarkError, AquamarkResult},
    export_image::unix_millis,
    media::{VideoSourceInfo, decode_video_frames_rgba8},
    model::{NamedBinary, NativeSize, SurfaceGeometry, WatermarkSpec},
    raster::Pixmap,
    record::{CodecProbe, ExportJob, FrameRecorder, RecorderFactory, negotiate_codec},
    surface::Transport,
    text::WatermarkFont,
    watermark::{PreparedWatermark, prepare_watermark, stamp_watermark},
};

/// Hard ceiling on export wall time, regardless of clip length.
const MAX_EXPORT_SECS: f64 = 120.0;
/// Slack on top of the clip duration before the deadline trips.
const DEADLINE_SLACK_SECS: f64 = 10.0;

/// Worst-case wall time budget for a clip of the given duration.
pub fn export_deadline_secs(duration_secs: f64) -> f64 {
    (duration_secs.max(0.0) + DEADLINE_SLACK_SECS).min(MAX_EXPORT_SECS)
}

/// Inputs to the export state machine. Fed by the real-time driver in
/// production and synthesized directly in tests.
pub enum ExportEvent<'a> {
    /// A decoded base frame, straight RGBA8 at native size.
    Frame { time_secs: f64, rgba: &'a [u8] },
    /// Wall clock checkpoint; trips the deadline.
    Tick { elapsed_secs: f64 },
    /// The source ran out of frames.
    Ended,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExportProgress {
    /// 0..=1 of the clip's timeline processed.
    pub ratio: f64,
    pub elapsed_secs: f64,
    /// Estimate from throughput so far; `None` until there is any.
    pub remaining_secs: Option<f64>,
}

/// Frame-by-frame video export: each base frame is composited with the
/// watermark on a native-size canvas and handed to the recorder; encoded
/// chunks accumulate in an `ExportJob`. The machine is synchronous and
/// deterministic; time only enters through the events it is fed.
pub struct VideoExportJob {
    recorder: Option<Box<dyn FrameRecorder>>,
    job: Option<ExportJob>,
    prepared: PreparedWatermark,
    spec: WatermarkSpec,
    surface: SurfaceGeometry,
    native: NativeSize,
    duration_secs: f64,
    deadline_secs: f64,
    canvas: Pixmap,
    current_time: f64,
    stopped: bool,
}

impl std::fmt::Debug for VideoExportJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoExportJob")
            .field("recorder", &self.recorder.is_some())
            .field("job", &self.job)
            .field("prepared", &self.prepared)
            .field("spec", &self.spec)
            .field("surface", &self.surface)
            .field("native", &self.native)
            .field("duration_secs", &self.duration_secs)
            .field("deadline_secs", &self.deadline_secs)
            .field("canvas", &self.canvas)
            .field("current_time", &self.current_time)
            .field("stopped", &self.stopped)
            .finish()
    }
}

impl VideoExportJob {
    /// Negotiate a codec and open the recorder. A recorder that cannot be
    /// constructed with the negotiated choice is retried once with the
    /// platform default; mime type and file extension then follow whatever
    /// the recorder actually reports. No recording capability at all is
    /// fatal before any work happens.
    pub fn new(
        factory: &dyn RecorderFactory,
        probe: &dyn CodecProbe,
        native: NativeSize,
        duration_secs: f64,
        fps: f64,
        spec: &WatermarkSpec,
        surface: SurfaceGeometry,
        font: Option<&WatermarkFont>,
    ) -> AquamarkResult<Self> {
        if !factory.is_available() {
            return Err(AquamarkError::unsupported_environment(
                "video recording is not supported here",
            ));
        }
        let prepared = prepare_watermark(spec, font)?;
        let choice = negotiate_codec(probe);
        let recorder = match factory.open(choice, native, fps) {
            Ok(r) => r,
            Err(first) => {
                warn!(error = %first, "recorder rejected negotiated codec, retrying with default");
                factory.open(None, native, fps)?
            }
        };
        let job = ExportJob::new(recorder.mime_type(), recorder.extension());
        debug!(mime = job.mime_type(), "recording started");
        Ok(Self {
            recorder: Some(recorder),
            job: Some(job),
            prepared,
            spec: spec.clone(),
            surface,
            native,
            duration_secs,
            deadline_secs: export_deadline_secs(duration_secs),
            canvas: Pixmap::new(native.width, native.height),
            current_time: 0.0,
            stopped: false,
        })
    }

    pub fn mime_type(&self) -> &str {
        self.job.as_ref().map(ExportJob::mime_type).unwrap_or("")
    }

    pub fn deadline_secs(&self) -> f64 {
        self.deadline_secs
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn progress(&self, elapsed_secs: f64) -> ExportProgress {
        let ratio = if self.duration_secs > 0.0 {
            (self.current_time / self.duration_secs).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let remaining_secs = if ratio > 0.0 && elapsed_secs > 0.0 {
            Some(elapsed_secs * (1.0 - ratio) / ratio)
        } else {
            None
        };
        ExportProgress {
            ratio,
            elapsed_secs,
            remaining_secs,
        }
    }

    fn drain_into_job(recorder: &mut Box<dyn FrameRecorder>, job: &mut ExportJob) {
        for chunk in recorder.poll_chunks() {
            job.push_chunk(chunk);
        }
    }

    fn stop_recorder(&mut self) -> AquamarkResult<()> {
        self.stopped = true;
        let Some(recorder) = self.recorder.take() else {
            return Ok(());
        };
        let remaining = recorder.stop()?;
        if let Some(job) = self.job.as_mut() {
            for chunk in remaining {
                job.push_chunk(chunk);
            }
        }
        Ok(())
    }

    /// Advance the machine by one event. Events after the recorder stopped
    /// are ignored so a straggling frame or tick cannot corrupt the output.
    pub fn step(&mut self, event: ExportEvent<'_>) -> AquamarkResult<ExportProgress> {
        match event {
            ExportEvent::Frame { time_secs, rgba } => {
                if self.stopped {
                    return Ok(self.progress(0.0));
                }
                let expected = self.native.width as usize * self.native.height as usize * 4;
                if rgba.len() != expected {
                    return Err(AquamarkError::encoding_failed(format!(
                        "frame is {} bytes, expected {expected}",
                        rgba.len()
                    )));
                }
                // Base frames are opaque, so the straight bytes are already
                // valid premultiplied data.
                self.canvas.data.copy_from_slice(rgba);
                stamp_watermark(
                    &mut self.canvas,
                    &self.prepared,
                    &self.spec,
                    self.surface,
                    self.native,
                )?;
                if let (Some(recorder), Some(job)) = (self.recorder.as_mut(), self.job.as_mut()) {
                    recorder.write_frame(&self.canvas.to_rgba8_straight())?;
                    Self::drain_into_job(recorder, job);
                }
                self.current_time = time_secs;
                Ok(self.progress(0.0))
            }
            ExportEvent::Tick { elapsed_secs } => {
                if !self.stopped && elapsed_secs >= self.deadline_secs {
                    warn!(
                        elapsed_secs,
                        deadline_secs = self.deadline_secs,
                        "export deadline reached, forcing recorder stop"
                    );
                    self.stop_recorder()?;
                }
                Ok(self.progress(elapsed_secs))
            }
            ExportEvent::Ended => {
                if !self.stopped {
                    self.stop_recorder()?;
                }
                self.current_time = self.duration_secs;
                Ok(self.progress(0.0))
            }
        }
    }

    /// Stop if still running and hand over the final file. Empty or
    /// implausibly small recordings fail; a deadline-stopped recording with
    /// real chunks still yields a playable (truncated) file.
    pub fn finish(mut self) -> AquamarkResult<NamedBinary> {
        if !self.stopped {
            self.stop_recorder()?;
        }
        let job = self
            .job
            .take()
            .ok_or_else(|| AquamarkError::encoding_failed("export already consumed"))?;
        job.finish(&format!("watermarked-{}", unix_millis()))
    }

    /// Discard everything; nothing is surfaced to the user.
    pub fn abort(mut self) {
        if let Err(err) = self.stop_recorder() {
            debug!(error = %err, "recorder stop during abort");
        }
        if let Some(job) = self.job.take() {
            job.abort();
        }
    }
}

/// Real-time driver: takes the media over from any live transport, decodes
/// base frames at the source frame rate and feeds the state machine against
/// the wall clock.
#[tracing::instrument(skip_all, fields(duration = info.duration_sec))]
pub fn export_video(
    info: &VideoSourceInfo,
    spec: &WatermarkSpec,
    surface: SurfaceGeometry,
    font: Option<&WatermarkFont>,
    factory: &dyn RecorderFactory,
    probe: &dyn CodecProbe,
    transport: Option<&mut dyn Transport>,
    mut on_progress: impl FnMut(ExportProgress),
) -> AquamarkResult<NamedBinary> {
    if let Some(t) = transport {
        t.begin_export();
    }
    let native = NativeSize {
        width: info.width,
        height: info.height,
    };
    let mut job = VideoExportJob::new(
        factory,
        probe,
        native,
        info.duration_sec,
        info.fps,
        spec,
        surface,
        font,
    )?;
    let started = Instant::now();
    decode_video_frames_rgba8(info, info.fps, |time_secs, rgba| {
        job.step(ExportEvent::Frame { time_secs, rgba })?;
        let progress = job.step(ExportEvent::Tick {
            elapsed_secs: started.elapsed().as_secs_f64(),
        })?;
        on_progress(progress);
        Ok(())
    })?;
    job.step(ExportEvent::Ended)?;
    job.finish()
}
