use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc;
use std::thread::JoinHandle;

use tracing::debug;

use crate::{
    error::{AquamarkError, AquamarkResult},
    model::{NamedBinary, NativeSize},
};

/// Container/codec combinations the exporter knows how to ask for, best first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodecChoice {
    Mp4,
    WebmH264,
    WebmVp9,
    WebmVp8,
    Webm,
}

impl CodecChoice {
    /// Negotiation order: the most portable container first, then webm
    /// variants from best to plainest.
    pub const PREFERENCE: [CodecChoice; 5] = [
        CodecChoice::Mp4,
        CodecChoice::WebmH264,
        CodecChoice::WebmVp9,
        CodecChoice::WebmVp8,
        CodecChoice::Webm,
    ];

    pub fn mime_type(self) -> &'static str {
        match self {
            CodecChoice::Mp4 => "video/mp4",
            CodecChoice::WebmH264 => "video/webm;codecs=h264",
            CodecChoice::WebmVp9 => "video/webm;codecs=vp9",
            CodecChoice::WebmVp8 => "video/webm;codecs=vp8",
            CodecChoice::Webm => "video/webm",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            CodecChoice::Mp4 => "mp4",
            _ => "webm",
        }
    }
}

/// Capability check for a codec choice, answered by the environment.
pub trait CodecProbe {
    fn supports(&self, choice: CodecChoice) -> bool;
}

/// First supported entry in preference order, or `None` when nothing matches
/// and the recorder should fall back to its platform default.
pub fn negotiate_codec(probe: &dyn CodecProbe) -> Option<CodecChoice> {
    let chosen = CodecChoice::PREFERENCE
        .into_iter()
        .find(|c| probe.supports(*c));
    debug!(?chosen, "codec negotiation");
    chosen
}

/// An open recording session. Frames go in as raw RGBA8 at the agreed size;
/// encoded container bytes come back out as ordered chunks.
pub trait FrameRecorder {
    /// The mime type actually in effect, which may differ from the request
    /// when the recorder fell back to a default.
    fn mime_type(&self) -> &str;
    fn extension(&self) -> &str;
    fn write_frame(&mut self, rgba: &[u8]) -> AquamarkResult<()>;
    /// Encoded bytes produced since the last poll. Chunk boundaries are
    /// arbitrary; only ordering matters.
    fn poll_chunks(&mut self) -> Vec<Vec<u8>>;
    /// Finish the recording and return any remaining chunks.
    fn stop(self: Box<Self>) -> AquamarkResult<Vec<Vec<u8>>>;
}

/// Opens recorders. The seam that lets tests run without ffmpeg.
pub trait RecorderFactory {
    fn is_available(&self) -> bool;
    /// `choice: None` requests the platform default container.
    fn open(
        &self,
        choice: Option<CodecChoice>,
        size: NativeSize,
        fps: f64,
    ) -> AquamarkResult<Box<dyn FrameRecorder>>;
}

/// Outputs smaller than this are treated as encoder failures rather than
/// handed to the user as a broken file.
pub const MIN_OUTPUT_BYTES: usize = 1000;

/// Ordered chunk buffer for one export, consumed into the final binary.
#[derive(Debug)]
pub struct ExportJob {
    mime_type: String,
    extension: String,
    chunks: Vec<Vec<u8>>,
}

impl ExportJob {
    pub fn new(mime_type: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            extension: extension.into(),
            chunks: Vec::new(),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn byte_len(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Concatenate chunks in arrival order into the deliverable file.
    /// An empty or implausibly small output is an encoding failure; a
    /// partial file is never surfaced as success.
    pub fn finish(self, stem: &str) -> AquamarkResult<NamedBinary> {
        if self.chunks.is_empty() {
            return Err(AquamarkError::encoding_failed(
                "recorder produced no data",
            ));
        }
        let total = self.byte_len();
        if total < MIN_OUTPUT_BYTES {
            return Err(AquamarkError::encoding_failed(format!(
                "recorder produced only {total} bytes"
            )));
        }
        let mut data = Vec::with_capacity(total);
        for chunk in &self.chunks {
            data.extend_from_slice(chunk);
        }
        Ok(NamedBinary {
            filename: format!("{stem}.{}", self.extension),
            mime_type: self.mime_type,
            data,
        })
    }

    /// Drop everything collected so far.
    pub fn abort(self) {
        drop(self);
    }
}

/// `ffmpeg -encoders` capability probe, queried once and cached.
pub struct FfmpegCodecProbe {
    encoders: String,
}

impl FfmpegCodecProbe {
    pub fn detect() -> AquamarkResult<Self> {
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AquamarkError::unsupported_environment("`ffmpeg` not found on PATH")
                } else {
                    AquamarkError::Other(anyhow::Error::new(e).context("probing ffmpeg encoders"))
                }
            })?;
        Ok(Self {
            encoders: String::from_utf8_lossy(&output.stdout).into_owned(),
        })
    }
}

impl CodecProbe for FfmpegCodecProbe {
    fn supports(&self, choice: CodecChoice) -> bool {
        match choice {
            CodecChoice::Mp4 => self.encoders.contains("libx264"),
            // The webm muxer refuses h264 streams, whatever the encoder list
            // says, so this combination is never offered.
            CodecChoice::WebmH264 => false,
            CodecChoice::WebmVp9 => self.encoders.contains("libvpx-vp9"),
            CodecChoice::WebmVp8 | CodecChoice::Webm => self.encoders.contains("libvpx"),
        }
    }
}

fn ffmpeg_args(choice: Option<CodecChoice>) -> (&'static [&'static str], &'static str, &'static str)
{
    match choice {
        Some(CodecChoice::Mp4) => (
            // Fragmented mp4 so the muxer can stream to a pipe.
            &[
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "frag_keyframe+empty_moov",
                "-f",
                "mp4",
            ],
            "video/mp4",
            "mp4",
        ),
        Some(CodecChoice::WebmH264) => (
            &["-c:v", "libx264", "-f", "webm"],
            "video/webm;codecs=h264",
            "webm",
        ),
        Some(CodecChoice::WebmVp9) | Some(CodecChoice::Webm) => (
            &["-c:v", "libvpx-vp9", "-pix_fmt", "yuv420p", "-f", "webm"],
            "video/webm;codecs=vp9",
            "webm",
        ),
        Some(CodecChoice::WebmVp8) => (
            &["-c:v", "libvpx", "-pix_fmt", "yuv420p", "-f", "webm"],
            "video/webm;codecs=vp8",
            "webm",
        ),
        // Platform default: matroska takes whatever encoder ffmpeg picks.
        None => (&["-f", "matroska"], "video/x-matroska", "mkv"),
    }
}

/// Pipes raw RGBA frames into an ffmpeg subprocess and collects the muxed
/// container bytes from its stdout on a reader thread, preserving order.
/// Audio is not captured; exports carry the composited frames only.
pub struct FfmpegRecorder {
    child: Child,
    stdin: Option<ChildStdin>,
    rx: mpsc::Receiver<Vec<u8>>,
    reader: Option<JoinHandle<()>>,
    mime_type: &'static str,
    extension: &'static str,
    frame_len: usize,
}

impl FfmpegRecorder {
    pub fn open(
        choice: Option<CodecChoice>,
        size: NativeSize,
        fps: f64,
    ) -> AquamarkResult<Self> {
        let (codec_args, mime_type, extension) = ffmpeg_args(choice);
        let geometry = format!("{}x{}", size.width, size.height);
        let rate = format!("{fps}");
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-f", "rawvideo", "-pix_fmt", "rgba"])
            .arg("-s")
            .arg(&geometry)
            .arg("-r")
            .arg(&rate)
            .args(["-i", "pipe:0", "-an"])
            .args(codec_args)
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AquamarkError::unsupported_environment("`ffmpeg` not found on PATH")
                } else {
                    AquamarkError::encoding_failed(format!("could not start ffmpeg: {e}"))
                }
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AquamarkError::encoding_failed("ffmpeg stdin unavailable"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| AquamarkError::encoding_failed("ffmpeg stdout unavailable"))?;
        let (tx, rx) = mpsc::channel();
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 64 * 1024];
            loop {
                match stdout.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        Ok(Self {
            child,
            stdin: Some(stdin),
            rx,
            reader: Some(reader),
            mime_type,
            extension,
            frame_len: size.width as usize * size.height as usize * 4,
        })
    }
}

impl FrameRecorder for FfmpegRecorder {
    fn mime_type(&self) -> &str {
        self.mime_type
    }

    fn extension(&self) -> &str {
        self.extension
    }

    fn write_frame(&mut self, rgba: &[u8]) -> AquamarkResult<()> {
        if rgba.len() != self.frame_len {
            return Err(AquamarkError::encoding_failed(format!(
                "frame is {} bytes, recorder expects {}",
                rgba.len(),
                self.frame_len
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AquamarkError::encoding_failed("recorder already stopped"))?;
        stdin
            .write_all(rgba)
            .map_err(|e| AquamarkError::encoding_failed(format!("writing frame: {e}")))
    }

    fn poll_chunks(&mut self) -> Vec<Vec<u8>> {
        self.rx.try_iter().collect()
    }

    fn stop(mut self: Box<Self>) -> AquamarkResult<Vec<Vec<u8>>> {
        // Closing stdin signals end of input; the encoder flushes and exits.
        drop(self.stdin.take());
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let mut stderr = String::new();
        if let Some(mut s) = self.child.stderr.take() {
            let _ = s.read_to_string(&mut stderr);
        }
        let status = self
            .child
            .wait()
            .map_err(|e| AquamarkError::encoding_failed(format!("waiting for ffmpeg: {e}")))?;
        let remaining: Vec<Vec<u8>> = self.rx.try_iter().collect();
        if !status.success() {
            return Err(AquamarkError::encoding_failed(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }
        Ok(remaining)
    }
}

/// Default factory: ffmpeg subprocess recorders.
pub struct FfmpegRecorderFactory;

impl RecorderFactory for FfmpegRecorderFactory {
    fn is_available(&self) -> bool {
        Command::new("ffmpeg")
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    fn open(
        &self,
        choice: Option<CodecChoice>,
        size: NativeSize,
        fps: f64,
    ) -> AquamarkResult<Box<dyn FrameRecorder>> {
        Ok(Box::new(FfmpegRecorder::open(choice, size, fps)?))
    }
}
