use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::{
    error::{AquamarkError, AquamarkResult},
    raster::Pixmap,
};

/// Probed metadata for a video file on disk.
#[derive(Clone, Debug)]
pub struct VideoSourceInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub duration_sec: f64,
    pub fps: f64,
}

#[derive(Deserialize)]
struct ProbeOutput {
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.parse().ok()?;
    let den: f64 = den.parse().ok()?;
    if den == 0.0 { None } else { Some(num / den) }
}

/// Classify a subprocess spawn failure: a missing binary is an environment
/// problem, anything else bubbles as-is.
fn spawn_error(tool: &str, err: std::io::Error) -> AquamarkError {
    if err.kind() == std::io::ErrorKind::NotFound {
        AquamarkError::unsupported_environment(format!("`{tool}` not found on PATH"))
    } else {
        AquamarkError::Other(anyhow::Error::new(err).context(format!("spawning `{tool}`")))
    }
}

/// Probe a video with `ffprobe`: dimensions, duration and frame rate.
pub fn probe_video(path: &Path) -> AquamarkResult<VideoSourceInfo> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| spawn_error("ffprobe", e))?;
    if !output.status.success() {
        return Err(AquamarkError::playback(format!(
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let probe: ProbeOutput = serde_json::from_slice(&output.stdout)
        .map_err(|e| AquamarkError::playback(format!("unparsable ffprobe output: {e}")))?;
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| {
            AquamarkError::playback(format!("no video stream in {}", path.display()))
        })?;
    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(AquamarkError::playback(format!(
                "video stream in {} reports no dimensions",
                path.display()
            )));
        }
    };
    let duration_sec = stream
        .duration
        .as_deref()
        .or(probe.format.as_ref().and_then(|f| f.duration.as_deref()))
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .filter(|f| f.is_finite() && *f > 0.0)
        .unwrap_or(30.0);
    Ok(VideoSourceInfo {
        path: path.to_path_buf(),
        width,
        height,
        duration_sec,
        fps,
    })
}

/// Decode a video to raw RGBA8 frames at `fps`, invoking `on_frame` with the
/// presentation time of each frame. Returns the number of frames delivered.
pub fn decode_video_frames_rgba8(
    info: &VideoSourceInfo,
    fps: f64,
    mut on_frame: impl FnMut(f64, &[u8]) -> AquamarkResult<()>,
) -> AquamarkResult<usize> {
    let frame_len = info.width as usize * info.height as usize * 4;
    let mut child = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(&info.path)
        .arg("-vf")
        .arg(format!("fps={fps}"))
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error("ffmpeg", e))?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| AquamarkError::playback("ffmpeg stdout unavailable"))?;
    let mut frame = vec![0u8; frame_len];
    let mut count = 0usize;
    loop {
        match read_exact_or_eof(&mut stdout, &mut frame) {
            Ok(true) => {
                on_frame(count as f64 / fps, &frame)?;
                count += 1;
            }
            Ok(false) => break,
            Err(e) => {
                let _ = child.kill();
                return Err(AquamarkError::playback(format!("frame read failed: {e}")));
            }
        }
    }
    let status = child
        .wait()
        .map_err(|e| AquamarkError::playback(format!("waiting for ffmpeg: {e}")))?;
    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut s) = child.stderr.take() {
            let _ = s.read_to_string(&mut stderr);
        }
        return Err(AquamarkError::playback(format!(
            "ffmpeg decode failed: {}",
            stderr.trim()
        )));
    }
    Ok(count)
}

/// Fill `buf` completely, or return Ok(false) on a clean EOF at a frame
/// boundary. EOF mid-frame is an error.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "truncated frame",
            ));
        }
        filled += n;
    }
    Ok(true)
}

/// Decode an image file into a premultiplied pixmap.
pub fn load_image(path: &Path) -> AquamarkResult<Pixmap> {
    let img = image::open(path).map_err(|e| {
        AquamarkError::export_failed(format!("could not decode {}: {e}", path.display()))
    })?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    Ok(Pixmap::from_rgba8_straight(w, h, rgba.into_raw()))
}

/// Decode in-memory image bytes (uploaded watermark logos).
pub fn decode_image_bytes(data: &[u8]) -> AquamarkResult<Pixmap> {
    let img = image::load_from_memory(data)
        .map_err(|e| AquamarkError::export_failed(format!("could not decode image: {e}")))?;
    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    Ok(Pixmap::from_rgba8_straight(w, h, rgba.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rate_fraction_parses() {
        assert_eq!(parse_rate("30000/1001").map(|f| (f * 100.0).round()), Some(2997.0));
        assert_eq!(parse_rate("25/1"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
        assert_eq!(parse_rate("nonsense"), None);
    }

    #[test]
    fn probe_json_shape_parses() {
        let raw = r#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 640, "height": 360,
                 "avg_frame_rate": "24/1", "duration": "2.500000"}
            ],
            "format": {"duration": "2.503000"}
        }"#;
        let probe: ProbeOutput = serde_json::from_str(raw).unwrap();
        let video = probe
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .unwrap();
        assert_eq!(video.width, Some(640));
        assert_eq!(video.height, Some(360));
        assert_eq!(video.avg_frame_rate.as_deref(), Some("24/1"));
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let data = vec![0u8; 6];
        let mut cursor = std::io::Cursor::new(data);
        let mut buf = [0u8; 4];
        assert!(read_exact_or_eof(&mut cursor, &mut buf).unwrap());
        assert!(read_exact_or_eof(&mut cursor, &mut buf).is_err());
    }

    #[test]
    fn clean_eof_reports_no_frame() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];
        assert!(!read_exact_or_eof(&mut cursor, &mut buf).unwrap());
    }

    #[test]
    fn decode_image_bytes_rejects_garbage() {
        let err = decode_image_bytes(&[1, 2, 3]).unwrap_err();
        assert!(matches!(err, AquamarkError::ExportFailed(_)));
    }

    #[test]
    fn decode_image_bytes_reads_png() {
        // 1x1 white PNG produced by the image crate itself.
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(1, 1, image::Rgba([255, 255, 255, 255]));
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        let pixmap = decode_image_bytes(&bytes).unwrap();
        assert_eq!((pixmap.width, pixmap.height), (1, 1));
        assert_eq!(pixmap.pixel(0, 0), [255, 255, 255, 255]);
    }
}
