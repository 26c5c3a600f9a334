use std::io::Cursor;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};
use thiserror::Error;

use crate::logging;

const FFPROBE_BIN: &str = "ffprobe";
const FFMPEG_BIN: &str = "ffmpeg";
const JPEG_QUALITY: u8 = 90;
const PLACEHOLDER_WIDTH: u32 = 320;
const PLACEHOLDER_HEIGHT: u32 = 180;

pub const PLACEHOLDER_CAPTION: &str = "Thumbnail no disponible";

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("alert has no video to capture")]
    MissingVideo,
    #[error("video is still loading, try again shortly")]
    StillLoading(#[source] anyhow::Error),
    #[error("video has invalid dimensions ({width}x{height})")]
    InvalidDimensions { width: u32, height: u32 },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// One captured frame, already JPEG-encoded. `placeholder` marks the
/// generated stand-in used when the frame pixels could not be read from the
/// source; the card shows [`PLACEHOLDER_CAPTION`] for those.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub jpeg: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub offset_seconds: f64,
    pub placeholder: bool,
}

impl CapturedFrame {
    /// Wire payload for the thumbnail table.
    pub fn to_data_url(&self) -> String {
        encode_data_url(&self.jpeg)
    }
}

pub fn encode_data_url(jpeg: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        general_purpose::STANDARD.encode(jpeg)
    )
}

/// Grabs the frame at `offset_seconds` of the clip at `url`. The source is
/// probed first so unready streams and zero-dimension streams report
/// distinct errors; an unreadable frame degrades to a generated placeholder
/// instead of failing the capture.
pub fn capture_frame(url: &str, offset_seconds: f64) -> Result<CapturedFrame, CaptureError> {
    if url.trim().is_empty() {
        return Err(CaptureError::MissingVideo);
    }

    let (width, height) = probe_dimensions(url)?;
    if width == 0 || height == 0 {
        return Err(CaptureError::InvalidDimensions { width, height });
    }
    logging::debug(format!("capture: {url} at {offset_seconds}s ({width}x{height})"));

    match extract_frame(url, offset_seconds) {
        Ok(jpeg) => Ok(CapturedFrame {
            jpeg,
            width,
            height,
            offset_seconds,
            placeholder: false,
        }),
        Err(err) => {
            logging::warn(format!("capture: frame readout failed, using placeholder: {err:#}"));
            let jpeg = placeholder_thumbnail();
            Ok(CapturedFrame {
                jpeg,
                width: PLACEHOLDER_WIDTH,
                height: PLACEHOLDER_HEIGHT,
                offset_seconds,
                placeholder: true,
            })
        }
    }
}

fn probe_dimensions(url: &str) -> Result<(u32, u32), CaptureError> {
    let output = Command::new(FFPROBE_BIN)
        .args([
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ])
        .arg(url)
        .stdin(Stdio::null())
        .output()
        .map_err(|err| CaptureError::StillLoading(anyhow!(err).context("launch ffprobe")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CaptureError::StillLoading(anyhow!(
            "probe failed: {}",
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_probe_output(&stdout)
}

fn parse_probe_output(stdout: &str) -> Result<(u32, u32), CaptureError> {
    let line = stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| CaptureError::StillLoading(anyhow!("probe returned no video stream")))?;

    let mut parts = line.split('x');
    let width = parts
        .next()
        .and_then(|part| part.trim().parse::<u32>().ok())
        .unwrap_or(0);
    let height = parts
        .next()
        .and_then(|part| part.trim().parse::<u32>().ok())
        .unwrap_or(0);
    Ok((width, height))
}

fn extract_frame(url: &str, offset_seconds: f64) -> anyhow::Result<Vec<u8>> {
    let output = Command::new(FFMPEG_BIN)
        .args(["-v", "error", "-ss", &format!("{offset_seconds:.3}")])
        .args(["-i", url])
        .args(["-frames:v", "1", "-f", "image2pipe", "-vcodec", "mjpeg", "pipe:1"])
        .stdin(Stdio::null())
        .output()
        .context("launch ffmpeg")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("frame extraction failed: {}", stderr.trim());
    }
    if output.stdout.is_empty() {
        anyhow::bail!("frame extraction produced no image");
    }

    // Validate the bytes actually decode before anything stores them.
    image::load_from_memory(&output.stdout).context("decode extracted frame")?;
    Ok(output.stdout)
}

/// Flat dark 320x180 JPEG used when frame pixels cannot be read. The
/// explanatory caption is rendered by the card, not burned into the image.
pub fn placeholder_thumbnail() -> Vec<u8> {
    let mut canvas = RgbImage::from_pixel(
        PLACEHOLDER_WIDTH,
        PLACEHOLDER_HEIGHT,
        Rgb([26, 26, 26]),
    );
    // A thin lighter band keeps the stand-in recognizable at a glance.
    for x in 0..PLACEHOLDER_WIDTH {
        for y in (PLACEHOLDER_HEIGHT / 2 - 1)..=(PLACEHOLDER_HEIGHT / 2 + 1) {
            canvas.put_pixel(x, y, Rgb([64, 64, 64]));
        }
    }

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    canvas
        .write_with_encoder(encoder)
        .expect("encode placeholder jpeg");
    jpeg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_is_a_decodable_jpeg() {
        let jpeg = placeholder_thumbnail();
        let decoded =
            image::load_from_memory_with_format(&jpeg, image::ImageFormat::Jpeg).unwrap();
        assert_eq!(decoded.width(), PLACEHOLDER_WIDTH);
        assert_eq!(decoded.height(), PLACEHOLDER_HEIGHT);
    }

    #[test]
    fn data_url_wraps_base64_jpeg() {
        let url = encode_data_url(&[0xff, 0xd8, 0xff]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let payload = url.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(
            general_purpose::STANDARD.decode(payload).unwrap(),
            vec![0xff, 0xd8, 0xff]
        );
    }

    #[test]
    fn probe_output_parses_dimensions() {
        assert!(matches!(parse_probe_output("1280x720\n"), Ok((1280, 720))));
        assert!(matches!(parse_probe_output(" 640x360 "), Ok((640, 360))));
        assert!(matches!(parse_probe_output("0x0"), Ok((0, 0))));
        assert!(matches!(
            parse_probe_output("\n"),
            Err(CaptureError::StillLoading(_))
        ));
    }

    #[test]
    fn error_messages_are_distinct_per_cause() {
        let loading = CaptureError::StillLoading(anyhow!("probe failed"));
        let dimensions = CaptureError::InvalidDimensions {
            width: 0,
            height: 720,
        };
        assert_ne!(loading.to_string(), dimensions.to_string());
        assert!(loading.to_string().contains("still loading"));
        assert!(dimensions.to_string().contains("0x720"));
    }

    #[test]
    fn missing_video_is_rejected_before_probing() {
        assert!(matches!(
            capture_frame("  ", 0.0),
            Err(CaptureError::MissingVideo)
        ));
    }
}
