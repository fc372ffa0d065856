//! Match video inspection via FFprobe.
//!
//! Only the first video stream matters to the pipeline. Handheld footage often
//! carries a rotation tag; FFmpeg applies it while decoding, so the decoded
//! frame size is the display size, not the coded one.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};

/// Frame rate assumed when the container does not report a usable one.
pub const DEFAULT_FPS: f64 = 30.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Seconds; 0 when unknown
    pub duration: f64,
    /// Coded width in pixels
    pub width: u32,
    /// Coded height in pixels
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    /// Clockwise display rotation in degrees, normalized to 0, 90, 180 or 270
    #[serde(default)]
    pub rotation: u32,
    /// Frame count reported by the container, when present
    pub frame_count: Option<u64>,
}

impl VideoInfo {
    /// Size of the frames FFmpeg will hand back after autorotation.
    pub fn display_dimensions(&self) -> (u32, u32) {
        match self.rotation {
            90 | 270 => (self.height, self.width),
            _ => (self.width, self.height),
        }
    }

    /// Number of frames to expect, preferring the container count.
    pub fn expected_frames(&self) -> u64 {
        match self.frame_count {
            Some(count) if count > 0 => count,
            _ => (self.duration * self.fps).round().max(0.0) as u64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProbeReport {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeReport {
    fn into_info(self) -> MediaResult<VideoInfo> {
        let stream = self
            .streams
            .into_iter()
            .next()
            .ok_or_else(|| MediaError::InvalidVideo("No video stream found".to_string()))?;

        let fps = [&stream.avg_frame_rate, &stream.r_frame_rate]
            .into_iter()
            .flatten()
            .find_map(|rate| parse_frame_rate(rate))
            .unwrap_or(DEFAULT_FPS);

        // Container duration first, the stream's own as a fallback.
        let duration = self
            .format
            .and_then(|f| f.duration)
            .or(stream.duration)
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(0.0);

        let rotation = stream
            .side_data_list
            .iter()
            .find_map(|side| side.rotation)
            .or_else(|| stream.tags.rotate.as_deref().and_then(|r| r.parse().ok()))
            .map(normalize_rotation)
            .unwrap_or(0);

        Ok(VideoInfo {
            duration,
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps,
            codec: stream.codec_name.unwrap_or_default(),
            rotation,
            frame_count: stream.nb_frames.and_then(|n| n.parse().ok()),
        })
    }
}

/// Probe the first video stream of a match recording.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }
    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args(["-v", "error", "-select_streams", "v:0", "-print_format", "json"])
        .args(["-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("ffprobe exited with {}", output.status),
            stderr: Some(String::from_utf8_lossy(&output.stderr).into_owned()),
        });
    }

    parse_probe_output(&output.stdout)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<VideoInfo> {
    let report: ProbeReport = serde_json::from_slice(stdout)?;
    report.into_info()
}

/// "30000/1001" or "29.97"; `None` for zero or malformed rates.
fn parse_frame_rate(s: &str) -> Option<f64> {
    let fps = match s.split_once('/') {
        Some((num, den)) => {
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num.parse::<f64>().ok()? / den
        }
        None => s.parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

fn normalize_rotation(degrees: f64) -> u32 {
    let quarter_turns = (degrees / 90.0).round() as i64;
    (quarter_turns.rem_euclid(4) * 90) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("50").unwrap() - 50.0).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("0/1").is_none());
    }

    #[test]
    fn test_normalize_rotation() {
        assert_eq!(normalize_rotation(-90.0), 270);
        assert_eq!(normalize_rotation(90.0), 90);
        assert_eq!(normalize_rotation(180.0), 180);
        assert_eq!(normalize_rotation(360.0), 0);
    }

    #[test]
    fn test_parse_rotated_phone_clip() {
        let json = br#"{
            "streams": [{
                "codec_name": "hevc",
                "width": 1920,
                "height": 1080,
                "avg_frame_rate": "0/0",
                "r_frame_rate": "60/1",
                "side_data_list": [{"rotation": -90}]
            }],
            "format": {"duration": "12.5"}
        }"#;
        let info = parse_probe_output(json).unwrap();

        assert_eq!(info.rotation, 270);
        assert_eq!(info.display_dimensions(), (1080, 1920));
        assert!((info.fps - 60.0).abs() < 1e-9);
        assert_eq!(info.expected_frames(), 750);
    }

    #[test]
    fn test_parse_without_video_stream() {
        let err = parse_probe_output(br#"{"streams": [], "format": {}}"#).unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn test_expected_frames_prefers_container_count() {
        let json = br#"{
            "streams": [{"width": 1280, "height": 720, "avg_frame_rate": "25/1",
                         "nb_frames": "248", "tags": {"rotate": "0"}}],
            "format": {"duration": "10.0"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert_eq!(info.expected_frames(), 248);
        assert_eq!(info.display_dimensions(), (1280, 720));
    }
}
