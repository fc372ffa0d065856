//! Sequential frame decoding.
//!
//! Frames are decoded by an FFmpeg child process writing `rgb24` raw video to
//! a pipe. Each read yields exactly one frame; a truncated read is reported as
//! a recoverable [`MediaError::CorruptFrame`], and the call after it still
//! checks how the decoder exited.

use async_trait::async_trait;
use image::RgbImage;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::{check_ffmpeg, FfmpegCommand};
use crate::error::{MediaError, MediaResult};
use crate::probe::VideoInfo;

/// One decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based index in decode order
    pub index: u64,
    /// Seconds from the start of the video
    pub timestamp: f64,
    pub image: RgbImage,
}

impl Frame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A sequential supply of frames.
#[async_trait]
pub trait FrameSource: Send {
    /// Frames per second of the decoded stream.
    fn frame_rate(&self) -> f64;

    /// Expected number of frames, if known.
    fn expected_frames(&self) -> Option<u64>;

    /// Decode the next frame. `Ok(None)` marks the end of the stream.
    async fn next_frame(&mut self) -> MediaResult<Option<Frame>>;
}

/// Frame reader backed by an FFmpeg rawvideo pipe.
pub struct FfmpegFrameReader {
    child: Child,
    stdout: ChildStdout,
    stderr_task: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    fps: f64,
    expected_frames: u64,
    next_index: u64,
    finished: bool,
}

impl FfmpegFrameReader {
    /// Start decoding `path` at its native resolution.
    pub fn open(path: impl AsRef<Path>, info: &VideoInfo) -> MediaResult<Self> {
        Self::open_scaled(path, info, None)
    }

    /// Start decoding `path`, downscaling to at most `max_width` pixels wide.
    pub fn open_scaled(
        path: impl AsRef<Path>,
        info: &VideoInfo,
        max_width: Option<u32>,
    ) -> MediaResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        let (display_width, display_height) = info.display_dimensions();
        if display_width == 0 || display_height == 0 {
            return Err(MediaError::InvalidVideo(format!(
                "Unknown frame size {}x{}",
                display_width, display_height
            )));
        }
        check_ffmpeg()?;

        let (width, height) = scaled_dimensions(display_width, display_height, max_width);
        let mut cmd = FfmpegCommand::new(path, "-");
        if (width, height) != (display_width, display_height) {
            cmd = cmd.scale(width, height);
        }
        let cmd = cmd.raw_rgb();

        let args = cmd.build_args();
        debug!("Decoding frames: ffmpeg {}", args.join(" "));

        let mut command = Command::new("ffmpeg");
        command.args(&args);
        let reader = Self::spawn(command, width, height, info.fps, info.expected_frames())?;

        info!(
            path = %path.display(),
            width,
            height,
            fps = info.fps,
            "Frame decoder started"
        );
        Ok(reader)
    }

    /// Run `command` as the decoder, reading `width` x `height` rgb24 frames
    /// from its stdout.
    fn spawn(
        mut command: Command,
        width: u32,
        height: u32,
        fps: f64,
        expected_frames: u64,
    ) -> MediaResult<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stdout not captured"))?;
        let stderr_task = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                let mut collected = Vec::new();
                while let Ok(Some(line)) = lines.next_line().await {
                    if collected.len() < 50 {
                        collected.push(line);
                    }
                }
                collected.join("\n")
            })
        });

        Ok(Self {
            child,
            stdout,
            stderr_task,
            width,
            height,
            fps,
            expected_frames,
            next_index: 0,
            finished: false,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    async fn finish(&mut self) -> MediaResult<Option<Frame>> {
        self.finished = true;
        let status = self.child.wait().await?;
        let stderr = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if status.success() {
            debug!(frames = self.next_index, "Frame decoder reached end of stream");
            Ok(None)
        } else {
            Err(MediaError::ffmpeg_failed(
                "Frame decoder exited with non-zero status",
                (!stderr.is_empty()).then_some(stderr),
                status.code(),
            ))
        }
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameReader {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn expected_frames(&self) -> Option<u64> {
        Some(self.expected_frames)
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        if self.finished {
            return Ok(None);
        }

        let mut buffer = vec![0u8; self.frame_len()];
        let mut filled = 0;
        while filled < buffer.len() {
            let read = self.stdout.read(&mut buffer[filled..]).await?;
            if read == 0 {
                break;
            }
            filled += read;
        }

        let index = self.next_index;
        if filled == 0 {
            return self.finish().await;
        }
        self.next_index += 1;

        // The pipe is at EOF now; the next call reaps the decoder.
        if filled < buffer.len() {
            return Err(MediaError::corrupt_frame(
                index,
                format!("truncated frame: {} of {} bytes", filled, buffer.len()),
            ));
        }

        let image = RgbImage::from_raw(self.width, self.height, buffer)
            .ok_or_else(|| MediaError::corrupt_frame(index, "frame buffer size mismatch"))?;

        Ok(Some(Frame {
            index,
            timestamp: index as f64 / self.fps,
            image,
        }))
    }
}

/// Frames already in memory, e.g. pre-decoded clips.
pub struct MemoryFrameSource {
    fps: f64,
    frames: VecDeque<MediaResult<Frame>>,
    total: u64,
}

impl MemoryFrameSource {
    pub fn new(fps: f64, frames: impl IntoIterator<Item = MediaResult<Frame>>) -> Self {
        let frames: VecDeque<_> = frames.into_iter().collect();
        let total = frames.len() as u64;
        Self { fps, frames, total }
    }

    /// Build frames from images, numbering them in order.
    pub fn from_images(fps: f64, images: impl IntoIterator<Item = RgbImage>) -> Self {
        Self::new(
            fps,
            images.into_iter().enumerate().map(|(i, image)| {
                Ok(Frame {
                    index: i as u64,
                    timestamp: i as f64 / fps,
                    image,
                })
            }),
        )
    }
}

#[async_trait]
impl FrameSource for MemoryFrameSource {
    fn frame_rate(&self) -> f64 {
        self.fps
    }

    fn expected_frames(&self) -> Option<u64> {
        Some(self.total)
    }

    async fn next_frame(&mut self) -> MediaResult<Option<Frame>> {
        self.frames.pop_front().transpose()
    }
}

/// Output size for a decode capped at `max_width`, keeping both sides even.
fn scaled_dimensions(width: u32, height: u32, max_width: Option<u32>) -> (u32, u32) {
    match max_width {
        Some(max) if max > 0 && width > max => {
            let scaled_height = height as f64 * max as f64 / width as f64;
            let even = |v: f64| (((v / 2.0).round() as u32) * 2).max(2);
            (even(max as f64), even(scaled_height))
        }
        _ => (width, height),
    }
}
