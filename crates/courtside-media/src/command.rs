//! FFmpeg invocation.
//!
//! The pipeline runs FFmpeg in three shapes: a raw RGB decode pipe for the
//! tracking pass, stream-copy cuts of highlight windows, and a concat of those
//! cuts into one reel. [`FfmpegCommand`] builds the argument list for each and
//! [`FfmpegRunner`] drives the non-piped ones to completion.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};
use crate::progress::{is_progress_line, FfmpegProgress, ProgressParser};

/// Maximum stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Placed before `-i`
    before_input: Vec<String>,
    /// Placed between `-i` and the output
    before_output: Vec<String>,
    progress: bool,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            before_input: Vec::new(),
            before_output: Vec::new(),
            progress: true,
        }
    }

    /// Restrict the input to `[start, start + duration)` seconds. Input-side
    /// seeking snaps to the preceding keyframe when streams are copied.
    pub fn window(mut self, start: f64, duration: f64) -> Self {
        self.before_input.extend([
            "-ss".to_string(),
            format!("{:.3}", start.max(0.0)),
            "-t".to_string(),
            format!("{:.3}", duration.max(0.0)),
        ]);
        self
    }

    /// Read the input as a concat demuxer list.
    pub fn concat_list(mut self) -> Self {
        self.before_input
            .extend(["-f", "concat", "-safe", "0"].map(String::from));
        self
    }

    /// Resize decoded frames.
    pub fn scale(mut self, width: u32, height: u32) -> Self {
        self.before_output
            .extend(["-vf".to_string(), format!("scale={}:{}", width, height)]);
        self
    }

    /// Copy every stream without re-encoding.
    pub fn codec_copy(mut self) -> Self {
        self.before_output.extend(["-c", "copy"].map(String::from));
        self
    }

    /// Emit packed RGB24 frames without audio, for reading off a pipe.
    pub fn raw_rgb(mut self) -> Self {
        self.before_output
            .extend(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24"].map(String::from));
        self.progress = false;
        self
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-y".to_string(), "-v".to_string(), "error".to_string()];
        if self.progress {
            args.extend(["-progress", "pipe:2", "-nostats"].map(String::from));
        }
        args.extend(self.before_input.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.before_output.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Runs FFmpeg to completion, killing it when the run is cancelled.
#[derive(Default)]
pub struct FfmpegRunner {
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        self.run_with_progress(cmd, |_| {}).await
    }

    pub async fn run_with_progress<F>(&self, cmd: &FfmpegCommand, on_progress: F) -> MediaResult<()>
    where
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        check_ffmpeg()?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        // Progress blocks go to the callback, anything else is kept for errors.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut parser = ProgressParser::default();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(progress) = parser.feed(&line) {
                    on_progress(progress);
                } else if !is_progress_line(&line) {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
            }
            Vec::from(tail).join("\n")
        });

        let status = self.wait(&mut child).await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        let status = status?;
        if status.success() {
            return Ok(());
        }
        Err(MediaError::ffmpeg_failed(
            "FFmpeg exited with non-zero status",
            (!stderr_tail.is_empty()).then_some(stderr_tail),
            status.code(),
        ))
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<ExitStatus> {
        let Some(mut cancel_rx) = self.cancel_rx.clone() else {
            return Ok(child.wait().await?);
        };
        if *cancel_rx.borrow_and_update() {
            let _ = child.kill().await;
            return Err(MediaError::Cancelled);
        }

        loop {
            tokio::select! {
                status = child.wait() => return Ok(status?),
                changed = cancel_rx.changed() => {
                    // A dropped sender can no longer cancel; just wait it out.
                    if changed.is_err() {
                        return Ok(child.wait().await?);
                    }
                    if *cancel_rx.borrow_and_update() {
                        info!("FFmpeg cancelled, killing process");
                        let _ = child.kill().await;
                        return Err(MediaError::Cancelled);
                    }
                }
            }
        }
    }
}

pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}
