//! Highlight reel cutting.
//!
//! Each clip window is cut from the source with stream copy, then the pieces
//! are joined with the concat demuxer. Nothing is re-encoded, so cuts snap to
//! the nearest preceding keyframe.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use courtside_models::HighlightClip;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Name of the concat list written next to the cut segments.
const CONCAT_LIST_NAME: &str = "highlights.txt";

/// Cut `[start_secs, start_secs + duration]` out of `input` without re-encoding.
pub async fn extract_segment(
    runner: &FfmpegRunner,
    input: &Path,
    output: &Path,
    start_secs: f64,
    duration: f64,
) -> MediaResult<()> {
    debug!(
        input = %input.display(),
        output = %output.display(),
        start_secs,
        duration,
        "Extracting segment"
    );

    let cmd = FfmpegCommand::new(input, output)
        .window(start_secs, duration)
        .codec_copy();

    runner
        .run_with_progress(&cmd, move |progress| {
            if progress.is_complete {
                debug!(fraction = progress.fraction_of(duration), "Segment written");
            }
        })
        .await
}

/// Write an FFmpeg concat list naming `segments`.
///
/// Entries are written as given; relative names resolve against the list's
/// own directory.
pub async fn write_concat_list(path: &Path, segments: &[PathBuf]) -> MediaResult<()> {
    let mut body = String::new();
    for segment in segments {
        let name = segment.to_string_lossy().replace('\'', "'\\''");
        body.push_str(&format!("file '{name}'\n"));
    }
    tokio::fs::write(path, body).await?;
    Ok(())
}

/// Cut every clip out of `source` and concatenate them into `output`.
///
/// Intermediate files go to `work_dir` and are removed afterwards. Clips with
/// no duration are skipped.
pub async fn render_highlight_reel(
    runner: &FfmpegRunner,
    source: &Path,
    clips: &[HighlightClip],
    work_dir: &Path,
    output: &Path,
) -> MediaResult<PathBuf> {
    if !source.exists() {
        return Err(MediaError::FileNotFound(source.to_path_buf()));
    }
    let windows: Vec<&HighlightClip> = clips.iter().filter(|c| c.duration() > 0.0).collect();
    if windows.is_empty() {
        return Err(MediaError::internal("No highlight clips to render"));
    }

    tokio::fs::create_dir_all(work_dir).await?;
    let extension = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4");

    let mut segment_names = Vec::with_capacity(windows.len());
    let result = async {
        for (i, clip) in windows.iter().enumerate() {
            let name = PathBuf::from(format!("highlight_{i:03}.{extension}"));
            extract_segment(
                runner,
                source,
                &work_dir.join(&name),
                clip.start_time,
                clip.duration(),
            )
            .await?;
            segment_names.push(name);
        }

        let list_path = work_dir.join(CONCAT_LIST_NAME);
        write_concat_list(&list_path, &segment_names).await?;

        let cmd = FfmpegCommand::new(&list_path, output)
            .concat_list()
            .codec_copy();
        runner.run(&cmd).await
    }
    .await;

    let list_name = PathBuf::from(CONCAT_LIST_NAME);
    for name in segment_names.iter().chain(std::iter::once(&list_name)) {
        if let Err(e) = tokio::fs::remove_file(work_dir.join(name)).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(file = %name.display(), error = %e, "Failed to remove highlight intermediate");
            }
        }
    }

    result?;
    info!(
        clips = windows.len(),
        output = %output.display(),
        "Highlight reel rendered"
    );
    Ok(output.to_path_buf())
}
