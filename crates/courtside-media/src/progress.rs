//! Parsing of FFmpeg's `-progress pipe:2` key/value stream.

/// Snapshot emitted at every `progress=` line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed relative to realtime, 0 when unknown
    pub speed: f64,
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of `duration_secs` written so far, in `[0, 1]`.
    pub fn fraction_of(&self, duration_secs: f64) -> f64 {
        if duration_secs <= 0.0 {
            return 0.0;
        }
        (self.out_time_ms as f64 / 1000.0 / duration_secs).clamp(0.0, 1.0)
    }
}

/// Accumulates key/value lines into [`FfmpegProgress`] snapshots.
#[derive(Debug, Default)]
pub struct ProgressParser {
    current: FfmpegProgress,
}

impl ProgressParser {
    /// Feed one stderr line. Returns a snapshot when a block is complete, and
    /// `None` for other keys and for lines that are not `key=value`.
    pub fn feed(&mut self, line: &str) -> Option<FfmpegProgress> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();
        match key {
            "out_time_us" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            // Despite its name FFmpeg reports microseconds here too.
            "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.current.out_time_ms = us / 1000;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.current.frame = frame;
                }
            }
            "speed" => {
                self.current.speed = value
                    .strip_suffix('x')
                    .and_then(|s| s.trim().parse().ok())
                    .unwrap_or(0.0);
            }
            "progress" => {
                self.current.is_complete = value == "end";
                return Some(self.current.clone());
            }
            _ => {}
        }
        None
    }
}

/// Whether a stderr line belongs to the progress stream.
pub fn is_progress_line(line: &str) -> bool {
    line.split_once('=')
        .is_some_and(|(key, _)| !key.is_empty() && !key.contains(' '))
}
