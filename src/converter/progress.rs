//! Parsing of FFmpeg's `-progress` output and percentage tracking.

/// One block of `key=value` lines reported by `-progress`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    /// Frames written so far
    pub frame: u64,
    /// Output timestamp in seconds (if known)
    pub out_time_seconds: Option<f64>,
    /// Processing speed (e.g., "2.5x")
    pub speed: Option<String>,
    /// Whether FFmpeg reported `progress=end`
    pub finished: bool,
}

/// Incremental parser for the `-progress pipe:1` stream.
///
/// FFmpeg writes a block of `key=value` lines and terminates each block with
/// `progress=continue` or `progress=end`.
#[derive(Debug, Default)]
pub struct ProgressParser {
    pending: ProgressSnapshot,
}

impl ProgressParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns a snapshot when the line closes a block.
    pub fn feed_line(&mut self, line: &str) -> Option<ProgressSnapshot> {
        let (key, value) = line.trim().split_once('=')?;
        let value = value.trim();

        match key.trim() {
            "frame" => {
                if let Ok(frame) = value.parse() {
                    self.pending.frame = frame;
                }
            }
            // out_time_ms is in microseconds as well, despite its name.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    if us >= 0 {
                        self.pending.out_time_seconds = Some(us as f64 / 1_000_000.0);
                    }
                }
            }
            "out_time" => {
                if self.pending.out_time_seconds.is_none() {
                    self.pending.out_time_seconds = parse_timestamp(value);
                }
            }
            "speed" => {
                if value != "N/A" {
                    self.pending.speed = Some(value.to_string());
                }
            }
            "progress" => {
                let mut snapshot = std::mem::take(&mut self.pending);
                snapshot.finished = value == "end";
                return Some(snapshot);
            }
            _ => {}
        }
        None
    }
}

/// Parse an FFmpeg timestamp such as `00:01:02.500000` into seconds.
pub fn parse_timestamp(value: &str) -> Option<f64> {
    let mut parts = value.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || hours < 0.0 || minutes < 0.0 || seconds < 0.0 {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extract the input duration from an FFmpeg stderr line like
/// `  Duration: 00:00:10.00, start: 0.000000, bitrate: 1205 kb/s`.
pub fn parse_duration_line(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?.trim();
    parse_timestamp(value).filter(|d| *d > 0.0)
}

/// Turns snapshots into a percentage that never goes backwards.
#[derive(Debug, Clone, Default)]
pub struct ProgressTracker {
    duration_seconds: Option<f64>,
    percent: f32,
}

impl ProgressTracker {
    pub fn new(duration_seconds: Option<f64>) -> Self {
        Self {
            duration_seconds: duration_seconds.filter(|d| *d > 0.0),
            percent: 0.0,
        }
    }

    /// Current percentage (0.0 - 100.0).
    pub fn percent(&self) -> f32 {
        self.percent
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_seconds
    }

    /// Set the duration if none is known yet.
    pub fn offer_duration(&mut self, duration_seconds: Option<f64>) {
        if self.duration_seconds.is_none() {
            self.duration_seconds = duration_seconds.filter(|d| *d > 0.0);
        }
    }

    /// Apply a snapshot. Returns the new percentage if it increased.
    pub fn observe(&mut self, snapshot: &ProgressSnapshot) -> Option<f32> {
        let duration = self.duration_seconds?;
        let time = snapshot.out_time_seconds?;
        let percent = ((time / duration) * 100.0).clamp(0.0, 100.0) as f32;
        if percent > self.percent {
            self.percent = percent;
            Some(percent)
        } else {
            None
        }
    }
}
