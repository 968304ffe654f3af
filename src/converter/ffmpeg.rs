//! FFmpeg process wrapper: binary discovery, probing, spawning and cancellation.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};
use serde::Deserialize;

use super::error::{ConverterError, Result};
use super::progress::{parse_duration_line, ProgressParser, ProgressSnapshot};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 12;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Source metadata extracted with ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<f64>,
    pub video_codec: String,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Located FFmpeg (and optionally FFprobe) binaries.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg_path: PathBuf,
    ffprobe_path: Option<PathBuf>,
}

impl FfmpegTool {
    /// Use explicit binary paths.
    pub fn from_paths(ffmpeg_path: PathBuf, ffprobe_path: Option<PathBuf>) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
        }
    }

    /// Locate FFmpeg using the override (if any) or the process `PATH`.
    pub fn locate(override_path: Option<&Path>) -> Result<Self> {
        Self::locate_in(override_path, std::env::var_os("PATH"))
    }

    /// Locate FFmpeg using the override (if any) or the given search path.
    pub fn locate_in(override_path: Option<&Path>, search_path: Option<OsString>) -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        let ffmpeg_path = match override_path {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                log::error!("Configured FFmpeg path {:?} is not a file", path);
                return Err(ConverterError::ExternalToolMissing {
                    tool: path.display().to_string(),
                });
            }
            None => which::which_in("ffmpeg", search_path.as_ref(), &cwd).map_err(|e| {
                log::debug!("FFmpeg lookup failed: {}", e);
                ConverterError::ExternalToolMissing {
                    tool: "ffmpeg".to_string(),
                }
            })?,
        };

        let ffprobe_path = Self::sibling_ffprobe(&ffmpeg_path)
            .or_else(|| which::which_in("ffprobe", search_path.as_ref(), &cwd).ok());

        log::info!("Using FFmpeg at {:?}", ffmpeg_path);
        match &ffprobe_path {
            Some(path) => log::info!("Using FFprobe at {:?}", path),
            None => log::warn!("FFprobe not found; durations will come from FFmpeg output"),
        }

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    /// Find `ffprobe` in the same directory as `ffmpeg`.
    fn sibling_ffprobe(ffmpeg_path: &Path) -> Option<PathBuf> {
        let name = format!("ffprobe{}", std::env::consts::EXE_SUFFIX);
        let candidate = ffmpeg_path.parent()?.join(name);
        candidate.is_file().then_some(candidate)
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> Option<&Path> {
        self.ffprobe_path.as_deref()
    }

    /// Read source metadata using FFprobe.
    pub fn probe(&self, input: &Path) -> Option<MediaInfo> {
        let ffprobe = self.ffprobe_path.as_ref()?;

        let output = Command::new(ffprobe)
            .args([
                "-v", "error",
                "-print_format", "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(input)
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                log::warn!(
                    "FFprobe failed for {:?}: {}",
                    input,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                return None;
            }
            Err(e) => {
                log::warn!("Failed to run FFprobe: {}", e);
                return None;
            }
        };

        match parse_probe_json(&String::from_utf8_lossy(&output.stdout)) {
            Ok(info) => Some(info),
            Err(e) => {
                log::warn!("Unreadable FFprobe output for {:?}: {}", input, e);
                None
            }
        }
    }

    /// Full FFmpeg argument list for one conversion.
    pub fn command_args(input: &Path, output: &Path, preset_args: &[String]) -> Vec<OsString> {
        let mut args: Vec<OsString> = [
            "-hide_banner",
            "-nostats",
            "-y",
            "-progress",
            "pipe:1",
            "-i",
        ]
        .iter()
        .map(OsString::from)
        .collect();
        args.push(input.as_os_str().to_owned());
        args.extend(preset_args.iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());
        args
    }

    /// Start a conversion process.
    pub fn spawn(
        &self,
        input: &Path,
        output: &Path,
        preset_args: &[String],
    ) -> Result<TranscodeProcess> {
        let args = Self::command_args(input, output, preset_args);
        log::debug!("Executing {:?} {:?}", self.ffmpeg_path, args);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ConverterError::Spawn)?;

        match TranscodeProcess::attach(&mut child) {
            Ok((progress_rx, stderr_log, readers)) => Ok(TranscodeProcess {
                child,
                progress_rx,
                stderr_log,
                readers,
            }),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                Err(ConverterError::Spawn(e))
            }
        }
    }
}

fn parse_probe_json(json: &str) -> std::result::Result<MediaInfo, serde_json::Error> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let duration_seconds = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0);

    Ok(MediaInfo {
        width: video.and_then(|v| v.width).unwrap_or(0),
        height: video.and_then(|v| v.height).unwrap_or(0),
        duration_seconds,
        video_codec: video
            .and_then(|v| v.codec_name.clone())
            .unwrap_or_else(|| "unknown".to_string()),
    })
}

/// What the stderr reader has seen so far.
#[derive(Debug, Default)]
struct StderrLog {
    tail: VecDeque<String>,
    duration_seconds: Option<f64>,
}

impl StderrLog {
    fn record(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.duration_seconds.is_none() {
            self.duration_seconds = parse_duration_line(line);
        }
        if self.tail.len() == STDERR_TAIL_LINES {
            self.tail.pop_front();
        }
        self.tail.push_back(line.to_string());
    }
}

/// Handle for a running FFmpeg process.
///
/// Dropping the handle kills the process if it is still running.
pub struct TranscodeProcess {
    child: Child,
    progress_rx: Receiver<ProgressSnapshot>,
    stderr_log: Arc<Mutex<StderrLog>>,
    readers: Vec<JoinHandle<()>>,
}

type Attached = (
    Receiver<ProgressSnapshot>,
    Arc<Mutex<StderrLog>>,
    Vec<JoinHandle<()>>,
);

impl TranscodeProcess {
    /// Start reader threads for stdout (progress) and stderr (diagnostics).
    fn attach(child: &mut Child) -> std::io::Result<Attached> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("FFmpeg stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| std::io::Error::other("FFmpeg stderr was not captured"))?;

        let (progress_tx, progress_rx) = unbounded();
        let stdout_reader = thread::Builder::new()
            .name("ffmpeg-progress".to_string())
            .spawn(move || {
                let mut parser = ProgressParser::new();
                for line in BufReader::new(stdout).lines() {
                    let Ok(line) = line else { break };
                    if let Some(snapshot) = parser.feed_line(&line) {
                        if progress_tx.send(snapshot).is_err() {
                            break;
                        }
                    }
                }
            })?;

        let stderr_log = Arc::new(Mutex::new(StderrLog::default()));
        let log_clone = Arc::clone(&stderr_log);
        let stderr_reader = thread::Builder::new()
            .name("ffmpeg-stderr".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stderr);
                let mut buf = Vec::new();
                // FFmpeg output is not guaranteed to be UTF-8.
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf);
                            log::trace!(target: "ffmpeg", "{}", line.trim_end());
                            log_clone
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .record(&line);
                        }
                    }
                }
            })?;

        Ok((progress_rx, stderr_log, vec![stdout_reader, stderr_reader]))
    }

    /// OS process id.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Drain progress snapshots received since the last call (non-blocking).
    pub fn drain_progress(&self) -> Vec<ProgressSnapshot> {
        self.progress_rx.try_iter().collect()
    }

    /// Input duration as printed by FFmpeg on stderr (if seen yet).
    pub fn reported_duration(&self) -> Option<f64> {
        self.stderr_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .duration_seconds
    }

    /// Last lines of stderr, joined for display.
    pub fn stderr_tail(&self) -> String {
        let log = self.stderr_log.lock().unwrap_or_else(PoisonError::into_inner);
        log.tail.iter().cloned().collect::<Vec<_>>().join("\n")
    }

    /// Check whether the process has exited (non-blocking).
    pub fn try_wait(&mut self) -> std::io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    /// Wait for both reader threads to reach end of stream.
    pub fn join_readers(&mut self) {
        for reader in self.readers.drain(..) {
            let _ = reader.join();
        }
    }

    /// Turn an exit status into a result, with the stderr tail on failure.
    pub fn outcome(&mut self, status: ExitStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        self.join_readers();
        let stderr = self.stderr_tail();
        Err(ConverterError::ExternalProcess {
            status: status.to_string(),
            stderr: if stderr.is_empty() {
                "no error output".to_string()
            } else {
                stderr
            },
        })
    }

    /// Ask FFmpeg to quit, killing it once `grace` has elapsed.
    pub fn cancel(&mut self, grace: Duration) -> std::io::Result<ExitStatus> {
        // `q` on stdin makes FFmpeg finalize and exit.
        if let Some(mut stdin) = self.child.stdin.take() {
            let _ = stdin.write_all(b"q");
            let _ = stdin.flush();
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Some(status) = self.child.try_wait()? {
                return Ok(status);
            }
            thread::sleep(CANCEL_POLL_INTERVAL);
        }

        log::warn!("FFmpeg (pid {}) ignored quit request, killing it", self.child.id());
        let _ = self.child.kill();
        self.child.wait()
    }
}

impl Drop for TranscodeProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}
