//! Job runner tests against a scripted stand-in for the FFmpeg binary.
//!
//! The script picks its behaviour from the input file name:
//! `*broken*` fails, `*slow*` runs for ten seconds, anything else succeeds.

#![cfg(unix)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tv_converter::converter::{
    lock_queue, ConverterError, FfmpegTool, FileQueue, JobId, JobRunner, JobStatus, RunnerEvent,
    RunnerOptions,
};

const FAKE_FFMPEG: &str = r#"#!/bin/sh
prev=""
input=""
for arg; do
    if [ "$prev" = "-i" ]; then input="$arg"; fi
    prev="$arg"
done
last="$arg"

echo "Input #0, mov,mp4,m4a,3gp,3g2,mj2, from '$input':" >&2
echo "  Duration: 00:00:10.00, start: 0.000000, bitrate: 1000 kb/s" >&2
: > "$last"

case "$input" in
*broken*)
    echo "out_time_us=1000000"
    echo "progress=continue"
    echo "[h264 @ 0x5581] Invalid NAL unit size" >&2
    echo "Conversion failed!" >&2
    exit 1
    ;;
*slow*)
    i=0
    while [ $i -lt 100 ]; do
        echo "out_time_us=$((i * 100000))"
        echo "speed=1.0x"
        echo "progress=continue"
        sleep 0.1
        i=$((i + 1))
    done
    echo "progress=end"
    exit 0
    ;;
esac

sleep 0.05
for t in 2 4 6 8 10; do
    echo "frame=$((t * 24))"
    echo "out_time_us=${t}000000"
    echo "speed=2.0x"
    echo "progress=continue"
    sleep 0.05
done
echo "progress=end"
printf 'converted' > "$last"
exit 0
"#;

const FAKE_FFPROBE: &str = r#"#!/bin/sh
sleep 0.3
cat <<'JSON'
{"streams": [{"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720}],
 "format": {"duration": "10.000000"}}
JSON
"#;

const BATCH_TIMEOUT: Duration = Duration::from_secs(20);

fn write_script(path: &Path, body: &str) {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o755)
        .open(path)
        .unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.sync_all().unwrap();
}

/// Directory holding the fake binaries, written once before any process is spawned.
///
/// `ffprobe` lives in a sub-directory so it is not found next to `ffmpeg`.
fn fake_ffmpeg() -> &'static Path {
    static DIR: OnceLock<TempDir> = OnceLock::new();
    let dir = DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        write_script(&dir.path().join("ffmpeg"), FAKE_FFMPEG);
        fs::create_dir(dir.path().join("probe")).unwrap();
        write_script(&dir.path().join("probe").join("ffprobe"), FAKE_FFPROBE);
        dir
    });
    dir.path()
}

struct Fixture {
    runner: JobRunner,
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self::with_ffprobe(false)
    }

    fn with_ffprobe(ffprobe: bool) -> Self {
        let bin = fake_ffmpeg();
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("in")).unwrap();

        let ffprobe = ffprobe.then(|| bin.join("probe").join("ffprobe"));
        let tool = FfmpegTool::from_paths(bin.join("ffmpeg"), ffprobe);
        let queue = FileQueue::new(dir.path().join("out")).into_shared();
        let options = RunnerOptions {
            cancel_grace: Duration::from_millis(100),
            poll_interval: Duration::from_millis(10),
        };
        let runner = JobRunner::new(tool, queue, options).unwrap();
        Self { runner, dir }
    }

    fn add(&self, name: &str) -> JobId {
        let path = self.dir.path().join("in").join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, b"not really a video").unwrap();
        lock_queue(self.runner.queue()).add(&path).unwrap()
    }

    fn status(&self, id: JobId) -> JobStatus {
        lock_queue(self.runner.queue()).get(id).unwrap().status.clone()
    }

    fn output(&self, id: JobId) -> PathBuf {
        lock_queue(self.runner.queue()).get(id).unwrap().output_path.clone()
    }

    /// Wait for the first event matching `pred`, returning everything received.
    fn wait_for(&mut self, pred: impl Fn(&RunnerEvent) -> bool) -> Vec<RunnerEvent> {
        let deadline = Instant::now() + BATCH_TIMEOUT;
        let mut events = Vec::new();
        while Instant::now() < deadline {
            if let Some(event) = self.runner.wait_event(Duration::from_millis(50)) {
                let found = pred(&event);
                events.push(event);
                if found {
                    return events;
                }
            }
        }
        panic!("timed out waiting for event, got {:?}", events);
    }

    fn wait_finished(&mut self) -> Vec<RunnerEvent> {
        self.wait_for(|e| *e == RunnerEvent::BatchFinished)
    }
}

fn progress_of(events: &[RunnerEvent], id: JobId) -> Vec<f32> {
    events
        .iter()
        .filter_map(|e| match e {
            RunnerEvent::Progress(item, percent) if *item == id => Some(*percent),
            _ => None,
        })
        .collect()
}

#[test]
fn converts_pending_item() {
    let mut fx = Fixture::new();
    let id = fx.add("clip.mp4");

    fx.runner.start_batch();
    let events = fx.wait_finished();

    assert_eq!(events.first(), Some(&RunnerEvent::BatchStarted));
    assert!(events.contains(&RunnerEvent::ItemStarted(id)));
    assert!(events.contains(&RunnerEvent::ItemDone(id, "converted".len() as u64)));
    assert!(!fx.runner.is_running());

    assert!(matches!(fx.status(id), JobStatus::Done { output_size: 9, .. }));
    let item = lock_queue(fx.runner.queue()).get(id).unwrap().clone();
    assert_eq!(item.progress_percent, 100.0);

    let output = fx.output(id);
    assert_eq!(output, fx.dir.path().join("out").join("clip_h264.mp4"));
    assert_eq!(fs::read_to_string(output).unwrap(), "converted");
}

#[test]
fn progress_never_goes_backwards() {
    let mut fx = Fixture::new();
    let id = fx.add("clip.mkv");

    fx.runner.start_batch();
    let events = fx.wait_finished();

    let progress = progress_of(&events, id);
    assert!(!progress.is_empty());
    assert!(progress.windows(2).all(|w| w[0] < w[1]), "{:?}", progress);
    assert!(progress.iter().all(|p| (0.0..=100.0).contains(p)));
}

#[test]
fn failure_is_reported_and_batch_continues() {
    let mut fx = Fixture::new();
    let bad = fx.add("broken.mp4");
    let good = fx.add("good.mp4");

    fx.runner.start_batch();
    let events = fx.wait_finished();

    let message = events
        .iter()
        .find_map(|e| match e {
            RunnerEvent::ItemFailed(id, message) if *id == bad => Some(message.clone()),
            _ => None,
        })
        .unwrap();
    assert!(message.contains("Conversion failed!"), "{}", message);

    match fx.status(bad) {
        JobStatus::Failed { error } => assert!(error.contains("Invalid NAL unit size")),
        other => panic!("unexpected status {:?}", other),
    }
    assert!(!fx.output(bad).exists());

    assert!(matches!(fx.status(good), JobStatus::Done { .. }));
}

#[test]
fn cancel_running_item() {
    let mut fx = Fixture::new();
    let id = fx.add("slow.mp4");
    let next = fx.add("after.mp4");

    fx.runner.start_batch();
    fx.wait_for(|e| matches!(e, RunnerEvent::Progress(item, _) if *item == id));
    assert!(fx.status(id).is_running());

    fx.runner.cancel(id).unwrap();
    let events = fx.wait_finished();

    let cancelled_at = events
        .iter()
        .position(|e| *e == RunnerEvent::ItemCancelled(id))
        .unwrap();
    assert!(progress_of(&events[cancelled_at..], id).is_empty());
    assert_eq!(fx.status(id), JobStatus::Cancelled);
    assert!(!fx.output(id).exists());

    // Cancelling one item does not stop the batch.
    assert!(matches!(fx.status(next), JobStatus::Done { .. }));
}

#[test]
fn stop_halts_batch() {
    let mut fx = Fixture::new();
    let slow = fx.add("slow.avi");
    let next = fx.add("next.mp4");

    fx.runner.start_batch();
    fx.wait_for(|e| *e == RunnerEvent::ItemStarted(slow));
    fx.runner.stop();
    let events = fx.wait_finished();

    assert!(events.contains(&RunnerEvent::ItemCancelled(slow)));
    assert!(!events.contains(&RunnerEvent::ItemStarted(next)));
    assert_eq!(fx.status(slow), JobStatus::Cancelled);
    assert_eq!(fx.status(next), JobStatus::Pending);
    assert!(!fx.runner.is_running());
}

#[test]
fn cancel_pending_item_skips_it() {
    let mut fx = Fixture::new();
    let skipped = fx.add("skipped.mp4");
    let kept = fx.add("kept.mp4");

    fx.runner.cancel(skipped).unwrap();
    assert_eq!(fx.status(skipped), JobStatus::Cancelled);

    fx.runner.start_batch();
    let events = fx.wait_finished();

    assert!(!events.contains(&RunnerEvent::ItemStarted(skipped)));
    assert!(matches!(fx.status(kept), JobStatus::Done { .. }));
}

#[test]
fn start_single_item() {
    let mut fx = Fixture::new();
    let first = fx.add("first.mp4");
    let second = fx.add("second.mp4");

    fx.runner.start(second);
    let events = fx.wait_finished();

    assert!(events.contains(&RunnerEvent::ItemStarted(second)));
    assert!(!events.contains(&RunnerEvent::ItemStarted(first)));
    assert_eq!(fx.status(first), JobStatus::Pending);
    assert!(matches!(fx.status(second), JobStatus::Done { .. }));
}

#[test]
fn running_item_cannot_be_removed() {
    let mut fx = Fixture::new();
    let id = fx.add("slow.mov");

    fx.runner.start_batch();
    fx.wait_for(|e| *e == RunnerEvent::ItemStarted(id));

    let err = lock_queue(fx.runner.queue()).remove(id).unwrap_err();
    assert!(matches!(err, ConverterError::ItemBusy(busy) if busy == id));

    fx.runner.stop();
    fx.wait_finished();
    assert!(lock_queue(fx.runner.queue()).remove(id).is_ok());
}

#[test]
fn cancel_unknown_item() {
    let mut fx = Fixture::new();
    let id = fx.add("clip.mp4");
    lock_queue(fx.runner.queue()).remove(id).unwrap();

    let err = fx.runner.cancel(id).unwrap_err();
    assert!(matches!(err, ConverterError::UnknownItem(_)));
}

#[test]
fn missing_ffmpeg_is_reported() {
    let empty = tempfile::tempdir().unwrap();
    let err = FfmpegTool::locate_in(None, Some(empty.path().as_os_str().to_owned())).unwrap_err();
    assert!(matches!(err, ConverterError::ExternalToolMissing { .. }));
    assert!(err.is_fatal());
}

#[test]
fn ffmpeg_found_on_search_path() {
    let tool = FfmpegTool::locate_in(None, Some(fake_ffmpeg().as_os_str().to_owned())).unwrap();
    assert_eq!(tool.ffmpeg_path(), fake_ffmpeg().join("ffmpeg"));
    assert!(tool.ffprobe_path().is_none());
}

#[test]
fn same_named_sources_do_not_share_output() {
    let mut fx = Fixture::new();
    let good = fx.add("good/ep1.mp4");
    let bad = fx.add("broken/ep1.mp4");
    assert_ne!(fx.output(good), fx.output(bad));

    fx.runner.start(good);
    fx.wait_finished();
    assert!(matches!(fx.status(good), JobStatus::Done { .. }));

    fx.runner.start(bad);
    fx.wait_finished();
    assert!(matches!(fx.status(bad), JobStatus::Failed { .. }));

    // The failed item's cleanup leaves the finished output alone.
    assert_eq!(fs::read_to_string(fx.output(good)).unwrap(), "converted");
}

#[test]
fn media_info_arrives_in_background() {
    let fx = Fixture::with_ffprobe(true);
    let ids = vec![fx.add("a.mp4"), fx.add("b.mkv")];

    let started = Instant::now();
    fx.runner.probe_media(ids.clone());
    assert!(started.elapsed() < Duration::from_millis(250));
    assert!(fx.runner.is_probing());

    let deadline = Instant::now() + BATCH_TIMEOUT;
    while fx.runner.is_probing() {
        assert!(Instant::now() < deadline, "media info did not arrive");
        thread::sleep(Duration::from_millis(10));
    }

    for id in ids {
        let info = lock_queue(fx.runner.queue())
            .get(id)
            .and_then(|item| item.media_info.clone())
            .unwrap();
        assert_eq!((info.width, info.height), (1280, 720));
        assert_eq!(info.duration_seconds, Some(10.0));
    }
}

#[test]
fn media_info_needs_ffprobe() {
    let fx = Fixture::new();
    let id = fx.add("clip.mp4");
    fx.runner.probe_media(vec![id]);
    assert!(!fx.runner.is_probing());
    assert!(lock_queue(fx.runner.queue()).get(id).unwrap().media_info.is_none());
}
