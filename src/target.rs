//! Disk-writing frame consumers.
//!
//! A [`SnapshotTarget`] holds a started reference on one source and writes
//! a timestamped JPEG to a directory at a fixed interval. It is a plain
//! component: always-on by default (a transient viewer disconnecting must
//! not stop a recording), stoppable through `announce_stop` at shutdown,
//! restartable by an operator like any other component.
//!
//! The target acquires with failure handling enabled, so a source that goes
//! dark leaves its failure cards on disk: the gap in coverage is itself
//! recorded.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::component::{Component, ComponentKind, Startable, WorkerContext};
use crate::frame::{Encoding, Frame};
use crate::source::Source;

pub struct SnapshotTarget {
    comp: Component,
    dir: PathBuf,
    interval: Duration,
    written: Arc<AtomicU64>,
}

impl SnapshotTarget {
    pub fn new(
        id: &str,
        descr: &str,
        source: Arc<Source>,
        dir: PathBuf,
        interval: Duration,
    ) -> Result<Arc<SnapshotTarget>> {
        if id.is_empty() {
            bail!("target id must not be empty");
        }
        if interval.is_zero() {
            bail!("target {id}: interval must be greater than zero");
        }
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("target {id}: cannot create {}", dir.display()))?;

        let written = Arc::new(AtomicU64::new(0));

        let worker = {
            let id = id.to_string();
            let dir = dir.clone();
            let written = Arc::clone(&written);
            move |ctx: WorkerContext| {
                snapshot_loop(ctx, &id, &source, &dir, interval, &written);
            }
        };

        let comp = Component::new(id, descr, ComponentKind::Target, worker);

        Ok(Arc::new(SnapshotTarget {
            comp,
            dir,
            interval,
            written,
        }))
    }

    pub fn id(&self) -> &str {
        self.comp.id()
    }

    pub fn descr(&self) -> &str {
        self.comp.descr()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Snapshots written since the target was created. Survives restarts.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

impl Startable for SnapshotTarget {
    fn component(&self) -> &Component {
        &self.comp
    }
}

/// The worker body: run the source up for the lifetime of this thread, then
/// grab and store one frame per interval.
fn snapshot_loop(
    ctx: WorkerContext,
    id: &str,
    source: &Arc<Source>,
    dir: &Path,
    interval: Duration,
    written: &AtomicU64,
) {
    log::info!(
        "[{id}] snapshotting [{}] into {} every {interval:?}",
        source.id(),
        dir.display()
    );
    source.start();

    let mut last_ts = 0u64;
    while !ctx.stopping() {
        ctx.pause_checkpoint();
        if ctx.stopping() {
            break;
        }
        let started = Instant::now();

        if let Some(frame) = source.acquire(true, last_ts) {
            // failure cards carry ts 0; the watermark only moves on live
            // frames so the next wait still asks for something fresher
            if frame.ts() > last_ts {
                last_ts = frame.ts();
            }
            write_snapshot(&ctx, id, dir, &frame, written);
        } else {
            log::debug!("[{id}] no frame from [{}] this interval", source.id());
        }

        ctx.stats().track_cpu_usage();
        ctx.sleep(interval.saturating_sub(started.elapsed()));
    }

    source.stop();
}

fn write_snapshot(ctx: &WorkerContext, id: &str, dir: &Path, frame: &Frame, written: &AtomicU64) {
    // transcode once and shed the raw planes before the disk write
    frame.keep_only(Encoding::Jpeg);
    let jpeg = frame.data(Encoding::Jpeg);
    if jpeg.is_empty() {
        ctx.set_error("jpeg encoding produced no data", false);
        return;
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    let path = dir.join(format!("{id}-{stamp}.jpg"));

    match std::fs::write(&path, &jpeg) {
        Ok(()) => {
            written.fetch_add(1, Ordering::Relaxed);
            ctx.stats().track_fps();
            ctx.stats().track_bw(jpeg.len());
            ctx.clear_error();
            log::debug!("[{id}] wrote {} ({} bytes)", path.display(), jpeg.len());
        }
        Err(e) => {
            ctx.set_error(&format!("cannot write {}: {e}", path.display()), false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceSettings;

    fn pushed(id: &str, timeout: Duration) -> Arc<Source> {
        Source::new(SourceSettings {
            id: id.to_string(),
            descr: format!("{id} under test"),
            timeout,
            ..SourceSettings::default()
        })
        .expect("source")
    }

    fn jpegs_in(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|x| x == "jpg"))
            .collect();
        files.sort();
        files
    }

    fn wait_for<F: Fn() -> bool>(cond: F, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn rejects_bad_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = pushed("cam0", Duration::from_millis(100));

        assert!(SnapshotTarget::new(
            "",
            "",
            Arc::clone(&s),
            dir.path().to_path_buf(),
            Duration::from_secs(1)
        )
        .is_err());

        assert!(SnapshotTarget::new(
            "snap",
            "",
            Arc::clone(&s),
            dir.path().to_path_buf(),
            Duration::ZERO
        )
        .is_err());
    }

    #[test]
    fn creates_the_snapshot_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a/b");
        let s = pushed("cam0", Duration::from_millis(100));

        let t = SnapshotTarget::new("snap", "", s, nested.clone(), Duration::from_secs(1))
            .expect("target");
        assert!(nested.is_dir());
        assert_eq!(t.written(), 0);
    }

    #[test]
    fn writes_published_frames_as_jpeg() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = pushed("cam0", Duration::from_millis(100));
        s.set_size(8, 4);
        s.publish(1000, Encoding::Rgb24, vec![40; 8 * 4 * 3]);

        let t = SnapshotTarget::new(
            "snap",
            "test snapshots",
            Arc::clone(&s),
            dir.path().to_path_buf(),
            Duration::from_millis(30),
        )
        .expect("target");

        t.start();
        assert!(t.is_running());
        assert!(wait_for(|| t.written() >= 1, Duration::from_secs(2)));
        t.announce_stop();
        t.stop();
        assert!(!t.is_running());

        let files = jpegs_in(dir.path());
        assert!(!files.is_empty());
        let bytes = std::fs::read(&files[0]).expect("snapshot bytes");
        assert_eq!(&bytes[0..2], &[0xff, 0xd8], "jpeg magic");
        assert!(t.get_last_error().is_none());
    }

    #[test]
    fn holds_a_user_on_its_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let s = Source::new(SourceSettings {
            id: "cam0".to_string(),
            timeout: Duration::from_millis(50),
            on_demand: true,
            ..SourceSettings::default()
        })
        .expect("source");

        let t = SnapshotTarget::new(
            "snap",
            "",
            Arc::clone(&s),
            dir.path().to_path_buf(),
            Duration::from_millis(50),
        )
        .expect("target");

        t.start();
        assert!(wait_for(|| s.is_running(), Duration::from_secs(2)));

        t.announce_stop();
        t.stop();
        assert!(
            wait_for(|| !s.is_running(), Duration::from_secs(2)),
            "on-demand source released when its only user goes away"
        );
    }

    #[test]
    fn stalled_source_leaves_failure_cards() {
        let dir = tempfile::tempdir().expect("tempdir");
        // a pushed source that never publishes; short timeout keeps the
        // test quick
        let s = pushed("cam0", Duration::from_millis(40));
        s.set_size(32, 16);

        let t = SnapshotTarget::new(
            "snap",
            "",
            s,
            dir.path().to_path_buf(),
            Duration::from_millis(20),
        )
        .expect("target");

        t.start();
        assert!(wait_for(|| t.written() >= 1, Duration::from_secs(3)));
        t.announce_stop();
        t.stop();

        assert!(!jpegs_in(dir.path()).is_empty());
    }
}
