//! Component lifecycle base.
//!
//! Every long-lived part of the system (sources, snapshot targets, filters
//! with their own thread) shares one lifecycle contract:
//!
//! - `start()` increments a user count; the 0 -> 1 transition spawns the
//!   worker thread and clears any stored error.
//! - `stop()` decrements it; the worker is joined only when the count hits
//!   zero *and* the component is on-demand.
//! - `restart()` replaces the worker thread unconditionally while keeping
//!   the user count intact (used by the watchdog).
//! - `pause()`/`unpause()` are advisory flow control: the worker blocks at
//!   its next check-point, in-flight work completes.
//! - `announce_stop()` forces on-demand + stop for process shutdown.
//!
//! A worker that returns without the stop flag set and without recording an
//! error gets a generic "thread terminated unexpectedly" error. That is the
//! only place unexpected thread death becomes observable state.
//!
//! Expected conditions (stopping an already-stopped component, pausing a
//! paused one) never panic or return errors; they log and return a bool
//! where relevant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::stats::StatsTracker;

/// How often blocked loops re-check their exit conditions.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a component is, for status reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComponentKind {
    Source,
    Filter,
    Target,
    View,
    MotionTrigger,
    HttpServer,
    Gui,
    Announcer,
    None,
}

/// Last recorded failure of a component.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorState {
    pub message: String,
    pub critical: bool,
}

// ----------------------------------------------------------------------------
// pause gate
// ----------------------------------------------------------------------------

/// Cooperative pause: `pause()` raises a flag, the worker blocks inside
/// `checkpoint()` until `unpause()`. The wait wakes periodically so a stop
/// request is honored even while paused.
struct PauseGate {
    paused: Mutex<bool>,
    cv: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    fn pause(&self) -> bool {
        let mut paused = lock_or_recover(&self.paused);
        if *paused {
            return false;
        }
        *paused = true;
        true
    }

    fn unpause(&self) {
        let mut paused = lock_or_recover(&self.paused);
        if *paused {
            *paused = false;
            self.cv.notify_all();
        }
    }

    fn is_paused(&self) -> bool {
        *lock_or_recover(&self.paused)
    }

    /// Block while paused. Returns as soon as the gate opens or `stop`
    /// flips; in-flight work before the check-point is never interrupted.
    fn checkpoint(&self, stop: &AtomicBool) {
        let mut paused = lock_or_recover(&self.paused);
        while *paused && !stop.load(Ordering::SeqCst) {
            let (g, _) = match self.cv.wait_timeout(paused, POLL_INTERVAL) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            paused = g;
        }
    }
}

// ----------------------------------------------------------------------------
// shared state + worker context
// ----------------------------------------------------------------------------

struct EventState {
    seq: u64,
    subject: String,
}

/// State shared between the component handle, its worker thread, and any
/// watchdog. Everything here is safe to touch from any thread.
struct Shared {
    id: String,
    descr: String,
    kind: ComponentKind,

    running: AtomicBool,
    stop: AtomicBool,
    on_demand: AtomicBool,
    pause: PauseGate,

    error: RwLock<Option<ErrorState>>,

    event: Mutex<EventState>,
    event_cv: Condvar,

    stats: Arc<StatsTracker>,
}

impl Shared {
    fn set_error(&self, message: &str, critical: bool) {
        log::error!("[{}] {}", self.id, message);
        let mut error = match self.error.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *error = Some(ErrorState {
            message: message.to_string(),
            critical,
        });
    }

    fn clear_error(&self) {
        let mut error = match self.error.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *error = None;
    }

    fn last_error(&self) -> Option<ErrorState> {
        match self.error.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Runs after the worker body returns. Converts an unexpected exit into
    /// a stored error.
    fn register_thread_end(&self) {
        log::info!("[{}] thread for \"{}\" terminating", self.id, self.descr);

        if !self.stop.load(Ordering::SeqCst) && self.last_error().is_none() {
            self.set_error("thread terminated unexpectedly", false);
        }
    }
}

/// Handed to the worker body. Carries everything the loop needs to behave:
/// the stop flag, the pause check-point, error recording and stats.
#[derive(Clone)]
pub struct WorkerContext {
    shared: Arc<Shared>,
}

impl WorkerContext {
    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// True once `stop()`/`restart()`/`announce_stop()` asked the worker to
    /// wind down. Loops test this at least every few hundred milliseconds.
    pub fn stopping(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// True while anyone holds a started reference.
    pub fn work_required(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    /// The cooperative pause point. Call at the top of every iteration.
    pub fn pause_checkpoint(&self) {
        self.shared.pause.checkpoint(&self.shared.stop);
    }

    pub fn set_error(&self, message: &str, critical: bool) {
        self.shared.set_error(message, critical);
    }

    pub fn clear_error(&self) {
        self.shared.clear_error();
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.shared.stats
    }

    /// Sleep in short slices, returning early when a stop is requested.
    pub fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep((deadline - now).min(POLL_INTERVAL));
        }
    }
}

// ----------------------------------------------------------------------------
// component
// ----------------------------------------------------------------------------

struct Lifecycle {
    handle: Option<JoinHandle<()>>,
    user_count: i32,
}

type Worker = Arc<dyn Fn(WorkerContext) + Send + Sync>;

/// The lifecycle base itself. Concrete components (Source, SnapshotTarget)
/// embed one and delegate the contract to it via [`Startable`].
pub struct Component {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
    worker: Worker,
}

impl Component {
    /// `worker` is the thread body; it is re-invoked on every (re)start.
    pub fn new<F>(id: &str, descr: &str, kind: ComponentKind, worker: F) -> Self
    where
        F: Fn(WorkerContext) + Send + Sync + 'static,
    {
        let stats = Arc::new(StatsTracker::new(&format!("st:{id}"), false));
        Self::with_stats(id, descr, kind, stats, worker)
    }

    /// Like [`Component::new`] with a caller-supplied tracker, for owners
    /// that record stats outside the worker thread too.
    pub fn with_stats<F>(
        id: &str,
        descr: &str,
        kind: ComponentKind,
        stats: Arc<StatsTracker>,
        worker: F,
    ) -> Self
    where
        F: Fn(WorkerContext) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                id: id.to_string(),
                descr: descr.to_string(),
                kind,
                running: AtomicBool::new(false),
                stop: AtomicBool::new(false),
                on_demand: AtomicBool::new(false),
                pause: PauseGate::new(),
                error: RwLock::new(None),
                event: Mutex::new(EventState {
                    seq: 0,
                    subject: String::new(),
                }),
                event_cv: Condvar::new(),
                stats,
            }),
            lifecycle: Mutex::new(Lifecycle {
                handle: None,
                user_count: 0,
            }),
            worker: Arc::new(worker),
        }
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn descr(&self) -> &str {
        &self.shared.descr
    }

    pub fn kind(&self) -> ComponentKind {
        self.shared.kind
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.shared.stats
    }

    // ------------------------------------------------------------------
    // lifecycle
    // ------------------------------------------------------------------

    /// Register a user. The first one spawns the worker thread.
    pub fn start(&self) {
        let mut lc = lock_or_recover(&self.lifecycle);

        log::debug!("[{}] start: user count was {}", self.id(), lc.user_count);

        if lc.user_count == 0 {
            self.shared.stop.store(false, Ordering::SeqCst);
            self.shared.clear_error();

            if lc.handle.is_none() {
                lc.handle = Some(self.spawn_worker());
                self.shared.running.store(true, Ordering::SeqCst);
            } else {
                // previous stop() left the thread alive (not on-demand)
                log::debug!("[{}] thread was already running", self.id());
            }
        }

        lc.user_count += 1;
    }

    /// Release a user. The last one tears the worker down, but only for
    /// on-demand components; always-on consumers keep running.
    pub fn stop(&self) {
        let mut lc = lock_or_recover(&self.lifecycle);

        log::debug!("[{}] stop: user count is now {}", self.id(), lc.user_count);

        if lc.handle.is_none() {
            log::info!(
                "[{}] \"{}\" was already stopped",
                self.id(),
                self.shared.descr
            );
            return;
        }

        lc.user_count -= 1;
        debug_assert!(lc.user_count >= 0, "component stopped more than started");
        if lc.user_count < 0 {
            log::warn!("[{}] stop called more often than start", self.id());
            lc.user_count = 0;
        }

        if lc.user_count == 0 && self.shared.on_demand.load(Ordering::SeqCst) {
            log::debug!("[{}] user count is 0; terminating thread", self.id());

            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.stop.store(true, Ordering::SeqCst);
            self.join_worker(&mut lc);
            self.shared.stats.reset_cpu_tracking();
        }
    }

    /// Replace the worker thread, keeping the user count. Ignores the
    /// on-demand policy; this is the watchdog's recovery path.
    pub fn restart(&self) {
        let mut lc = lock_or_recover(&self.lifecycle);

        if lc.handle.is_none() {
            log::debug!("[{}] restart: no thread running", self.id());
            debug_assert_eq!(lc.user_count, 0);
            return;
        }

        let old_user_count = lc.user_count;
        lc.user_count = 0;

        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.stop.store(true, Ordering::SeqCst);
        self.join_worker(&mut lc);
        self.shared.stats.reset_cpu_tracking();

        self.shared.stop.store(false, Ordering::SeqCst);
        self.shared.clear_error();

        lc.handle = Some(self.spawn_worker());
        self.shared.running.store(true, Ordering::SeqCst);

        lc.user_count = old_user_count;
    }

    /// Shutdown escape hatch: make the component stoppable regardless of its
    /// on-demand policy and request the stop. A following `stop()` joins.
    pub fn announce_stop(&self) {
        self.shared.on_demand.store(true, Ordering::SeqCst);
        self.shared.stop.store(true, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        lock_or_recover(&self.lifecycle).handle.is_some()
    }

    /// True once a stop has been requested and not yet superseded by a
    /// start. Blocking readers poll this to unblock during shutdown.
    pub fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// True while the component should actually produce work (started and
    /// not torn down).
    pub fn work_required(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn set_on_demand(&self, v: bool) {
        self.shared.on_demand.store(v, Ordering::SeqCst);
    }

    pub fn on_demand(&self) -> bool {
        self.shared.on_demand.load(Ordering::SeqCst)
    }

    pub fn user_count(&self) -> i32 {
        lock_or_recover(&self.lifecycle).user_count
    }

    // ------------------------------------------------------------------
    // pause
    // ------------------------------------------------------------------

    /// Ask the worker to hold at its next check-point. Returns false when
    /// already paused.
    pub fn pause(&self) -> bool {
        self.shared.pause.pause()
    }

    pub fn unpause(&self) {
        self.shared.pause.unpause()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.pause.is_paused()
    }

    // ------------------------------------------------------------------
    // errors
    // ------------------------------------------------------------------

    pub fn get_last_error(&self) -> Option<ErrorState> {
        self.shared.last_error()
    }

    pub fn set_error(&self, message: &str, critical: bool) {
        self.shared.set_error(message, critical);
    }

    pub fn clear_error(&self) {
        self.shared.clear_error();
    }

    // ------------------------------------------------------------------
    // events
    // ------------------------------------------------------------------

    /// One-shot advisory signal: bump the sequence, store the subject, wake
    /// everyone. Listeners that sleep through two notifications see only the
    /// last subject.
    pub fn notify_event(&self, subject: &str) {
        let mut ev = lock_or_recover(&self.shared.event);
        ev.seq += 1;
        ev.subject = subject.to_string();
        self.shared.event_cv.notify_all();
    }

    /// Sequence number of the most recent notification. Pass it to
    /// [`Component::wait_event`] to wait for the next one.
    pub fn event_seq(&self) -> u64 {
        lock_or_recover(&self.shared.event).seq
    }

    /// Wait until a notification newer than `seen` arrives or the timeout
    /// elapses. Returns the new sequence and its subject on success.
    pub fn wait_event(&self, seen: u64, timeout: Duration) -> Option<(u64, String)> {
        let deadline = Instant::now() + timeout;
        let mut ev = lock_or_recover(&self.shared.event);

        while ev.seq <= seen {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait = (deadline - now).min(POLL_INTERVAL);
            let (g, _) = match self.shared.event_cv.wait_timeout(ev, wait) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            ev = g;
            if self.shared.stop.load(Ordering::SeqCst) {
                return None;
            }
        }

        Some((ev.seq, ev.subject.clone()))
    }

    // ------------------------------------------------------------------
    // stats passthrough
    // ------------------------------------------------------------------

    pub fn get_cpu_usage(&self) -> f64 {
        self.shared.stats.get_cpu_usage()
    }

    pub fn get_fps(&self) -> Option<f64> {
        self.shared.stats.get_fps()
    }

    pub fn get_bw(&self) -> u64 {
        self.shared.stats.get_bw()
    }

    // ------------------------------------------------------------------

    fn spawn_worker(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let worker = Arc::clone(&self.worker);
        let name = self.shared.id.clone();

        let spawned = std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let ctx = WorkerContext {
                    shared: Arc::clone(&shared),
                };
                worker(ctx);
                shared.register_thread_end();
            });

        match spawned {
            Ok(handle) => handle,
            Err(e) => {
                // thread creation failing is resource exhaustion; treat like
                // allocation failure
                panic!("[{}] failed to spawn worker thread: {e}", self.shared.id);
            }
        }
    }

    fn join_worker(&self, lc: &mut MutexGuard<'_, Lifecycle>) {
        if let Some(handle) = lc.handle.take() {
            log::info!(
                "[{}] waiting for thread \"{}\" to stop",
                self.id(),
                self.shared.descr
            );
            if handle.join().is_err() {
                log::warn!("[{}] worker thread panicked", self.id());
            }
            log::info!("[{}] thread \"{}\" stopped", self.id(), self.shared.descr);
        } else {
            log::warn!("[{}] thread was not running during join", self.id());
        }
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        // make sure no worker outlives its component
        let mut lc = lock_or_recover(&self.lifecycle);
        if lc.handle.is_some() {
            self.shared.running.store(false, Ordering::SeqCst);
            self.shared.stop.store(true, Ordering::SeqCst);
            self.shared.pause.unpause();
            self.join_worker(&mut lc);
        }
    }
}

// ----------------------------------------------------------------------------
// capability traits
// ----------------------------------------------------------------------------

/// The lifecycle capability. Anything embedding a [`Component`] gets the
/// whole start/stop contract by pointing at it.
pub trait Startable {
    fn component(&self) -> &Component;

    fn start(&self) {
        self.component().start()
    }

    fn stop(&self) {
        self.component().stop()
    }

    fn restart(&self) {
        self.component().restart()
    }

    fn pause(&self) -> bool {
        self.component().pause()
    }

    fn unpause(&self) {
        self.component().unpause()
    }

    fn announce_stop(&self) {
        self.component().announce_stop()
    }

    fn is_running(&self) -> bool {
        self.component().is_running()
    }

    fn is_paused(&self) -> bool {
        self.component().is_paused()
    }

    fn get_last_error(&self) -> Option<ErrorState> {
        self.component().get_last_error()
    }
}

/// Produces frames for concurrent readers.
pub trait FrameProducer: Startable {
    /// Block until a frame newer than `after` exists or the producer's
    /// configured timeout elapses.
    fn acquire(&self, handle_failure: bool, after: u64) -> Option<crate::frame::Frame>;

    fn get_width(&self) -> Option<u32>;
    fn get_height(&self) -> Option<u32>;

    /// Timestamp of the most recently produced frame, 0 when none exists.
    fn get_current_ts(&self) -> u64;
}

/// Transforms one frame into another (resizing views, rotators). Kept
/// separate from [`crate::filter::Filter`], which works on raw pixel
/// buffers inside a chain.
pub trait FrameTransform {
    fn transform(&self, frame: &crate::frame::Frame) -> crate::frame::Frame;
}

fn lock_or_recover<'a, T>(m: &'a Mutex<T>) -> MutexGuard<'a, T> {
    match m.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ----------------------------------------------------------------------------
// tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    /// Component whose worker bumps a counter every few milliseconds.
    fn ticking_component(ticks: Arc<AtomicU64>) -> Component {
        Component::new("cam0", "test ticker", ComponentKind::Source, move |ctx| {
            while !ctx.stopping() {
                ctx.pause_checkpoint();
                if ctx.stopping() {
                    break;
                }
                ticks.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
            }
        })
    }

    fn wait_for<F: Fn() -> bool>(cond: F, max: Duration) -> bool {
        let deadline = Instant::now() + max;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        cond()
    }

    #[test]
    fn start_spawns_and_stop_joins_on_demand() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(Arc::clone(&ticks));
        c.set_on_demand(true);

        assert!(!c.is_running());
        c.start();
        assert!(c.is_running());
        assert!(wait_for(|| ticks.load(Ordering::SeqCst) > 0, Duration::from_secs(2)));

        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn refcount_keeps_worker_alive() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);
        c.set_on_demand(true);

        c.start();
        c.start();
        assert_eq!(c.user_count(), 2);

        c.stop();
        assert!(c.is_running(), "first stop must not kill the worker");

        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn non_on_demand_survives_last_stop() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);

        c.start();
        c.stop();
        assert!(c.is_running(), "always-on component must keep its thread");

        // shutdown path still works
        c.announce_stop();
        c.start(); // count 0 -> 1 again; thread already there
        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn start_after_announce_stop_clears_stop_flag() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(Arc::clone(&ticks));
        c.set_on_demand(true);

        c.start();
        c.announce_stop();
        c.stop();
        assert!(!c.is_running());

        c.start();
        assert!(c.is_running());
        let before = ticks.load(Ordering::SeqCst);
        assert!(wait_for(
            || ticks.load(Ordering::SeqCst) > before,
            Duration::from_secs(2)
        ));
        c.stop();
    }

    #[test]
    fn restart_preserves_user_count() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);
        c.set_on_demand(true);

        c.start();
        c.start();
        c.restart();
        assert_eq!(c.user_count(), 2);
        assert!(c.is_running());

        c.stop();
        assert!(c.is_running(), "restart must keep both references");
        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn restart_without_thread_is_a_noop() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);
        c.restart();
        assert!(!c.is_running());
    }

    #[test]
    fn pause_blocks_progress_not_existence() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(Arc::clone(&ticks));
        c.set_on_demand(true);
        c.start();

        assert!(wait_for(|| ticks.load(Ordering::SeqCst) > 0, Duration::from_secs(2)));
        assert!(c.pause());
        assert!(!c.pause(), "second pause reports already-paused");

        // let the in-flight iteration drain, then the counter must hold
        std::thread::sleep(Duration::from_millis(50));
        let frozen = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        assert!(ticks.load(Ordering::SeqCst) <= frozen + 1);
        assert!(c.is_running(), "paused worker stays alive");
        assert!(c.is_paused());

        c.unpause();
        assert!(wait_for(
            || ticks.load(Ordering::SeqCst) > frozen + 1,
            Duration::from_secs(2)
        ));

        c.stop();
    }

    #[test]
    fn stop_while_paused_terminates() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);
        c.set_on_demand(true);
        c.start();
        assert!(c.pause());

        // the checkpoint polls the stop flag, so this must not hang
        c.stop();
        assert!(!c.is_running());
    }

    #[test]
    fn unexpected_exit_records_error() {
        let c = Component::new("cam0", "early exit", ComponentKind::Source, |_ctx| {
            // return immediately without any stop request
        });
        c.set_on_demand(true);
        c.start();

        assert!(wait_for(
            || c.get_last_error().is_some(),
            Duration::from_secs(2)
        ));
        let err = c.get_last_error().expect("error state");
        assert_eq!(err.message, "thread terminated unexpectedly");
        assert!(!err.critical);

        c.stop();
    }

    #[test]
    fn clean_stop_records_no_error() {
        let c = Component::new("cam0", "clean", ComponentKind::Source, |ctx| {
            while !ctx.stopping() {
                std::thread::sleep(Duration::from_millis(5));
            }
        });
        c.set_on_demand(true);
        c.start();
        std::thread::sleep(Duration::from_millis(30));
        c.stop();
        assert!(c.get_last_error().is_none());
    }

    #[test]
    fn start_clears_previous_error() {
        let ticks = Arc::new(AtomicU64::new(0));
        let c = ticking_component(ticks);
        c.set_on_demand(true);

        c.set_error("stale failure", false);
        assert!(c.get_last_error().is_some());

        c.start();
        assert!(c.get_last_error().is_none());
        c.stop();
    }

    #[test]
    fn event_notification_is_last_write_wins() {
        let c = Component::new("trigger", "events", ComponentKind::MotionTrigger, |_| {});

        let seen = c.event_seq();
        c.notify_event("motion-a");
        c.notify_event("motion-b");

        let (seq, subject) = c.wait_event(seen, Duration::from_millis(100)).expect("event");
        assert_eq!(seq, seen + 2);
        assert_eq!(subject, "motion-b");

        // nothing newer
        assert!(c.wait_event(seq, Duration::from_millis(50)).is_none());
    }

    #[test]
    fn wait_event_wakes_on_notify() {
        let c = Arc::new(Component::new(
            "trigger",
            "events",
            ComponentKind::MotionTrigger,
            |_| {},
        ));
        let seen = c.event_seq();

        let waiter = {
            let c = Arc::clone(&c);
            std::thread::spawn(move || c.wait_event(seen, Duration::from_secs(5)))
        };

        std::thread::sleep(Duration::from_millis(30));
        c.notify_event("wake");

        let got = waiter.join().expect("join");
        assert_eq!(got.map(|(_, s)| s), Some("wake".to_string()));
    }

    #[test]
    fn drop_joins_running_worker() {
        let ticks = Arc::new(AtomicU64::new(0));
        {
            let c = ticking_component(Arc::clone(&ticks));
            c.start();
            assert!(wait_for(|| ticks.load(Ordering::SeqCst) > 0, Duration::from_secs(2)));
            // dropped while running and not on-demand
        }
        let after_drop = ticks.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }
}
