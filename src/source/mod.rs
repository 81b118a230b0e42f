//! Frame sources.
//!
//! A [`Source`] is a Component that produces a continuous stream of frames
//! and delivers them to any number of concurrent readers:
//! - a capture backend (or external code, for pushed sources) publishes
//!   frames into a single conflation slot: the newest frame always
//!   replaces the previous one, nothing queues,
//! - readers block in [`Source::acquire`] until a frame newer than their
//!   watermark appears or a timeout elapses,
//! - each delivered frame is a private copy, run through the source's
//!   filter chain and pixel controls when configured,
//! - on timeout the reader can receive a synthesized failure frame
//!   instead of nothing, so downstream viewers always have something to
//!   show,
//! - an optional watchdog restarts the worker when publishing stalls, and
//!   an optional exec hook notifies an external command on repeated
//!   acquisition failures.
//!
//! Capture backends:
//! - synthetic moving test pattern (always built)
//! - pushed, fed through [`Source::publish`] (always built)
//! - HTTP still/MJPEG polling (feature: source-http)
//! - V4L2 devices (feature: source-v4l2)
//! - RTSP via GStreamer (feature: source-rtsp)

#[cfg(feature = "source-http")]
pub mod http;
#[cfg(feature = "source-rtsp")]
pub mod rtsp;
pub mod synthetic;
#[cfg(feature = "source-v4l2")]
pub mod v4l2;

use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Local;

use crate::color::hls_to_rgb;
use crate::component::{Component, ComponentKind, FrameProducer, Startable};
use crate::controls::Controls;
use crate::draw::{self, Rgb};
use crate::filter::{apply_filters, AddText, Filter, TextPosition};
use crate::frame::{Encoding, Frame};
use crate::now_us;
use crate::pixel::rgb_len;
use crate::scale;
use crate::stats::StatsTracker;

/// Failure frames fall back to these dimensions when the source never
/// learned its own.
const DEFAULT_DIMS: (u32, u32) = (640, 480);

/// Blocked waits re-check stop/deadline at least this often.
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Watchdog poll cadence; slightly off 100 ms so it interleaves with the
/// worker loops it observes.
const WATCHDOG_POLL: Duration = Duration::from_millis(101);

// ----------------------------------------------------------------------------
// settings
// ----------------------------------------------------------------------------

/// What to hand a reader when acquisition times out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureMode {
    /// Return nothing; the reader deals with it.
    Nothing,
    /// Full test card with the message text.
    Message,
    /// Just the message text on a black field.
    Simple,
}

impl std::str::FromStr for FailureMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "nothing" => FailureMode::Nothing,
            "message" => FailureMode::Message,
            "simple" => FailureMode::Simple,
            other => bail!("unknown failure mode {other:?}"),
        })
    }
}

#[derive(Clone, Debug)]
pub struct FailurePolicy {
    pub mode: FailureMode,
    pub message: String,
    /// Where the `Simple` card places its text.
    pub position: TextPosition,
    /// Pre-rendered card; takes precedence over the drawn ones.
    pub bitmap: Option<PathBuf>,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            mode: FailureMode::Message,
            message: "no signal".to_string(),
            position: TextPosition::Center,
            bitmap: None,
        }
    }
}

/// External command fired on repeated acquisition failures.
#[derive(Clone, Debug)]
pub struct FailureHook {
    pub command: String,
    pub cooldown: Duration,
}

/// Capture backend selector.
#[derive(Clone, Debug)]
pub enum SourceKind {
    /// Generated moving test pattern.
    Synthetic,
    /// No acquisition loop of its own; frames arrive via
    /// [`Source::publish`].
    Pushed,
    /// Polls a JPEG URL, or follows it as an MJPEG stream.
    #[cfg(feature = "source-http")]
    Http { url: String },
    /// Memory-mapped V4L2 capture.
    #[cfg(feature = "source-v4l2")]
    V4l2 { device: String },
    /// GStreamer RTSP pipeline.
    #[cfg(feature = "source-rtsp")]
    Rtsp { url: String },
}

pub struct SourceSettings {
    pub id: String,
    pub descr: String,
    pub kind: SourceKind,
    /// Expected dimensions; backends that can learn them leave these unset.
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Acquisition pacing; zero or negative means unthrottled.
    pub max_fps: f64,
    /// Default wait budget for [`Source::acquire`].
    pub timeout: Duration,
    /// When set, published frames are scaled to this size first.
    pub resize: Option<(u32, u32)>,
    pub keep_aspect: bool,
    pub jpeg_quality: u8,
    pub failure: FailurePolicy,
    pub filters: Vec<Box<dyn Filter>>,
    pub controls: Option<Arc<dyn Controls>>,
    pub on_demand: bool,
    pub exec_failure: Option<FailureHook>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            id: String::new(),
            descr: String::new(),
            kind: SourceKind::Pushed,
            width: None,
            height: None,
            max_fps: -1.0,
            timeout: Duration::from_secs(1),
            resize: None,
            keep_aspect: false,
            jpeg_quality: 85,
            failure: FailurePolicy::default(),
            filters: Vec::new(),
            controls: None,
            on_demand: false,
            exec_failure: None,
        }
    }
}

// ----------------------------------------------------------------------------
// shared internals
// ----------------------------------------------------------------------------

struct Slot {
    frame: Option<Arc<Frame>>,
    dims: Option<(u32, u32)>,
}

struct FailureBitmap {
    rgb: Vec<u8>,
    w: u32,
    h: u32,
}

struct HookState {
    last_fired: Option<Instant>,
    child: Option<Child>,
}

/// State shared between the source handle and its capture worker. The
/// worker closure owns an `Arc` of this, so a watchdog restart hands the
/// replacement thread the same slot.
pub(crate) struct SourceInner {
    id: String,
    slot: Mutex<Slot>,
    cond: Condvar,
    default_timeout: Duration,
    jpeg_quality: u8,
    resize: Option<(u32, u32)>,
    keep_aspect: bool,
    filters: Vec<Box<dyn Filter>>,
    controls: Option<Arc<dyn Controls>>,
    failure: FailurePolicy,
    failure_bitmap: Option<FailureBitmap>,
    hook: Option<FailureHook>,
    hook_state: Mutex<HookState>,
    /// Previous delivered pixels for temporal filters, one baton per
    /// source.
    prev: Mutex<Option<Vec<u8>>>,
    stats: Arc<StatsTracker>,
}

impl SourceInner {
    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        lock_or_recover(&self.slot)
    }

    pub(crate) fn dimensions(&self) -> Option<(u32, u32)> {
        self.lock_slot().dims
    }

    pub(crate) fn resize_configured(&self) -> bool {
        self.resize.is_some()
    }

    /// Record the frame dimensions once a backend has learned them.
    /// Nonsense dimensions are refused, publishing will then drop frames.
    pub(crate) fn set_size(&self, w: u32, h: u32) {
        if rgb_len(w, h).is_err() {
            log::warn!("[{}] refusing frame size {}x{}", self.id, w, h);
            return;
        }
        let mut slot = self.lock_slot();
        if slot.dims != Some((w, h)) {
            log::info!("[{}] frame size is now {}x{}", self.id, w, h);
            slot.dims = Some((w, h));
        }
    }

    /// Replace the conflation slot with a new frame and wake every waiting
    /// reader. Frames published before the dimensions are known are
    /// dropped.
    pub(crate) fn publish(&self, ts: u64, encoding: Encoding, data: Vec<u8>) {
        let mut slot = self.lock_slot();
        let Some((w, h)) = slot.dims else {
            log::warn!("[{}] dropping {} frame, dimensions unknown", self.id, encoding);
            return;
        };

        slot.frame = Some(Arc::new(Frame::new(ts, w, h, self.jpeg_quality, encoding, data)));
        self.cond.notify_all();
        drop(slot);

        self.stats.track_fps();
    }

    /// Publish an RGB24 buffer, scaling it to the configured target size
    /// first when one is set.
    pub(crate) fn publish_scaled(&self, ts: u64, src_w: u32, src_h: u32, rgb: Vec<u8>) {
        match self.resize {
            Some((tw, th)) if (tw, th) != (src_w, src_h) => {
                let scaled = if self.keep_aspect {
                    scale::resize_rgb_keep_aspect(&rgb, src_w, src_h, tw, th)
                } else {
                    scale::resize_rgb(&rgb, src_w, src_h, tw, th)
                };
                match scaled {
                    Ok(data) => {
                        self.set_size(tw, th);
                        self.publish(ts, Encoding::Rgb24, data);
                    }
                    Err(e) => log::warn!("[{}] dropping frame: {e:#}", self.id),
                }
            }
            _ => {
                self.set_size(src_w, src_h);
                self.publish(ts, Encoding::Rgb24, rgb);
            }
        }
    }

    pub(crate) fn current_ts(&self) -> u64 {
        self.lock_slot().frame.as_ref().map(|f| f.ts()).unwrap_or(0)
    }

    /// Run the configured failure command, at most once per cool-down and
    /// never while a previous invocation is still running.
    fn fire_exec_failure(&self) {
        let Some(hook) = &self.hook else { return };
        let mut st = lock_or_recover(&self.hook_state);

        if let Some(child) = st.child.as_mut() {
            match child.try_wait() {
                Ok(Some(_)) => st.child = None,
                Ok(None) => return,
                Err(e) => {
                    log::warn!("[{}] failure command state unknown: {e}", self.id);
                    st.child = None;
                }
            }
        }

        if st.last_fired.is_some_and(|t| t.elapsed() < hook.cooldown) {
            return;
        }
        st.last_fired = Some(Instant::now());

        let cmdline = format!("{} {}", hook.command, self.id);
        match Command::new("/bin/sh").arg("-c").arg(&cmdline).spawn() {
            Ok(child) => {
                log::info!("[{}] started failure command {:?}", self.id, cmdline);
                st.child = Some(child);
            }
            Err(e) => log::error!("[{}] cannot run failure command {:?}: {e}", self.id, cmdline),
        }
    }
}

impl Drop for SourceInner {
    fn drop(&mut self) {
        if let Some(mut child) = lock_or_recover(&self.hook_state).child.take() {
            let _ = child.try_wait();
        }
    }
}

// ----------------------------------------------------------------------------
// the source itself
// ----------------------------------------------------------------------------

struct Watchdog {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

pub struct Source {
    comp: Component,
    inner: Arc<SourceInner>,
    watchdog: Mutex<Option<Watchdog>>,
}

impl Source {
    pub fn new(settings: SourceSettings) -> Result<Arc<Source>> {
        let SourceSettings {
            id,
            descr,
            kind,
            width,
            height,
            max_fps,
            timeout,
            resize,
            keep_aspect,
            jpeg_quality,
            failure,
            filters,
            controls,
            on_demand,
            exec_failure,
        } = settings;

        if id.is_empty() {
            bail!("source id must not be empty");
        }
        if !(1..=100).contains(&jpeg_quality) {
            bail!("jpeg quality {jpeg_quality} outside 1..=100");
        }
        if let (Some(w), Some(h)) = (width, height) {
            rgb_len(w, h).with_context(|| format!("source {id}"))?;
        }
        if let Some((tw, th)) = resize {
            rgb_len(tw, th).with_context(|| format!("source {id} resize target"))?;
        }

        let failure_bitmap = match &failure.bitmap {
            Some(path) => Some(load_failure_bitmap(path)?),
            None => None,
        };

        let stats = Arc::new(StatsTracker::new(&id, false));
        let inner = Arc::new(SourceInner {
            id: id.clone(),
            slot: Mutex::new(Slot {
                frame: None,
                dims: width.zip(height),
            }),
            cond: Condvar::new(),
            default_timeout: timeout,
            jpeg_quality,
            resize,
            keep_aspect,
            filters,
            controls,
            failure,
            failure_bitmap,
            hook: exec_failure,
            hook_state: Mutex::new(HookState {
                last_fired: None,
                child: None,
            }),
            prev: Mutex::new(None),
            stats: Arc::clone(&stats),
        });

        let interval_us = if max_fps > 0.0 {
            Some((1_000_000.0 / max_fps) as u64)
        } else {
            None
        };

        let worker: Box<dyn Fn(crate::component::WorkerContext) + Send + Sync> = match kind {
            SourceKind::Synthetic => {
                let inner = Arc::clone(&inner);
                Box::new(move |ctx| synthetic::run(ctx, Arc::clone(&inner), interval_us))
            }
            SourceKind::Pushed => Box::new(idle_worker),
            #[cfg(feature = "source-http")]
            SourceKind::Http { url } => {
                url::Url::parse(&url).with_context(|| format!("source {id}: bad url {url:?}"))?;
                let inner = Arc::clone(&inner);
                Box::new(move |ctx| http::run(ctx, Arc::clone(&inner), url.clone(), interval_us))
            }
            #[cfg(feature = "source-v4l2")]
            SourceKind::V4l2 { device } => {
                let inner = Arc::clone(&inner);
                Box::new(move |ctx| v4l2::run(ctx, Arc::clone(&inner), device.clone()))
            }
            #[cfg(feature = "source-rtsp")]
            SourceKind::Rtsp { url } => {
                let inner = Arc::clone(&inner);
                Box::new(move |ctx| rtsp::run(ctx, Arc::clone(&inner), url.clone()))
            }
        };

        let comp = Component::with_stats(&id, &descr, ComponentKind::Source, stats, move |ctx| {
            worker(ctx)
        });
        comp.set_on_demand(on_demand);

        Ok(Arc::new(Source {
            comp,
            inner,
            watchdog: Mutex::new(None),
        }))
    }

    pub fn id(&self) -> &str {
        self.comp.id()
    }

    pub fn descr(&self) -> &str {
        self.comp.descr()
    }

    pub fn controls(&self) -> Option<Arc<dyn Controls>> {
        self.inner.controls.clone()
    }

    // ------------------------------------------------------------------
    // publishing
    // ------------------------------------------------------------------

    /// Record the frame size frames will arrive in. Pushed sources call
    /// this once before the first [`Source::publish`].
    pub fn set_size(&self, w: u32, h: u32) {
        self.inner.set_size(w, h);
    }

    /// Put a frame into the conflation slot, waking all readers. The old
    /// frame, delivered or not, is discarded.
    pub fn publish(&self, ts: u64, encoding: Encoding, data: Vec<u8>) {
        self.inner.publish(ts, encoding, data);
    }

    /// Like [`Source::publish`] for RGB24 data of a known size, routed
    /// through the configured resize target.
    pub fn publish_scaled(&self, ts: u64, src_w: u32, src_h: u32, rgb: Vec<u8>) {
        self.inner.publish_scaled(ts, src_w, src_h, rgb);
    }

    // ------------------------------------------------------------------
    // acquisition
    // ------------------------------------------------------------------

    /// Block until a frame newer than `after` exists, using the source's
    /// configured timeout. See [`Source::acquire_within`].
    pub fn acquire(&self, handle_failure: bool, after: u64) -> Option<Frame> {
        self.acquire_within(handle_failure, after, self.inner.default_timeout)
    }

    /// Block until the slot holds a frame with timestamp strictly greater
    /// than `after`, or `timeout` elapses.
    ///
    /// On timeout the failure hook fires (rate-limited) and, when
    /// `handle_failure` is set and the policy is not `Nothing`, a
    /// synthesized failure frame is returned in place of a live one.
    /// A requested stop unblocks the wait with `None`.
    pub fn acquire_within(&self, handle_failure: bool, after: u64, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.lock_slot();

        loop {
            if let Some(frame) = slot.frame.as_ref() {
                if frame.ts() > after {
                    let frame = Arc::clone(frame);
                    drop(slot);
                    return self.deliver(&frame);
                }
            }

            if self.comp.stop_requested() {
                return None;
            }

            let now = Instant::now();
            if now >= deadline {
                drop(slot);
                return self.acquisition_failed(handle_failure);
            }

            let wait = (deadline - now).min(WAIT_SLICE);
            let (guard, _) = match self.inner.cond.wait_timeout(slot, wait) {
                Ok(r) => r,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot = guard;
        }
    }

    /// Timestamp of the newest published frame, 0 when none exists yet.
    pub fn get_current_ts(&self) -> u64 {
        self.inner.current_ts()
    }

    pub fn get_width(&self) -> Option<u32> {
        self.inner.dimensions().map(|(w, _)| w)
    }

    pub fn get_height(&self) -> Option<u32> {
        self.inner.dimensions().map(|(_, h)| h)
    }

    /// A reader's private copy: plain duplicate when no per-frame work is
    /// configured, otherwise a fresh RGB24 frame run through the filter
    /// chain (with the previous-frame baton) and the pixel controls.
    fn deliver(&self, frame: &Arc<Frame>) -> Option<Frame> {
        let needs_controls = self
            .inner
            .controls
            .as_ref()
            .is_some_and(|c| c.requires_apply());

        if self.inner.filters.is_empty() && !needs_controls {
            return Some(frame.duplicate(None));
        }

        let (w, h) = (frame.width(), frame.height());
        let ts = frame.ts();
        let mut work = frame.data(Encoding::Rgb24);

        let usable = rgb_len(w, h).map(|n| n == work.len()).unwrap_or(false);
        if !usable {
            log::warn!("[{}] skipping filters, pixel buffer does not match {}x{}", self.id(), w, h);
            return Some(frame.duplicate(None));
        }

        if !self.inner.filters.is_empty() {
            let prev = lock_or_recover(&self.inner.prev).clone();
            apply_filters(Some(self), &self.inner.filters, prev.as_deref(), &mut work, ts, w, h);
            *lock_or_recover(&self.inner.prev) = Some(work.clone());
        }

        if needs_controls {
            if let Some(controls) = &self.inner.controls {
                controls.apply(&mut work);
            }
        }

        Some(Frame::new(ts, w, h, self.inner.jpeg_quality, Encoding::Rgb24, work))
    }

    fn acquisition_failed(&self, handle_failure: bool) -> Option<Frame> {
        log::debug!("[{}] no fresh frame within the timeout", self.id());
        self.inner.fire_exec_failure();

        if !handle_failure || self.inner.failure.mode == FailureMode::Nothing {
            return None;
        }
        Some(self.failure_frame())
    }

    // ------------------------------------------------------------------
    // failure frames
    // ------------------------------------------------------------------

    /// Synthesize the placeholder frame for a failing source. Timestamp 0,
    /// never stored in the slot.
    pub fn failure_frame(&self) -> Frame {
        let (w, h) = self.inner.dimensions().unwrap_or(DEFAULT_DIMS);

        if let Some(bm) = &self.inner.failure_bitmap {
            match scale::resize_rgb(&bm.rgb, bm.w, bm.h, w, h) {
                Ok(rgb) => return Frame::new(0, w, h, self.inner.jpeg_quality, Encoding::Rgb24, rgb),
                Err(e) => log::warn!("[{}] failure bitmap unusable: {e:#}", self.id()),
            }
        }

        let rgb = match self.inner.failure.mode {
            FailureMode::Simple => self.simple_card(w, h),
            _ => self.message_card(w, h),
        };
        Frame::new(0, w, h, self.inner.jpeg_quality, Encoding::Rgb24, rgb)
    }

    /// The full test card: gray field, box grid with noise and color
    /// accents, HLS swatches, border ticks, grayscale ramps, then the
    /// message bands, all laid out in a virtual 256x256 space scaled to
    /// the real dimensions.
    fn message_card(&self, w: u32, h: u32) -> Vec<u8> {
        let mut card = vec![0x60u8; (w as usize) * (h as usize) * 3];

        // 8x8 grid of inset boxes
        let mut nr = 0usize;
        for gy in 0..8u32 {
            for gx in 0..8u32 {
                let x1 = vmap(gx * 32, w) + 2;
                let y1 = vmap(gy * 32, h) + 2;
                let x2 = vmap((gx + 1) * 32, w).saturating_sub(2);
                let y2 = vmap((gy + 1) * 32, h).saturating_sub(2);
                if x2 <= x1 || y2 <= y1 {
                    continue;
                }

                if gy == 0 || gx == 0 {
                    draw::draw_noise(&mut card, w, h, x1, y1, x2, y2);
                } else {
                    let mut col = [160u8; 3];
                    col[nr % 3] = 255;
                    draw::draw_box(&mut card, w, h, x1, y1, x2, y2, Rgb::new(col[0], col[1], col[2]));
                    nr += 1;
                }
            }
        }

        // two bands of HLS swatches over the upper grid rows
        for sy in 0..4u32 {
            for sx in 0..8u32 {
                let x1 = vmap(sx * 32, w) + 2;
                let x2 = vmap((sx + 1) * 32, w).saturating_sub(2);
                let y1 = vmap(32 + sy * 16, h) + 2;
                let y2 = vmap(32 + (sy + 1) * 16, h).saturating_sub(2);
                if x2 <= x1 || y2 <= y1 {
                    continue;
                }
                let (r, g, b) = hls_to_rgb(sx as f64 / 8.0, 0.5, (sy + 1) as f64 / 4.0);
                let col = Rgb::new((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8);
                draw::draw_box(&mut card, w, h, x1, y1, x2, y2, col);
            }
        }

        // alternating border ticks
        for i in 0..8u32 {
            let col = if i % 2 == 0 { Rgb::WHITE } else { Rgb::BLACK };
            let (ax, bx) = (vmap(i * 32, w), vmap((i + 1) * 32, w));
            draw::draw_box(&mut card, w, h, ax, 0, bx, 2, col);
            draw::draw_box(&mut card, w, h, ax, h.saturating_sub(2), bx, h, col);
            let (ay, by) = (vmap(i * 32, h), vmap((i + 1) * 32, h));
            draw::draw_box(&mut card, w, h, 0, ay, 2, by, col);
            draw::draw_box(&mut card, w, h, w.saturating_sub(2), ay, w, by, col);
        }

        // grayscale ramp and its inverse
        for v in 0..256u32 {
            let x1 = vmap(v, w);
            let x2 = vmap(v + 1, w);
            let g = v as u8;
            draw::draw_box(&mut card, w, h, x1, vmap(150, h), x2, vmap(175, h), Rgb::new(g, g, g));
            let g = 255 - g;
            draw::draw_box(&mut card, w, h, x1, vmap(175, h), x2, vmap(200, h), Rgb::new(g, g, g));
        }

        // centered message bands
        let mut lines = vec![format!("Camera: {}", self.id())];
        lines.extend(self.rendered_failure_message().split('\n').map(String::from));

        let scale = 4u32;
        let line_h = draw::text_height(scale);
        let mut y = h as i32 / 2 - (lines.len() as i32 / 2) * line_h as i32 - line_h as i32;
        for line in &lines {
            draw::draw_box(&mut card, w, h, 0, y.max(0) as u32, w, (y.max(0) as u32).saturating_add(line_h), Rgb::BLACK);
            let x = (w as i32 - draw::text_width(line, scale) as i32) / 2;
            draw::draw_text(&mut card, w, h, x, y, scale, line, Rgb::WHITE, None);
            y += line_h as i32;
        }

        // package tag bottom center, wall clock top center
        let tag = format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        let x = (w as i32 - draw::text_width(&tag, 2) as i32) / 2;
        draw::draw_text(&mut card, w, h, x, h as i32 - 18, 2, &tag, Rgb::WHITE, Some(Rgb::BLACK));

        let clock = Local::now().format("%c").to_string();
        let x = (w as i32 - draw::text_width(&clock, 2) as i32) / 2;
        draw::draw_text(&mut card, w, h, x, 4, 2, &clock, Rgb::WHITE, Some(Rgb::BLACK));

        card
    }

    /// Message text at its configured position on a black field.
    fn simple_card(&self, w: u32, h: u32) -> Vec<u8> {
        let mut card = vec![0u8; (w as usize) * (h as usize) * 3];
        let overlay = AddText::new(
            self.inner.failure.message.clone(),
            self.inner.failure.position,
        )
        .with_style(2, Rgb::WHITE, None);
        overlay.apply(Some(self), now_us(), w, h, None, &mut card);
        card
    }

    fn rendered_failure_message(&self) -> String {
        let mut s = self.inner.failure.message.clone();
        s = s.replace("$id$", self.id());
        s = s.replace("$descr$", self.descr());
        if s.contains('%') {
            s = crate::filter::format_time(&s, now_us());
        }
        s
    }

    // ------------------------------------------------------------------
    // watchdog
    // ------------------------------------------------------------------

    /// Arm the restart watchdog: while the source is in active use, a gap
    /// of more than `interval` since the last published frame triggers a
    /// [`Component::restart`]. Muted for one interval at start and after
    /// every restart.
    pub fn start_watchdog(self: &Arc<Self>, interval: Duration) {
        let mut wd = lock_or_recover(&self.watchdog);
        if wd.is_some() {
            log::warn!("[{}] watchdog already running", self.id());
            return;
        }

        let stop = Arc::new(AtomicBool::new(false));
        let weak = Arc::downgrade(self);
        let thread_stop = Arc::clone(&stop);
        let name = format!("{}-wd", self.id());

        let spawned = std::thread::Builder::new()
            .name(name)
            .spawn(move || watchdog_loop(weak, interval, thread_stop));

        match spawned {
            Ok(handle) => {
                log::info!("[{}] watchdog armed, interval {:?}", self.id(), interval);
                *wd = Some(Watchdog {
                    stop,
                    handle: Some(handle),
                });
            }
            Err(e) => log::error!("[{}] cannot spawn watchdog thread: {e}", self.id()),
        }
    }

    pub fn stop_watchdog(&self) {
        if let Some(mut wd) = lock_or_recover(&self.watchdog).take() {
            wd.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = wd.handle.take() {
                let _ = handle.join();
            }
            log::info!("[{}] watchdog stopped", self.id());
        }
    }
}

impl Drop for Source {
    fn drop(&mut self) {
        self.stop_watchdog();
    }
}

impl Startable for Source {
    fn component(&self) -> &Component {
        &self.comp
    }
}

impl FrameProducer for Source {
    fn acquire(&self, handle_failure: bool, after: u64) -> Option<Frame> {
        Source::acquire(self, handle_failure, after)
    }

    fn get_width(&self) -> Option<u32> {
        Source::get_width(self)
    }

    fn get_height(&self) -> Option<u32> {
        Source::get_height(self)
    }

    fn get_current_ts(&self) -> u64 {
        Source::get_current_ts(self)
    }
}

// ----------------------------------------------------------------------------
// helpers
// ----------------------------------------------------------------------------

/// Map a virtual 0..=255 coordinate onto a real extent.
fn vmap(v: u32, extent: u32) -> u32 {
    ((v as u64 * extent as u64) / 255).min(extent as u64) as u32
}

fn load_failure_bitmap(path: &Path) -> Result<FailureBitmap> {
    let img = image::open(path)
        .with_context(|| format!("failed to load failure bitmap {}", path.display()))?
        .into_rgb8();
    Ok(FailureBitmap {
        w: img.width(),
        h: img.height(),
        rgb: img.into_raw(),
    })
}

/// Worker for pushed sources: nothing to acquire, frames arrive from the
/// outside. The thread exists so the lifecycle (watchdog restarts, pause,
/// unexpected-exit detection) behaves like any other source.
fn idle_worker(ctx: crate::component::WorkerContext) {
    log::debug!("[{}] passive source, waiting for published frames", ctx.id());
    while !ctx.stopping() {
        ctx.pause_checkpoint();
        ctx.sleep(WAIT_SLICE);
    }
}

fn watchdog_loop(source: Weak<Source>, interval: Duration, stop: Arc<AtomicBool>) {
    let mut mute = Instant::now();

    while !stop.load(Ordering::SeqCst) {
        std::thread::sleep(WATCHDOG_POLL);
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let Some(src) = source.upgrade() else { return };

        if mute.elapsed() < interval || !src.comp.work_required() {
            continue;
        }

        let age_us = now_us().saturating_sub(src.get_current_ts());
        if age_us > interval.as_micros() as u64 {
            log::warn!("[{}] no frame for {} ms, restarting", src.id(), age_us / 1000);
            src.comp.restart();
            mute = Instant::now();
        }
    }
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

    fn pushed(id: &str) -> Arc<Source> {
        Source::new(SourceSettings {
            id: id.to_string(),
            descr: format!("{id} under test"),
            ..SourceSettings::default()
        })
        .expect("source")
    }

    #[test]
    fn publish_without_dimensions_is_dropped() {
        let s = pushed("cam0");
        s.publish(1000, Encoding::Rgb24, vec![0; 12]);
        assert_eq!(s.get_current_ts(), 0);
        assert!(s.acquire_within(false, 0, Duration::from_millis(10)).is_none());
    }

    #[test]
    fn acquire_sees_published_frame() {
        let s = pushed("cam0");
        s.set_size(2, 2);
        s.publish(1000, Encoding::Rgb24, vec![9; 12]);

        let f = s.acquire_within(false, 0, Duration::from_millis(50)).expect("frame");
        assert_eq!(f.ts(), 1000);
        assert_eq!((f.width(), f.height()), (2, 2));
        assert_eq!(s.get_current_ts(), 1000);
        assert_eq!(s.get_width(), Some(2));
    }

    #[test]
    fn message_card_has_default_dimensions_and_zero_ts() {
        let s = pushed("cam0");
        let f = s.failure_frame();
        assert_eq!(f.ts(), 0);
        assert_eq!((f.width(), f.height()), DEFAULT_DIMS);

        let rgb = f.data(Encoding::Rgb24);
        assert_eq!(rgb.len(), 640 * 480 * 3);
        // the field color survives in the inset gaps between grid cells
        let px = ((59 * 640 + 80) * 3) as usize;
        assert_eq!(rgb[px], 0x60);
        // something other than the field color was drawn
        assert!(rgb.iter().any(|v| *v != 0x60));
    }

    #[test]
    fn failure_frame_uses_learned_dimensions() {
        let s = pushed("cam0");
        s.set_size(128, 64);
        let f = s.failure_frame();
        assert_eq!((f.width(), f.height()), (128, 64));
    }

    #[test]
    fn simple_card_is_text_on_black() {
        let s = Source::new(SourceSettings {
            id: "cam0".into(),
            failure: FailurePolicy {
                mode: FailureMode::Simple,
                message: "OFFLINE".into(),
                position: TextPosition::Center,
                bitmap: None,
            },
            ..SourceSettings::default()
        })
        .expect("source");

        let rgb = s.failure_frame().data(Encoding::Rgb24);
        assert!(rgb.iter().any(|v| *v == 255), "message pixels missing");
        let lit = rgb.iter().filter(|v| **v != 0).count();
        assert!(lit < rgb.len() / 4, "card should be mostly black");
    }

    #[test]
    fn nothing_mode_returns_none_even_when_handled() {
        let s = Source::new(SourceSettings {
            id: "cam0".into(),
            failure: FailurePolicy {
                mode: FailureMode::Nothing,
                ..FailurePolicy::default()
            },
            ..SourceSettings::default()
        })
        .expect("source");

        assert!(s.acquire_within(true, 0, Duration::from_millis(10)).is_none());
    }

    #[test]
    fn failure_mode_parses() {
        assert_eq!("nothing".parse::<FailureMode>().unwrap(), FailureMode::Nothing);
        assert_eq!("message".parse::<FailureMode>().unwrap(), FailureMode::Message);
        assert_eq!("simple".parse::<FailureMode>().unwrap(), FailureMode::Simple);
        assert!("loud".parse::<FailureMode>().is_err());
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Source::new(SourceSettings::default()).is_err(), "empty id");
        assert!(Source::new(SourceSettings {
            id: "cam0".into(),
            jpeg_quality: 0,
            ..SourceSettings::default()
        })
        .is_err());
    }
}
