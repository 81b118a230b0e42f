//! Rolling per-component counters.
//!
//! Every component owns a `StatsTracker`. It keeps five one-second buckets
//! (indexed by `epoch_second % 5`) for frame rate, bandwidth, connection
//! count and CPU time. Readers always skip the bucket belonging to the
//! current second, so values cover the last four *complete* seconds.
//!
//! Buckets are stamped with the epoch second they were written for and
//! lazily reset when a new second first touches them. Stale buckets (ones
//! whose stamp is more than five seconds old) are ignored by readers, so an
//! idle tracker neither needs a maintenance thread nor reports ghost data.

use std::sync::Mutex;

use crate::now_us;

const N_SLOTS: usize = 5;

#[derive(Default)]
struct Slots {
    stamp: [u64; N_SLOTS],
    fps: [u32; N_SLOTS],
    fps_set: [bool; N_SLOTS],
    bw: [u64; N_SLOTS],
    cc: [u32; N_SLOTS],
    cpu: [f64; N_SLOTS],

    // rusage bookkeeping for cpu deltas
    prev_cpu_us: u64,
    prev_cpu_ts: u64,
}

/// Rolling five-second statistics for one component (or, with `global`,
/// for the whole process).
pub struct StatsTracker {
    id: String,
    global: bool,
    slots: Mutex<Slots>,
}

impl StatsTracker {
    pub fn new(id: &str, global: bool) -> Self {
        Self {
            id: id.to_string(),
            global,
            slots: Mutex::new(Slots::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    // ------------------------------------------------------------------
    // writers
    // ------------------------------------------------------------------

    /// Count one produced frame in the current second.
    pub fn track_fps(&self) {
        let now_s = now_us() / 1_000_000;
        let mut slots = self.lock();
        let i = Self::rotate(&mut slots, now_s);
        slots.fps[i] += 1;
        slots.fps_set[i] = true;
    }

    /// Add transferred bytes to the current second.
    pub fn track_bw(&self, bytes: usize) {
        let now_s = now_us() / 1_000_000;
        let mut slots = self.lock();
        let i = Self::rotate(&mut slots, now_s);
        slots.bw[i] += bytes as u64;
    }

    /// Record the current connection count.
    pub fn track_cc(&self, count: u32) {
        let now_s = now_us() / 1_000_000;
        let mut slots = self.lock();
        let i = Self::rotate(&mut slots, now_s);
        slots.cc[i] = count;
    }

    /// Sample this thread's CPU time and accumulate the delta since the
    /// previous sample into the current bucket. Worker loops call this once
    /// per iteration.
    pub fn track_cpu_usage(&self) {
        let now = now_us();
        let cpu_us = thread_cpu_us(self.global);

        let mut slots = self.lock();
        let i = Self::rotate(&mut slots, now / 1_000_000);

        if slots.prev_cpu_ts != 0 && cpu_us >= slots.prev_cpu_us {
            let delta = (cpu_us - slots.prev_cpu_us) as f64 / 1_000_000.0;
            slots.cpu[i] += delta;
        }

        slots.prev_cpu_us = cpu_us;
        slots.prev_cpu_ts = now;
    }

    /// Forget CPU accounting. Called when a component's worker thread is
    /// replaced: the rusage baseline belongs to the dead thread.
    pub fn reset_cpu_tracking(&self) {
        let mut slots = self.lock();
        slots.prev_cpu_us = 0;
        slots.prev_cpu_ts = 0;
        slots.cpu = [0.0; N_SLOTS];
        slots.stamp = [0; N_SLOTS];
    }

    // ------------------------------------------------------------------
    // readers
    // ------------------------------------------------------------------

    /// Average frames per second over the complete buckets, or `None` when
    /// no frame has been counted yet.
    pub fn get_fps(&self) -> Option<f64> {
        let now_s = now_us() / 1_000_000;
        let cur = (now_s % N_SLOTS as u64) as usize;
        let slots = self.lock();

        let mut total = 0u32;
        let mut n = 0u32;
        for i in 0..N_SLOTS {
            if i != cur && slots.fps_set[i] && Self::fresh(&slots, i, now_s) {
                total += slots.fps[i];
                n += 1;
            }
        }

        if n == 0 {
            return None;
        }
        Some(f64::from(total) / f64::from(n))
    }

    /// Average bytes per second over the last four complete seconds.
    pub fn get_bw(&self) -> u64 {
        let now_s = now_us() / 1_000_000;
        let cur = (now_s % N_SLOTS as u64) as usize;
        let slots = self.lock();

        let mut total = 0u64;
        for i in 0..N_SLOTS {
            if i != cur && Self::fresh(&slots, i, now_s) {
                total += slots.bw[i];
            }
        }
        total / (N_SLOTS as u64 - 1)
    }

    /// Average connection count over the window.
    pub fn get_cc(&self) -> f64 {
        let now_s = now_us() / 1_000_000;
        let slots = self.lock();

        let mut total = 0u32;
        for i in 0..N_SLOTS {
            if Self::fresh(&slots, i, now_s) {
                total += slots.cc[i];
            }
        }
        f64::from(total) / N_SLOTS as f64
    }

    /// Average CPU seconds per second (i.e. utilization of one core) over
    /// the complete buckets.
    pub fn get_cpu_usage(&self) -> f64 {
        let now_s = now_us() / 1_000_000;
        let cur = (now_s % N_SLOTS as u64) as usize;
        let slots = self.lock();

        let mut total = 0.0;
        for i in 0..N_SLOTS {
            if i != cur && Self::fresh(&slots, i, now_s) {
                total += slots.cpu[i];
            }
        }
        total / (N_SLOTS as f64 - 1.0)
    }

    // ------------------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, Slots> {
        match self.slots.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Return the bucket index for `now_s`, zeroing it first if it still
    /// holds data from an earlier second.
    fn rotate(slots: &mut Slots, now_s: u64) -> usize {
        let i = (now_s % N_SLOTS as u64) as usize;
        if slots.stamp[i] != now_s {
            slots.stamp[i] = now_s;
            slots.fps[i] = 0;
            slots.fps_set[i] = false;
            slots.bw[i] = 0;
            slots.cc[i] = 0;
            slots.cpu[i] = 0.0;
        }
        i
    }

    fn fresh(slots: &Slots, i: usize, now_s: u64) -> bool {
        slots.stamp[i] != 0 && now_s.saturating_sub(slots.stamp[i]) < N_SLOTS as u64
    }
}

/// CPU time consumed so far, in microseconds. Per-thread on linux, zero on
/// platforms without `RUSAGE_THREAD`.
#[cfg(target_os = "linux")]
fn thread_cpu_us(global: bool) -> u64 {
    let who = if global {
        libc::RUSAGE_SELF
    } else {
        libc::RUSAGE_THREAD
    };

    let mut ru: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(who, &mut ru) };
    if rc != 0 {
        return 0;
    }

    let user = ru.ru_utime.tv_sec as u64 * 1_000_000 + ru.ru_utime.tv_usec as u64;
    let sys = ru.ru_stime.tv_sec as u64 * 1_000_000 + ru.ru_stime.tv_usec as u64;
    user + sys
}

#[cfg(not(target_os = "linux"))]
fn thread_cpu_us(_global: bool) -> u64 {
    0
}
