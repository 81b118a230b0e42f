//! Vigil surveillance kernel.
//!
//! This crate implements the frame production and transformation engine that
//! every other part of a camera server builds on: capture backends publish
//! into it, streaming/recording consumers read from it.
//!
//! # Architecture
//!
//! Four layers, leaves first:
//!
//! 1. **StatsTracker**: rolling five-second counters (cpu/fps/bandwidth)
//!    owned by every component.
//! 2. **Component**: the shared thread-lifecycle contract. Reference-counted
//!    `start`/`stop`, watchdog-driven `restart`, cooperative `pause`,
//!    error-state tracking, event notification.
//! 3. **Frame**: one captured image held in one or more encodings
//!    (RGB24/BGR24/YUYV422/JPEG) with lazy, cached transcoding.
//! 4. **Source**: a component producing a continuous stream of frames into a
//!    single conflation slot, with per-reader filtering, failure-frame
//!    synthesis and self-healing via a watchdog.
//!
//! # Module Structure
//!
//! - `component`: lifecycle base + capability traits
//! - `frame`: multi-encoding frame values
//! - `source`: frame production, delivery, failure handling
//! - `filter`: per-frame transform chain
//! - `target`: disk-writing consumers (JPEG snapshots)
//! - `config`: JSON configuration for the `vigild` daemon

use std::time::{SystemTime, UNIX_EPOCH};

pub mod color;
pub mod component;
pub mod config;
pub mod controls;
pub mod draw;
pub mod filter;
pub mod frame;
pub mod pixel;
pub mod scale;
pub mod source;
pub mod stats;
pub mod target;

pub use component::{Component, ComponentKind, ErrorState, FrameProducer, FrameTransform, Startable};
pub use controls::{Controls, SoftwareControls};
pub use filter::{apply_filters, Filter};
pub use frame::{Encoding, Frame, ResizeView, RotateView};
pub use source::{FailureHook, FailureMode, FailurePolicy, Source, SourceKind, SourceSettings};
pub use stats::StatsTracker;
pub use target::SnapshotTarget;

/// Current wall-clock time in microseconds since the epoch. Frame timestamps
/// and the watchdog staleness check all use this clock.
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Current wall-clock time in whole seconds since the epoch.
pub fn now_s() -> u64 {
    now_us() / 1_000_000
}
