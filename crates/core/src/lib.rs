//! Core library for Morphr.
//!
//! Morphr morphs numeric state over a fixed time window. A
//! [`MorphScheduler`] owns a duration, a start delay and a timing curve; once
//! started it asks a [`FrameHost`] for one callback per display refresh and
//! hands every registered [`Observer`] the eased progress of that frame.
//! Observers decide what the progress means; the scheduler never touches the
//! values being animated.

pub mod config;
pub mod error;
pub mod host;
pub mod record;
pub mod scheduler;
pub mod timing;

pub use config::{AppConfig, HostConfig, MorphConfig};
pub use error::{MorphError, Result};
pub use host::{FrameCallback, FrameHost, ManualHost, PlaybackClock, RefreshLoop};
pub use record::ProgressRecorder;
pub use scheduler::{MorphScheduler, Observer, Progress, RunPhase};
pub use timing::{CurveSample, Timing, TimingFunction, TimingRegistry};
