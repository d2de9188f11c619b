//! Frame hosts: the refresh-synchronised callback primitive the scheduler
//! consumes. Timestamps are milliseconds in a single monotonic clock domain.

use std::{
    cell::RefCell,
    fmt,
    rc::Rc,
    thread,
    time::{Duration, Instant},
};

use crate::{MorphError, Result};

/// Callback handed to a host. It is invoked at most once with the frame
/// timestamp in milliseconds.
pub type FrameCallback = Box<dyn FnOnce(f64)>;

/// Anything that can invoke a callback on the next display refresh.
pub trait FrameHost {
    /// Queues `callback` for the next frame. Implementations must invoke it
    /// asynchronously, never from inside this call.
    fn request_tick(&self, callback: FrameCallback) -> Result<()>;
}

impl<H: FrameHost + ?Sized> FrameHost for Rc<H> {
    fn request_tick(&self, callback: FrameCallback) -> Result<()> {
        (**self).request_tick(callback)
    }
}

/// Monotonic wall clock used to stamp real-time frames.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackClock {
    origin: Instant,
}

impl PlaybackClock {
    pub fn start() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::start()
    }
}

/// Deterministic host driven by explicit timestamps. Used by tests and by the
/// offline `simulate` command.
#[derive(Clone, Default)]
pub struct ManualHost {
    queue: Rc<RefCell<ManualQueue>>,
}

#[derive(Default)]
struct ManualQueue {
    pending: Vec<FrameCallback>,
    last_timestamp: Option<f64>,
    requests: usize,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.queue.borrow().pending.len()
    }

    /// Total number of callbacks ever requested.
    pub fn requests(&self) -> usize {
        self.queue.borrow().requests
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.queue.borrow().last_timestamp
    }

    /// Fires every queued callback with `timestamp` and returns how many ran.
    /// Callbacks queued while firing wait for the next call.
    pub fn advance(&self, timestamp: f64) -> Result<usize> {
        let callbacks = {
            let mut queue = self.queue.borrow_mut();
            if let Some(previous) = queue.last_timestamp {
                if timestamp < previous {
                    return Err(MorphError::NonMonotonicTimestamp {
                        previous,
                        current: timestamp,
                    });
                }
            }
            queue.last_timestamp = Some(timestamp);
            std::mem::take(&mut queue.pending)
        };

        let fired = callbacks.len();
        for callback in callbacks {
            callback(timestamp);
        }
        Ok(fired)
    }

    /// Advances frame by frame, `interval` milliseconds apart starting at
    /// `start`, until nothing is pending or `max_frames` frames were fired.
    /// Returns the number of frames fired.
    pub fn run_frames(&self, start: f64, interval: f64, max_frames: usize) -> Result<usize> {
        let mut frames = 0;
        while frames < max_frames && self.pending() > 0 {
            self.advance(start + frames as f64 * interval)?;
            frames += 1;
        }
        Ok(frames)
    }
}

impl FrameHost for ManualHost {
    fn request_tick(&self, callback: FrameCallback) -> Result<()> {
        let mut queue = self.queue.borrow_mut();
        queue.pending.push(callback);
        queue.requests += 1;
        Ok(())
    }
}

impl fmt::Debug for ManualHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("ManualHost")
            .field("pending", &queue.pending.len())
            .field("last_timestamp", &queue.last_timestamp)
            .field("requests", &queue.requests)
            .finish()
    }
}

/// Real-time host that paces frames on the calling thread at a fixed refresh
/// rate.
#[derive(Clone)]
pub struct RefreshLoop {
    pending: Rc<RefCell<Vec<FrameCallback>>>,
    frame_interval: Duration,
    clock: PlaybackClock,
}

impl RefreshLoop {
    pub fn new(refresh_hz: u32) -> Result<Self> {
        if refresh_hz == 0 {
            return Err(MorphError::InvalidRefreshRate(refresh_hz));
        }

        Ok(Self {
            pending: Rc::new(RefCell::new(Vec::new())),
            frame_interval: Duration::from_secs_f64(1.0 / f64::from(refresh_hz)),
            clock: PlaybackClock::start(),
        })
    }

    pub fn frame_interval(&self) -> Duration {
        self.frame_interval
    }

    pub fn pending(&self) -> usize {
        self.pending.borrow().len()
    }

    /// Runs frames until no callback is pending, or until `limit` has passed.
    /// Returns the number of frames fired.
    pub fn run(&self, limit: Option<Duration>) -> usize {
        let started = Instant::now();
        let mut next_frame = started;
        let mut frames = 0;

        while self.pending() > 0 {
            if let Some(limit) = limit {
                if started.elapsed() >= limit {
                    tracing::warn!(frames, ?limit, "refresh loop hit its time limit");
                    break;
                }
            }

            next_frame += self.frame_interval;
            let now = Instant::now();
            if next_frame > now {
                thread::sleep(next_frame - now);
            } else {
                next_frame = now;
            }

            let timestamp = self.clock.elapsed_ms();
            let callbacks = std::mem::take(&mut *self.pending.borrow_mut());
            for callback in callbacks {
                callback(timestamp);
            }
            frames += 1;
        }

        tracing::debug!(frames, "refresh loop drained");
        frames
    }
}

impl FrameHost for RefreshLoop {
    fn request_tick(&self, callback: FrameCallback) -> Result<()> {
        self.pending.borrow_mut().push(callback);
        Ok(())
    }
}

impl fmt::Debug for RefreshLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshLoop")
            .field("pending", &self.pending())
            .field("frame_interval", &self.frame_interval)
            .finish()
    }
}
