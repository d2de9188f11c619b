//! The morph scheduler: turns host frame callbacks into normalised progress
//! values and fans them out to registered observers.
//!
//! A run moves through [`RunPhase::Priming`] (reset dispatched, waiting for
//! the first frame), [`RunPhase::Running`] (time origin fixed) and
//! [`RunPhase::Finished`] (window closed, no further frames requested).

use std::{
    cell::RefCell,
    collections::VecDeque,
    fmt,
    rc::{Rc, Weak},
};

use serde::{Deserialize, Serialize};

use crate::{
    config::MorphConfig,
    host::FrameHost,
    timing::{Timing, TimingFunction, TimingRegistry},
    MorphError, Result,
};

pub const DEFAULT_DURATION_SECS: f64 = 2.0;
pub const DEFAULT_START_DELAY_SECS: f64 = 0.0;

/// Value delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    /// A new run is starting; observers should capture their "from" state.
    Reset,
    /// Timing-function output for the current frame.
    At(f64),
}

impl Progress {
    pub fn value(self) -> Option<f64> {
        match self {
            Progress::Reset => None,
            Progress::At(value) => Some(value),
        }
    }

    pub fn is_reset(self) -> bool {
        matches!(self, Progress::Reset)
    }
}

/// Shared handle to a progress callback. Clones are the same observer as far
/// as registration is concerned.
#[derive(Clone)]
pub struct Observer {
    cell: Rc<ObserverCell<dyn FnMut(Progress)>>,
}

struct ObserverCell<F: ?Sized> {
    deferred: RefCell<VecDeque<Progress>>,
    handler: RefCell<F>,
}

impl Observer {
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(Progress) + 'static,
    {
        Self {
            cell: Rc::new(ObserverCell {
                deferred: RefCell::new(VecDeque::new()),
                handler: RefCell::new(handler),
            }),
        }
    }

    /// Invokes the callback. A value sent to an observer that is already
    /// running further up the stack is queued and delivered, in order, as soon
    /// as that outer call returns.
    pub fn notify(&self, progress: Progress) {
        let Ok(mut handler) = self.cell.handler.try_borrow_mut() else {
            tracing::debug!(?progress, "observer busy, deferring notification");
            self.cell.deferred.borrow_mut().push_back(progress);
            return;
        };

        (&mut *handler)(progress);
        loop {
            let next = self.cell.deferred.borrow_mut().pop_front();
            match next {
                Some(progress) => (&mut *handler)(progress),
                None => break,
            }
        }
    }

    /// Whether both handles refer to the same callback.
    pub fn same(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("handler", &Rc::as_ptr(&self.cell).cast::<()>())
            .field("deferred", &self.cell.deferred.borrow().len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Priming,
    Running,
    Finished,
}

#[derive(Debug, Clone)]
struct MorphSettings {
    duration_ms: f64,
    start_delay_ms: f64,
    timing: TimingFunction,
    clamp_ratio: bool,
}

#[derive(Debug, Default)]
struct RunState {
    origin: Option<f64>,
    phase: RunPhase,
    tick_pending: bool,
    cancelled: bool,
    last_progress: Option<f64>,
}

struct Shared {
    settings: MorphSettings,
    observers: RefCell<Vec<Observer>>,
    run: RefCell<RunState>,
    host: RefCell<Option<Rc<dyn FrameHost>>>,
}

/// Drives one morph parameter set through any number of runs.
///
/// The scheduler is a cheap reference-counted handle. Frame callbacks only
/// hold a weak reference, so dropping every handle ends the frame chain at
/// the next tick.
#[derive(Clone)]
pub struct MorphScheduler {
    shared: Rc<Shared>,
}

impl MorphScheduler {
    /// Creates a scheduler resolving timing names against the built-in
    /// curves. Durations are in seconds; `None` picks the defaults (2 s
    /// duration, no delay).
    pub fn new(
        duration_secs: Option<f64>,
        start_delay_secs: Option<f64>,
        timing: impl Into<Timing>,
    ) -> Result<Self> {
        Self::with_registry(
            duration_secs,
            start_delay_secs,
            timing,
            &TimingRegistry::builtin(),
        )
    }

    /// Like [`MorphScheduler::new`] with a caller supplied registry.
    pub fn with_registry(
        duration_secs: Option<f64>,
        start_delay_secs: Option<f64>,
        timing: impl Into<Timing>,
        registry: &TimingRegistry,
    ) -> Result<Self> {
        let timing = registry.resolve(&timing.into());
        Self::build(
            duration_secs.unwrap_or(DEFAULT_DURATION_SECS),
            start_delay_secs.unwrap_or(DEFAULT_START_DELAY_SECS),
            timing,
            false,
        )
    }

    pub fn from_config(config: &MorphConfig, registry: &TimingRegistry) -> Result<Self> {
        let timing = registry.resolve(&Timing::from(config.timing.as_str()));
        Self::build(
            config.duration,
            config.start_delay,
            timing,
            config.clamp_ratio,
        )
    }

    fn build(
        duration_secs: f64,
        start_delay_secs: f64,
        timing: TimingFunction,
        clamp_ratio: bool,
    ) -> Result<Self> {
        if !(duration_secs.is_finite() && duration_secs > 0.0) {
            return Err(MorphError::InvalidDuration(duration_secs));
        }
        if !(start_delay_secs.is_finite() && start_delay_secs >= 0.0) {
            return Err(MorphError::InvalidDelay(start_delay_secs));
        }

        let settings = MorphSettings {
            duration_ms: duration_secs * 1000.0,
            start_delay_ms: start_delay_secs * 1000.0,
            timing,
            clamp_ratio,
        };
        tracing::debug!(
            duration_ms = settings.duration_ms,
            start_delay_ms = settings.start_delay_ms,
            timing = settings.timing.name(),
            clamp_ratio,
            "created morph scheduler"
        );

        Ok(Self {
            shared: Rc::new(Shared {
                settings,
                observers: RefCell::new(Vec::new()),
                run: RefCell::new(RunState::default()),
                host: RefCell::new(None),
            }),
        })
    }

    /// Attaches the frame primitive that drives every run.
    pub fn with_host(self, host: impl FrameHost + 'static) -> Self {
        *self.shared.host.borrow_mut() = Some(Rc::new(host));
        self
    }

    pub fn has_host(&self) -> bool {
        self.shared.host.borrow().is_some()
    }

    /// Toggles membership: an unknown observer is added, a registered one is
    /// removed. `None` is ignored.
    pub fn register<O: Into<Option<Observer>>>(&self, observer: O) -> &Self {
        let Some(observer) = observer.into() else {
            return self;
        };

        let mut observers = self.shared.observers.borrow_mut();
        match observers.iter().position(|known| known.same(&observer)) {
            Some(index) => {
                observers.remove(index);
                tracing::debug!(observers = observers.len(), "observer unregistered");
            }
            None => {
                observers.push(observer);
                tracing::debug!(observers = observers.len(), "observer registered");
            }
        }
        self
    }

    pub fn is_registered(&self, observer: &Observer) -> bool {
        self.shared
            .observers
            .borrow()
            .iter()
            .any(|known| known.same(observer))
    }

    pub fn observer_count(&self) -> usize {
        self.shared.observers.borrow().len()
    }

    pub fn clear_observers(&self) -> &Self {
        self.shared.observers.borrow_mut().clear();
        self
    }

    /// Begins a new run. Every observer receives [`Progress::Reset`] before
    /// this returns; numeric progress follows from host frames.
    ///
    /// Restarting while a frame is still pending re-anchors the run on that
    /// pending frame instead of requesting a second one.
    ///
    /// When an observer calls `start` from inside its own callback, its
    /// `Reset` is queued and delivered right after that callback returns, still
    /// before the next tick.
    pub fn start(&self) -> Result<&Self> {
        if !self.has_host() {
            return Err(MorphError::HostUnavailable);
        }

        {
            let mut run = self.shared.run.borrow_mut();
            run.origin = None;
            run.cancelled = false;
            run.last_progress = None;
            run.phase = RunPhase::Priming;
        }
        tracing::debug!(observers = self.observer_count(), "morph run starting");

        self.dispatch(Progress::Reset);
        self.request_tick()?;
        Ok(self)
    }

    /// Stops the current run. A pending frame still fires but neither
    /// dispatches nor reschedules.
    pub fn cancel(&self) -> &Self {
        let mut run = self.shared.run.borrow_mut();
        if run.phase != RunPhase::Idle {
            run.cancelled = true;
            run.phase = RunPhase::Finished;
            tracing::debug!("morph run cancelled");
        }
        self
    }

    pub fn phase(&self) -> RunPhase {
        self.shared.run.borrow().phase
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase(), RunPhase::Priming | RunPhase::Running)
    }

    /// Last numeric progress dispatched in the current run.
    pub fn last_progress(&self) -> Option<f64> {
        self.shared.run.borrow().last_progress
    }

    pub fn duration_ms(&self) -> f64 {
        self.shared.settings.duration_ms
    }

    pub fn start_delay_ms(&self) -> f64 {
        self.shared.settings.start_delay_ms
    }

    pub fn timing(&self) -> &TimingFunction {
        &self.shared.settings.timing
    }

    pub fn clamps_ratio(&self) -> bool {
        self.shared.settings.clamp_ratio
    }

    fn request_tick(&self) -> Result<()> {
        let host = {
            let mut run = self.shared.run.borrow_mut();
            if run.tick_pending {
                return Ok(());
            }
            let host = self
                .shared
                .host
                .borrow()
                .clone()
                .ok_or(MorphError::HostUnavailable)?;
            run.tick_pending = true;
            host
        };

        let weak: Weak<Shared> = Rc::downgrade(&self.shared);
        let requested = host.request_tick(Box::new(move |timestamp| {
            if let Some(shared) = weak.upgrade() {
                MorphScheduler { shared }.tick(timestamp);
            }
        }));

        if requested.is_err() {
            let mut run = self.shared.run.borrow_mut();
            run.tick_pending = false;
            run.phase = RunPhase::Finished;
        }
        requested
    }

    fn tick(&self, timestamp: f64) {
        let settings = &self.shared.settings;
        let (elapsed, progress) = {
            let mut run = self.shared.run.borrow_mut();
            run.tick_pending = false;
            if run.cancelled {
                return;
            }

            let origin = match run.origin {
                Some(origin) => origin,
                None => {
                    run.origin = Some(timestamp);
                    run.phase = RunPhase::Running;
                    timestamp
                }
            };
            let elapsed = timestamp - origin;

            let progress = if elapsed >= settings.start_delay_ms {
                let mut ratio = (elapsed - settings.start_delay_ms) / settings.duration_ms;
                if settings.clamp_ratio {
                    ratio = ratio.clamp(0.0, 1.0);
                }
                let progress = settings.timing.apply(ratio);
                run.last_progress = Some(progress);
                Some(progress)
            } else {
                None
            };
            (elapsed, progress)
        };

        if let Some(progress) = progress {
            tracing::trace!(timestamp, elapsed, progress, "morph tick");
            self.dispatch(Progress::At(progress));
        }

        // Observers may have restarted or cancelled the run while we were
        // dispatching; either way this frame no longer owns the chain.
        {
            let run = self.shared.run.borrow();
            if run.tick_pending || run.cancelled {
                return;
            }
        }

        if elapsed <= settings.start_delay_ms + settings.duration_ms {
            if let Err(err) = self.request_tick() {
                tracing::warn!(%err, "frame host refused the next tick, ending run");
            }
        } else {
            self.shared.run.borrow_mut().phase = RunPhase::Finished;
            tracing::debug!(elapsed, "morph run finished");
        }
    }

    /// Calls a snapshot of the observers, most recently registered first.
    fn dispatch(&self, progress: Progress) {
        let observers = self.shared.observers.borrow().clone();
        for observer in observers.iter().rev() {
            observer.notify(progress);
        }
    }
}

impl fmt::Debug for MorphScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MorphScheduler")
            .field("settings", &self.shared.settings)
            .field("run", &*self.shared.run.borrow())
            .field("observers", &self.observer_count())
            .field("has_host", &self.has_host())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{ManualHost, ProgressRecorder};

    const FRAME_MS: f64 = 16.0;

    fn morph(
        duration: Option<f64>,
        delay: Option<f64>,
        timing: impl Into<Timing>,
    ) -> (MorphScheduler, ManualHost, ProgressRecorder) {
        let host = ManualHost::new();
        let recorder = ProgressRecorder::new();
        let scheduler = MorphScheduler::new(duration, delay, timing)
            .unwrap()
            .with_host(host.clone());
        scheduler.register(recorder.observer());
        (scheduler, host, recorder)
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn applies_defaults_and_stores_milliseconds() {
        let scheduler = MorphScheduler::new(None, None, Timing::Linear).unwrap();
        assert_eq!(scheduler.duration_ms(), 2000.0);
        assert_eq!(scheduler.start_delay_ms(), 0.0);
        assert_eq!(scheduler.timing().name(), "linear");
        assert_eq!(scheduler.phase(), RunPhase::Idle);
        assert_eq!(scheduler.observer_count(), 0);

        let scheduler = MorphScheduler::new(Some(1.5), Some(0.25), "sinoid").unwrap();
        assert_eq!(scheduler.duration_ms(), 1500.0);
        assert_eq!(scheduler.start_delay_ms(), 250.0);
        assert_eq!(scheduler.timing().name(), "sinoid");
    }

    #[test]
    fn rejects_invalid_configuration() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                MorphScheduler::new(Some(duration), None, "linear"),
                Err(MorphError::InvalidDuration(_))
            ));
        }
        assert!(matches!(
            MorphScheduler::new(Some(1.0), Some(-0.5), "linear"),
            Err(MorphError::InvalidDelay(d)) if d == -0.5
        ));
    }

    #[test]
    fn unknown_timing_name_falls_back_to_linear() {
        let scheduler = MorphScheduler::new(None, None, "wobble").unwrap();
        assert_eq!(scheduler.timing().name(), "linear");
    }

    #[test]
    fn register_toggles_membership() {
        let scheduler = MorphScheduler::new(None, None, "linear").unwrap();
        let observer = Observer::new(|_| {});

        scheduler.register(observer.clone());
        assert!(scheduler.is_registered(&observer));
        scheduler.register(observer.clone());
        assert_eq!(scheduler.observer_count(), 0);
        scheduler.register(observer.clone());
        assert_eq!(scheduler.observer_count(), 1);

        scheduler.register(None::<Observer>);
        assert_eq!(scheduler.observer_count(), 1);

        let other = Observer::new(|_| {});
        scheduler.register(other.clone()).register(observer.clone());
        assert!(!scheduler.is_registered(&observer));
        assert!(scheduler.is_registered(&other));
        assert_eq!(scheduler.clear_observers().observer_count(), 0);
    }

    #[test]
    fn start_without_host_fails_before_dispatching() {
        let recorder = ProgressRecorder::new();
        let scheduler = MorphScheduler::new(None, None, "linear").unwrap();
        scheduler.register(recorder.observer());

        assert!(matches!(scheduler.start(), Err(MorphError::HostUnavailable)));
        assert!(recorder.is_empty());
        assert_eq!(scheduler.phase(), RunPhase::Idle);
    }

    #[test]
    fn start_resets_observers_synchronously_in_reverse_order() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        let order = Rc::new(RefCell::new(Vec::new()));
        for label in ["first", "second"] {
            let sink = order.clone();
            scheduler.register(Observer::new(move |p| {
                if p.is_reset() {
                    sink.borrow_mut().push(label);
                }
            }));
        }

        scheduler.start().unwrap();
        assert_eq!(recorder.samples(), vec![Progress::Reset]);
        assert_eq!(*order.borrow(), vec!["second", "first"]);
        assert_eq!(scheduler.phase(), RunPhase::Priming);
        assert_eq!(host.pending(), 1);
    }

    #[test]
    fn linear_run_without_delay() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();

        let frames = host.run_frames(0.0, FRAME_MS, 1_000).unwrap();
        // 0, 16, ..., 992 stay inside the window; 1008 closes it.
        assert_eq!(frames, 64);
        assert_eq!(host.pending(), 0);
        assert_eq!(scheduler.phase(), RunPhase::Finished);

        let samples = recorder.samples();
        assert_eq!(samples[0], Progress::Reset);
        assert_eq!(recorder.reset_count(), 1);

        let values = recorder.values();
        assert_eq!(values.len(), 64);
        for (i, value) in values.iter().enumerate() {
            assert!(close(*value, i as f64 * 0.016), "frame {i}: {value}");
        }
        let last = *values.last().unwrap();
        assert!((last - 1.0).abs() <= FRAME_MS / 1000.0);
        assert_eq!(scheduler.last_progress(), Some(last));
    }

    #[test]
    fn delay_window_suppresses_dispatch() {
        let (scheduler, host, recorder) = morph(Some(2.0), Some(0.5), "linear");
        scheduler.start().unwrap();

        let mut t = 0.0;
        while t < 500.0 {
            host.advance(t).unwrap();
            assert_eq!(recorder.len(), 1, "dispatch inside delay at {t}");
            t += FRAME_MS;
        }
        assert_eq!(scheduler.phase(), RunPhase::Running);

        host.advance(t).unwrap();
        let values = recorder.values();
        assert_eq!(values.len(), 1);
        assert!(close(values[0], (t - 500.0) / 2000.0));

        let frames = host.run_frames(t + FRAME_MS, FRAME_MS, 1_000).unwrap();
        let values = recorder.values();
        assert_eq!(values.len(), frames + 1);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!((values.last().unwrap() - 1.0).abs() <= FRAME_MS / 2000.0);
    }

    #[test]
    fn window_end_is_inclusive() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();

        let mut t = 0.0;
        while t <= 992.0 {
            host.advance(t).unwrap();
            t += FRAME_MS;
        }
        host.advance(1000.0).unwrap();
        assert_eq!(recorder.values().last().copied(), Some(1.0));
        assert_eq!(host.pending(), 1, "a frame at exactly the window end keeps the chain alive");
        assert!(scheduler.is_running());

        host.advance(1016.0).unwrap();
        let values = recorder.values();
        let tail = &values[values.len() - 2..];
        assert!(close(tail[0], 1.0));
        assert!(close(tail[1], 1.016));
        assert_eq!(host.pending(), 0);
        assert_eq!(scheduler.phase(), RunPhase::Finished);
    }

    #[test]
    fn delayed_window_end_is_inclusive() {
        let (scheduler, host, recorder) = morph(Some(2.0), Some(0.5), "linear");
        scheduler.start().unwrap();

        host.advance(0.0).unwrap();
        host.advance(2500.0).unwrap();
        assert_eq!(recorder.values(), vec![1.0]);
        assert_eq!(host.pending(), 1);

        host.advance(2516.0).unwrap();
        let values = recorder.values();
        assert_eq!(values.len(), 2);
        assert!(close(values[1], 1.008));
        assert_eq!(host.pending(), 0);
        assert_eq!(scheduler.phase(), RunPhase::Finished);
    }

    #[test]
    fn eased_run_starts_at_zero_and_lands_near_one() {
        let (scheduler, host, recorder) = morph(Some(0.5), None, "poly5");
        scheduler.start().unwrap();
        host.run_frames(0.0, FRAME_MS, 1_000).unwrap();

        let values = recorder.values();
        assert_eq!(values[0], 0.0);
        assert!(values.windows(2).all(|w| w[0] < w[1]));
        assert!((values.last().unwrap() - 1.0).abs() < 0.01);
    }

    #[test]
    fn clamped_ratio_lands_exactly_on_one() {
        let config = MorphConfig {
            duration: 1.0,
            clamp_ratio: true,
            ..MorphConfig::default()
        };
        let host = ManualHost::new();
        let recorder = ProgressRecorder::new();
        let scheduler = MorphScheduler::from_config(&config, &TimingRegistry::builtin())
            .unwrap()
            .with_host(host.clone());
        scheduler.register(recorder.observer()).start().unwrap();

        host.run_frames(0.0, FRAME_MS, 1_000).unwrap();
        assert!(scheduler.clamps_ratio());
        assert_eq!(recorder.values().last().copied(), Some(1.0));
    }

    #[test]
    fn restart_reanchors_on_the_pending_frame() {
        let (scheduler, host, recorder) = morph(Some(1.0), Some(0.1), "linear");

        scheduler.start().unwrap();
        host.advance(0.0).unwrap();
        host.advance(50.0).unwrap();
        assert!(recorder.values().is_empty());

        scheduler.start().unwrap();
        assert_eq!(host.pending(), 1);
        assert_eq!(recorder.reset_count(), 2);

        host.advance(60.0).unwrap();
        assert!(recorder.values().is_empty());
        host.advance(170.0).unwrap();

        // Against the first origin this would be 0.07.
        assert_eq!(recorder.values().len(), 1);
        assert!(close(recorder.values()[0], 0.01));
    }

    #[test]
    fn back_to_back_starts_share_one_frame_request() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap().start().unwrap();

        assert_eq!(host.requests(), 1);
        assert_eq!(recorder.samples(), vec![Progress::Reset, Progress::Reset]);

        host.advance(40.0).unwrap();
        host.advance(56.0).unwrap();
        assert!(close(recorder.values()[0], 0.0));
        assert!(close(recorder.values()[1], 0.016));
    }

    #[test]
    fn cancel_stops_dispatch_and_rescheduling() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();
        host.advance(0.0).unwrap();

        scheduler.cancel();
        assert_eq!(scheduler.phase(), RunPhase::Finished);
        assert!(!scheduler.is_running());

        host.advance(16.0).unwrap();
        assert_eq!(recorder.values().len(), 1);
        assert_eq!(host.pending(), 0);

        scheduler.start().unwrap();
        assert_eq!(host.pending(), 1);
        host.advance(32.0).unwrap();
        assert_eq!(recorder.values().len(), 2);
        assert!(scheduler.is_running());
    }

    #[test]
    fn start_after_cancel_reuses_pending_frame() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();
        scheduler.cancel().start().unwrap();

        assert_eq!(host.requests(), 1);
        host.advance(0.0).unwrap();
        assert_eq!(recorder.values(), vec![0.0]);
    }

    #[test]
    fn observer_can_cancel_from_inside_dispatch() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        let handle = scheduler.clone();
        scheduler.register(Observer::new(move |p| {
            if p.value().is_some_and(|v| v >= 0.5) {
                handle.cancel();
            }
        }));

        scheduler.start().unwrap();
        host.run_frames(0.0, 100.0, 100).unwrap();

        assert_eq!(recorder.values().last().copied(), Some(0.5));
        assert_eq!(host.pending(), 0);
    }

    #[test]
    fn observer_restart_keeps_a_single_frame_chain() {
        let host = ManualHost::new();
        let recorder = ProgressRecorder::new();
        let scheduler = MorphScheduler::new(Some(0.1), None, "linear")
            .unwrap()
            .with_host(host.clone());

        let restarted = Rc::new(Cell::new(false));
        let handle = scheduler.clone();
        let flag = restarted.clone();
        // Registered first, so it runs after the recorder within a tick.
        scheduler
            .register(Observer::new(move |p| {
                if p.value().is_some_and(|v| v >= 0.5) && !flag.get() {
                    flag.set(true);
                    handle.start().unwrap();
                }
            }))
            .register(recorder.observer());

        scheduler.start().unwrap();
        let mut t = 0.0;
        while host.pending() > 0 {
            assert_eq!(host.pending(), 1);
            host.advance(t).unwrap();
            t += 10.0;
        }

        assert!(restarted.get());
        assert_eq!(recorder.reset_count(), 2);
        let samples = recorder.samples();
        let second_reset = samples.iter().rposition(|p| p.is_reset()).unwrap();
        assert_eq!(samples[second_reset - 1], Progress::At(0.5));
        assert_eq!(samples[second_reset + 1], Progress::At(0.0));
        assert!(samples[second_reset + 1..].iter().all(|p| !p.is_reset()));
        assert_eq!(scheduler.phase(), RunPhase::Finished);
    }

    #[test]
    fn restarting_observer_receives_its_own_reset() {
        let host = ManualHost::new();
        let scheduler = MorphScheduler::new(Some(0.1), None, "linear")
            .unwrap()
            .with_host(host.clone());

        let seen = Rc::new(RefCell::new(Vec::new()));
        let restarted = Rc::new(Cell::new(false));
        let handle = scheduler.clone();
        let (sink, flag) = (seen.clone(), restarted.clone());
        let observer = Observer::new(move |p| {
            sink.borrow_mut().push(p);
            if p.value().is_some_and(|v| v >= 0.5) && !flag.get() {
                flag.set(true);
                handle.start().unwrap();
            }
        });
        scheduler.register(observer.clone());

        scheduler.start().unwrap();
        let mut t = 0.0;
        while host.pending() > 0 {
            host.advance(t).unwrap();
            t += 10.0;
        }

        let seen = seen.borrow();
        assert_eq!(seen.iter().filter(|p| p.is_reset()).count(), 2);
        let second_reset = seen.iter().rposition(|p| p.is_reset()).unwrap();
        assert_eq!(seen[second_reset - 1], Progress::At(0.5));
        assert_eq!(seen[second_reset + 1], Progress::At(0.0));
        assert!(format!("{observer:?}").contains("deferred: 0"));
    }

    #[test]
    fn dropping_the_scheduler_ends_the_chain() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();
        drop(scheduler);

        assert_eq!(host.advance(0.0).unwrap(), 1);
        assert_eq!(host.pending(), 0);
        assert!(recorder.values().is_empty());
    }

    #[test]
    fn observers_registered_mid_run_join_on_the_next_tick() {
        let (scheduler, host, recorder) = morph(Some(1.0), None, "linear");
        scheduler.start().unwrap();
        host.advance(0.0).unwrap();

        let late = ProgressRecorder::new();
        scheduler.register(late.observer());
        host.advance(100.0).unwrap();

        assert_eq!(recorder.values().len(), 2);
        assert_eq!(late.samples(), vec![Progress::At(0.1)]);
    }
}
