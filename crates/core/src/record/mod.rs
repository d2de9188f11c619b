use std::{cell::RefCell, fmt, rc::Rc};

use crate::{Observer, Progress, Result};

/// Observer that keeps every value it receives. Handy for offline
/// simulation and for asserting on dispatch sequences.
#[derive(Clone)]
pub struct ProgressRecorder {
    samples: Rc<RefCell<Vec<Progress>>>,
    observer: Observer,
}

impl ProgressRecorder {
    pub fn new() -> Self {
        let samples = Rc::new(RefCell::new(Vec::new()));
        let sink = samples.clone();
        let observer = Observer::new(move |progress| sink.borrow_mut().push(progress));
        Self { samples, observer }
    }

    /// The recording observer. Every call returns the same observer, so
    /// registering the result twice toggles it off again.
    pub fn observer(&self) -> Observer {
        self.observer.clone()
    }

    pub fn samples(&self) -> Vec<Progress> {
        self.samples.borrow().clone()
    }

    /// Numeric progress values, resets skipped.
    pub fn values(&self) -> Vec<f64> {
        self.samples
            .borrow()
            .iter()
            .filter_map(|progress| progress.value())
            .collect()
    }

    pub fn reset_count(&self) -> usize {
        self.samples
            .borrow()
            .iter()
            .filter(|progress| progress.is_reset())
            .count()
    }

    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.samples.borrow_mut().clear();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&*self.samples.borrow())?)
    }
}

impl Default for ProgressRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ProgressRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressRecorder")
            .field("samples", &self.len())
            .finish()
    }
}
