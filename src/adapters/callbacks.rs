//! Closure-based notifier adapter.
//!
//! [`CallbackNotifier`] fans [`ControlEvent`]s out to optional per-event
//! callbacks, for front ends that prefer hooks over matching on events.
//! Callbacks run on the worker thread; events without a callback are
//! dropped.

use std::time::Duration;

use crate::app::events::{ControlEvent, ControllerStatus};
use crate::app::ports::Notifier;
use crate::error::Error;

type Callback<T> = Option<Box<dyn FnMut(T) + Send>>;

#[derive(Default)]
pub struct CallbackNotifier {
    on_open: Callback<ControllerStatus>,
    on_treat: Callback<(usize, u32)>,
    on_wait: Callback<(Duration, Duration)>,
    on_end: Callback<String>,
    on_close: Callback<()>,
    on_error: Callback<Error>,
}

impl CallbackNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_open(mut self, f: impl FnMut(ControllerStatus) + Send + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    /// Called with `(index, frequency_khz)`.
    #[must_use]
    pub fn on_treat(mut self, f: impl FnMut((usize, u32)) + Send + 'static) -> Self {
        self.on_treat = Some(Box::new(f));
        self
    }

    /// Called with `(elapsed, duration)`.
    #[must_use]
    pub fn on_wait(mut self, f: impl FnMut((Duration, Duration)) + Send + 'static) -> Self {
        self.on_wait = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_end(mut self, f: impl FnMut(String) + Send + 'static) -> Self {
        self.on_end = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_close(mut self, f: impl FnMut(()) + Send + 'static) -> Self {
        self.on_close = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn on_error(mut self, f: impl FnMut(Error) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

fn fire<T>(callback: &mut Callback<T>, arg: T) {
    if let Some(f) = callback {
        f(arg);
    }
}

impl Notifier for CallbackNotifier {
    fn notify(&mut self, event: &ControlEvent) {
        match event {
            ControlEvent::Opened(status) => fire(&mut self.on_open, status.clone()),
            ControlEvent::Treating {
                index,
                frequency_khz,
            } => fire(&mut self.on_treat, (*index, *frequency_khz)),
            ControlEvent::Waiting { elapsed, duration } => {
                fire(&mut self.on_wait, (*elapsed, *duration));
            }
            ControlEvent::Ended(message) => fire(&mut self.on_end, message.clone()),
            ControlEvent::Closed => fire(&mut self.on_close, ()),
            ControlEvent::Error(e) => fire(&mut self.on_error, e.clone()),
        }
    }
}
