//! Application core: treatment logic behind port traits.
//!
//! The [`controller`] owns parameters, dose and hardware state; the
//! [`sequencer`] applies queued commands and advances the sweep; the
//! [`queue`] runs it all on one worker thread.  Hardware is reached only
//! through the traits in [`ports`].

pub mod commands;
pub mod controller;
pub mod events;
pub mod parameters;
pub mod ports;
pub mod queue;
pub mod sequencer;
pub mod transmit;
pub mod treatment_clock;
