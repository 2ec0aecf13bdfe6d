//! Focused-ultrasound oncolysis treatment controller.
//!
//! Dose model, instrument adapters, the treatment controller and the
//! worker-thread command sequencer.  Hardware is reached only through the
//! port traits in [`app::ports`], so everything here runs against mocks.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod console;
pub mod dose;
pub mod error;
pub mod fsm;
pub mod profile;
pub mod safety;
pub mod waveform;
