//! Integration test driver for `tests/integration/` submodules.
//!
//! Each `mod` below maps to a file that exercises one layer against the
//! mock instruments in [`mock_hw`].  No hardware required.

mod adapter_tests;
mod controller_tests;
mod queue_tests;
mod sequencer_tests;
