//! Concrete sequencer handlers and table builder.
//!
//! ```text
//!          START                         [last frequency done]
//!  IDLE ───────────▶ RUNNING ─────────────────────────────▶ IDLE
//!    ▲                 │  ▲                                  (Ended)
//!    │   STOP/RESET    │  │ [duration reached]
//!    └─────────────────┘  └── stop, index += 1, start next ──┘
//! ```
//!
//! Only `RUNNING` does work per poll: it watches elapsed time for the
//! current frequency and advances the sweep.

use log::{debug, info};

use crate::app::events::ControlEvent;
use crate::dose;
use crate::error::Result;

use super::context::{SweepContext, TREATMENT_COMPLETE};
use super::{StateDescriptor, StateId};

/// Polls between progress lines in the debug log.
const PROGRESS_EVERY: u64 = 50;

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the state table.  Called once per worker start.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0: Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1: Running
        StateDescriptor {
            id: StateId::Running,
            name: "Running",
            on_enter: Some(running_enter),
            on_exit: None,
            on_update: running_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut SweepContext) {
    info!(
        "IDLE: sweep parked at index {} ({} frequencies selected)",
        ctx.frequency_index,
        ctx.controller.parameters().frequencies_khz.len()
    );
}

fn idle_update(_ctx: &mut SweepContext) -> Result<Option<StateId>> {
    Ok(None)
}

// ═══════════════════════════════════════════════════════════════════════════
//  RUNNING state: auto-advance through the selected frequencies
// ═══════════════════════════════════════════════════════════════════════════

fn running_enter(ctx: &mut SweepContext) {
    info!(
        "RUNNING: {} per frequency",
        dose::format_clock(ctx.controller.parameters().duration.as_secs_f64())
    );
}

fn running_update(ctx: &mut SweepContext) -> Result<Option<StateId>> {
    let elapsed = ctx.controller.check_treatment_time();
    let duration = ctx.controller.parameters().duration;

    if elapsed < duration {
        if ctx.polls_in_state % PROGRESS_EVERY == 0 {
            debug!(
                "RUNNING: {} / {} at index {}",
                dose::format_clock(elapsed.as_secs_f64()),
                dose::format_clock(duration.as_secs_f64()),
                ctx.frequency_index
            );
        }
        ctx.notify(&ControlEvent::Waiting { elapsed, duration });
        return Ok(None);
    }

    info!(
        "RUNNING: {:?} kHz complete after {}",
        ctx.controller.frequency_khz(),
        dose::format_clock(elapsed.as_secs_f64())
    );
    ctx.controller.stop_treatment(true, None)?;

    let next = ctx.frequency_index + 1;
    if ctx.start_frequency_from(next)? {
        return Ok(None);
    }

    ctx.notify(&ControlEvent::Ended(TREATMENT_COMPLETE.into()));
    Ok(Some(StateId::Idle))
}
