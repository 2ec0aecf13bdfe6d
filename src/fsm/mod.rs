//! Function-pointer finite state machine driving the frequency sweep.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                      │
//! │  ┌─────────┬───────────┬──────────┬────────────────────────────┐ │
//! │  │ StateId │ on_enter  │ on_exit  │ on_update                  │ │
//! │  ├─────────┼───────────┼──────────┼────────────────────────────┤ │
//! │  │ Idle    │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Result<Option<>>  │ │
//! │  │ Running │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Result<Option<>>  │ │
//! │  └─────────┴───────────┴──────────┴────────────────────────────┘ │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The worker calls [`Fsm::tick`] once per poll when no command is pending.
//! `on_update` for the **current** state runs; if it returns
//! `Some(next_id)`, the engine runs `on_exit` for the current state, then
//! `on_enter` for the next.  Commands move the machine directly with
//! [`Fsm::force_transition`].  Update handlers talk to hardware, so unlike
//! enter/exit actions they are fallible.

pub mod context;
pub mod states;

use context::SweepContext;
use log::info;

use crate::error::Result;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Sequencer states.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StateId {
    /// No sweep in progress.
    Idle = 0,
    /// A sweep is in progress; auto-advance is active.
    Running = 1,
}

impl StateId {
    /// Total number of states, used to size the table array.
    pub const COUNT: usize = 2;

    /// Convert an index back to `StateId`.  Out-of-range indices fall back to
    /// `Idle` (asserted in debug builds).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Running,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Idle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
pub type StateActionFn = fn(&mut SweepContext);

/// Signature for the per-poll update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut SweepContext) -> Result<Option<StateId>>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
    /// Monotonic poll counter.
    tick_count: u64,
    /// Poll at which the current state was entered.
    state_entry_tick: u64,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    pub fn start(&mut self, ctx: &mut SweepContext) {
        info!("SEQ | starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one poll.
    ///
    /// An error from `on_update` leaves the state unchanged and is returned
    /// to the worker.
    pub fn tick(&mut self, ctx: &mut SweepContext) -> Result<()> {
        self.tick_count += 1;
        ctx.polls_in_state = self.tick_count - self.state_entry_tick;

        let next = (self.table[self.current].on_update)(ctx)?;

        if let Some(next_id) = next {
            self.transition(next_id, ctx);
        }
        Ok(())
    }

    /// Force an immediate transition (used by command handling).
    /// A transition to the current state is a no-op.
    pub fn force_transition(&mut self, next: StateId, ctx: &mut SweepContext) {
        if next as usize != self.current {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> StateId {
        StateId::from_index(self.current)
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut SweepContext) {
        let next_idx = next_id as usize;

        info!(
            "SEQ | transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.polls_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
