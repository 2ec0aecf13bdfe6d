//! Command sequencer: applies queued commands and drives the sweep FSM.
//!
//! ```text
//!  CommandChannel ──▶ ┌────────────────────────────┐ ──▶ Notifier
//!   (FIFO, bounded)   │  Sequencer                 │
//!                     │  Fsm · SweepContext        │
//!                     │  (Controller inside)       │
//!                     └────────────────────────────┘
//! ```
//!
//! [`Sequencer`] is synchronous and single-threaded; [`run_worker`] is the
//! loop the [`ControlQueue`](super::queue::ControlQueue) spawns around it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{error, info, warn};

use crate::error::{Error, Result};
use crate::fsm::context::{SweepContext, TREATMENT_COMPLETE};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};

use super::commands::ControlCommand;
use super::events::{ControlEvent, ControllerStatus};

/// Commands buffered between the foreground and the worker.
pub const QUEUE_DEPTH: usize = 16;

/// Bounded MPMC channel carrying commands to the worker.
pub type CommandChannel = Channel<CriticalSectionRawMutex, ControlCommand, QUEUE_DEPTH>;

/// Whether the worker loop should keep going after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

// ───────────────────────────────────────────────────────────────
// Sequencer
// ───────────────────────────────────────────────────────────────

pub struct Sequencer {
    fsm: Fsm,
    ctx: SweepContext,
}

impl Sequencer {
    /// Wrap a context.  The FSM starts in `Idle`; call [`start`](Self::start)
    /// before the first command.
    pub fn new(ctx: SweepContext) -> Self {
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx,
        }
    }

    pub fn start(&mut self) {
        self.fsm.start(&mut self.ctx);
    }

    /// Apply one command.  Errors propagate to the worker, which treats them
    /// as fatal.
    pub fn handle_command(&mut self, cmd: ControlCommand) -> Result<Flow> {
        info!("SEQ | command {}", cmd.name());
        let controller = &mut self.ctx.controller;
        match cmd {
            ControlCommand::Open => {
                controller.open()?;
                let status = self.status();
                self.ctx.notify(&ControlEvent::Opened(status));
            }
            ControlCommand::Close => {
                if controller.is_treating() {
                    controller.stop_treatment(true, None)?;
                }
                controller.close()?;
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            }
            ControlCommand::Start => {
                // Restarting mid-sweep: the first frequency gets its full duration.
                if controller.is_treating() {
                    controller.stop_treatment(true, None)?;
                }
                self.ctx.frequency_index = 0;
                if self.ctx.start_frequency_from(0)? {
                    self.fsm.force_transition(StateId::Running, &mut self.ctx);
                } else {
                    warn!("SEQ | no treatable frequency selected");
                    self.ctx.frequency_index = 0;
                    self.ctx.notify(&ControlEvent::Ended(TREATMENT_COMPLETE.into()));
                    self.fsm.force_transition(StateId::Idle, &mut self.ctx);
                }
            }
            ControlCommand::Pause => controller.stop_treatment(false, None)?,
            ControlCommand::Resume => {
                controller.start_treatment(false)?;
                self.fsm.force_transition(StateId::Running, &mut self.ctx);
            }
            ControlCommand::Stop => {
                controller.stop_treatment(true, None)?;
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            }
            ControlCommand::Reset => {
                self.ctx.frequency_index = 0;
                self.fsm.force_transition(StateId::Idle, &mut self.ctx);
            }
            ControlCommand::Treat => {
                let duration = controller.parameters().duration;
                controller.start_treatment(true)?;
                controller.stop_treatment(true, Some(duration))?;
            }
            ControlCommand::Kill => return Ok(Flow::Exit),

            ControlCommand::SetFrequencies(f) => controller.set_frequencies(f)?,
            ControlCommand::SetPowerMode(m) => controller.set_power_mode(m)?,
            ControlCommand::SetPowerValue(v) => controller.set_power_value(v)?,
            ControlCommand::SetPressure(v) => controller.set_pressure(v)?,
            ControlCommand::SetBurstLength(s) => controller.set_burst_length(s)?,
            ControlCommand::SetDutyCycle(d) => controller.set_duty_cycle(d)?,
            ControlCommand::SetDuration(d) => controller.set_duration(d)?,
            ControlCommand::SetSimulate(b) => controller.set_simulate(b)?,
        }
        Ok(Flow::Continue)
    }

    /// One poll with no command pending.
    pub fn poll(&mut self) -> Result<()> {
        self.fsm.tick(&mut self.ctx)
    }

    /// Park the FSM and release the hardware, notifying `Closed` (or the
    /// close failure).
    pub fn shutdown(&mut self) {
        self.fsm.force_transition(StateId::Idle, &mut self.ctx);
        match self.ctx.controller.close() {
            Ok(()) => self.ctx.notify(&ControlEvent::Closed),
            Err(e) => {
                error!("SEQ | close during shutdown failed: {e}");
                self.ctx.notify(&ControlEvent::Error(e));
            }
        }
    }

    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    pub fn status(&self) -> ControllerStatus {
        self.ctx.status(self.fsm.current_state())
    }

    pub fn context(&self) -> &SweepContext {
        &self.ctx
    }

    pub fn into_context(self) -> SweepContext {
        self.ctx
    }

    fn wait(&self, duration: Duration) {
        self.ctx.controller.wait(duration);
    }
}

// ───────────────────────────────────────────────────────────────
// Worker loop
// ───────────────────────────────────────────────────────────────

/// Body of the worker thread.  Returns the context for reuse once the loop
/// exits, whether by `Kill` or by a fault.
pub fn run_worker(
    mut seq: Sequencer,
    channel: Arc<CommandChannel>,
    status: Arc<RwLock<ControllerStatus>>,
    poll_interval: Duration,
) -> SweepContext {
    seq.start();
    publish(&status, seq.status());

    let fault = loop {
        let (step, idle) = match channel.try_receive() {
            Ok(cmd) => (guarded(|| seq.handle_command(cmd)), false),
            Err(_) => (guarded(|| seq.poll().map(|()| Flow::Continue)), true),
        };
        publish(&status, seq.status());
        match step {
            Ok(Flow::Continue) => {}
            Ok(Flow::Exit) => break None,
            Err(e) => break Some(e),
        }
        if idle {
            seq.wait(poll_interval);
        }
    };

    if let Some(e) = fault {
        error!("SEQ | worker fault: {e}");
        if let Err(notify) = guarded(|| {
            seq.ctx.notify(&ControlEvent::Error(e));
            Ok(())
        }) {
            error!("SEQ | fault notification: {notify}");
        }
    }
    info!("SEQ | worker shutting down");
    if let Err(e) = guarded(|| {
        seq.shutdown();
        Ok(())
    }) {
        error!("SEQ | shutdown: {e}");
    }
    publish(&status, seq.status());
    seq.into_context()
}

pub(crate) fn publish(status: &RwLock<ControllerStatus>, snapshot: ControllerStatus) {
    *status.write().unwrap_or_else(PoisonError::into_inner) = snapshot;
}

/// Run `f`, turning a panic into [`Error::WorkerFault`].
fn guarded<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(Error::WorkerFault(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
