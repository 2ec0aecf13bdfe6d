//! Foreground handle on the treatment worker.
//!
//! [`ControlQueue`] owns the command channel, the worker thread and the
//! status snapshot it publishes.  The [`SweepContext`] (and with it the
//! [`Controller`]) lives on the worker while it runs and returns to the
//! queue when the worker is joined.
//!
//! ```text
//!   foreground                         worker thread
//!  ─────────────                      ───────────────
//!   open()/start()/…  ──try_send──▶  CommandChannel ──▶ Sequencer
//!   status()          ◀──RwLock───   publish(snapshot)
//!   kill()            ──KILL + join──▶ SweepContext handed back
//! ```

use std::mem;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{error, info, warn};

use crate::dose::PowerMode;
use crate::error::{Error, Result};
use crate::fsm::context::SweepContext;

use super::commands::ControlCommand;
use super::controller::Controller;
use super::events::ControllerStatus;
use super::ports::Notifier;
use super::sequencer::{self, CommandChannel, Sequencer};

const WORKER_NAME: &str = "treatment-worker";

enum WorkerSlot {
    /// Not started; the context is parked here.
    Idle(Box<SweepContext>),
    Running(JoinHandle<SweepContext>),
    /// The worker thread died without handing the context back.
    Lost,
}

pub struct ControlQueue {
    channel: Arc<CommandChannel>,
    status: Arc<RwLock<ControllerStatus>>,
    worker: WorkerSlot,
    poll_interval: Duration,
}

impl ControlQueue {
    /// Park `controller` and `notifier` in a not-yet-started worker.
    pub fn new(controller: Controller, notifier: Box<dyn Notifier>) -> Self {
        let poll_interval = controller.config().poll_interval();
        let ctx = SweepContext::new(controller, notifier);
        let status = ctx.status(crate::fsm::StateId::Idle);
        Self {
            channel: Arc::new(CommandChannel::new()),
            status: Arc::new(RwLock::new(status)),
            worker: WorkerSlot::Idle(Box::new(ctx)),
            poll_interval,
        }
    }

    /// Spawn the worker thread.  A worker that already exited (after a
    /// fault) is reclaimed first.
    pub fn start_worker(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("QUEUE | worker already running");
            return Ok(());
        }
        if matches!(self.worker, WorkerSlot::Running(_)) {
            self.reclaim()?;
        }
        let ctx = match mem::replace(&mut self.worker, WorkerSlot::Lost) {
            WorkerSlot::Idle(ctx) => ctx,
            other => {
                self.worker = other;
                return Err(Error::WorkerFault("worker context lost".into()));
            }
        };

        let channel = Arc::clone(&self.channel);
        let status = Arc::clone(&self.status);
        let poll_interval = self.poll_interval;
        let seq = Sequencer::new(*ctx);
        let handle = thread::Builder::new()
            .name(WORKER_NAME.into())
            .spawn(move || sequencer::run_worker(seq, channel, status, poll_interval))?;
        self.worker = WorkerSlot::Running(handle);
        info!("QUEUE | worker started (poll {poll_interval:?})");
        Ok(())
    }

    /// Whether the worker thread is alive and accepting commands.
    pub fn is_running(&self) -> bool {
        matches!(&self.worker, WorkerSlot::Running(h) if !h.is_finished())
    }

    // ── Commands ──────────────────────────────────────────────

    pub fn open(&self) -> Result<()> {
        self.enqueue(ControlCommand::Open)
    }

    pub fn close(&self) -> Result<()> {
        self.enqueue(ControlCommand::Close)
    }

    pub fn start(&self) -> Result<()> {
        self.enqueue(ControlCommand::Start)
    }

    pub fn pause(&self) -> Result<()> {
        self.enqueue(ControlCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.enqueue(ControlCommand::Resume)
    }

    pub fn stop(&self) -> Result<()> {
        self.enqueue(ControlCommand::Stop)
    }

    pub fn reset(&self) -> Result<()> {
        self.enqueue(ControlCommand::Reset)
    }

    pub fn treat(&self) -> Result<()> {
        self.enqueue(ControlCommand::Treat)
    }

    pub fn set_frequencies(&self, frequencies_khz: Vec<u32>) -> Result<()> {
        self.submit(ControlCommand::SetFrequencies(frequencies_khz))
    }

    pub fn set_power_mode(&self, mode: PowerMode) -> Result<()> {
        self.submit(ControlCommand::SetPowerMode(mode))
    }

    pub fn set_power_value(&self, value: f64) -> Result<()> {
        self.submit(ControlCommand::SetPowerValue(value))
    }

    pub fn set_pressure(&self, value: f64) -> Result<()> {
        self.submit(ControlCommand::SetPressure(value))
    }

    pub fn set_burst_length(&self, burst_length_s: f64) -> Result<()> {
        self.submit(ControlCommand::SetBurstLength(burst_length_s))
    }

    pub fn set_duty_cycle(&self, duty_cycle: f64) -> Result<()> {
        self.submit(ControlCommand::SetDutyCycle(duty_cycle))
    }

    pub fn set_duration(&self, duration: Duration) -> Result<()> {
        self.submit(ControlCommand::SetDuration(duration))
    }

    pub fn set_simulate(&self, simulate: bool) -> Result<()> {
        self.submit(ControlCommand::SetSimulate(simulate))
    }

    /// Validate, then enqueue.
    pub fn submit(&self, cmd: ControlCommand) -> Result<()> {
        cmd.validate()?;
        self.enqueue(cmd)
    }

    fn enqueue(&self, cmd: ControlCommand) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let name = cmd.name();
        self.channel.try_send(cmd).map_err(|_| {
            warn!("QUEUE | channel full, dropping {name}");
            Error::QueueFull
        })
    }

    // ── Shutdown ──────────────────────────────────────────────

    /// Stop the worker and wait for it.  The hardware is closed, `Closed`
    /// is notified, and the queue is left with a fresh, not-started worker.
    pub fn kill(&mut self) -> Result<()> {
        let WorkerSlot::Running(handle) = &self.worker else {
            warn!("QUEUE | kill: worker not running");
            return Ok(());
        };
        while !handle.is_finished() {
            if self.channel.try_send(ControlCommand::Kill).is_ok() {
                break;
            }
            thread::sleep(self.poll_interval);
        }
        self.reclaim()
    }

    /// Join a running or finished worker and park its context.
    fn reclaim(&mut self) -> Result<()> {
        let WorkerSlot::Running(handle) = mem::replace(&mut self.worker, WorkerSlot::Lost) else {
            return Ok(());
        };
        let ctx = handle.join().map_err(|_| {
            error!("QUEUE | worker thread panicked outside the sequencer");
            Error::WorkerFault("worker thread panicked".into())
        })?;

        let mut stale = 0usize;
        while self.channel.try_receive().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            warn!("QUEUE | discarded {stale} stale command(s)");
        }
        sequencer::publish(&self.status, ctx.status(crate::fsm::StateId::Idle));
        self.worker = WorkerSlot::Idle(Box::new(ctx));
        info!("QUEUE | worker stopped");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Latest snapshot published by the worker.
    pub fn status(&self) -> ControllerStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The parked controller, available while the worker is not running.
    pub fn controller(&self) -> Option<&Controller> {
        match &self.worker {
            WorkerSlot::Idle(ctx) => Some(&ctx.controller),
            _ => None,
        }
    }

    pub fn controller_mut(&mut self) -> Option<&mut Controller> {
        match &mut self.worker {
            WorkerSlot::Idle(ctx) => Some(&mut ctx.controller),
            _ => None,
        }
    }
}

impl Drop for ControlQueue {
    fn drop(&mut self) {
        if matches!(self.worker, WorkerSlot::Running(_)) {
            if let Err(e) = self.kill() {
                error!("QUEUE | kill on drop: {e}");
            }
        }
    }
}
