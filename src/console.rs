//! Line-oriented operator console.
//!
//! One command per line.  Treatment commands are forwarded to the
//! [`ControlQueue`]; `status` and `report` are answered locally from the
//! published snapshot and a mirror of the parameters sent so far.
//!
//! ```text
//!   open | close | start | pause | resume | stop | abort | reset | treat
//!   freqs 100,150      mode constant_mi     power 80      pressure 80
//!   burst 40 (ms)      duty 10 (%)          duration 120 (s)
//!   simulate on|off    status               report        help | quit
//! ```

use std::time::Duration;

use crate::app::events::ControllerStatus;
use crate::app::parameters::{self, TreatmentParameters};
use crate::app::queue::ControlQueue;
use crate::config::SystemConfig;
use crate::dose::{self, PowerMode};
use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::safety::DoseWarning;

#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Open,
    Close,
    Start,
    Pause,
    Resume,
    Stop,
    /// Stop and rewind to the first frequency.
    Abort,
    Reset,
    Treat,
    Frequencies(Vec<u32>),
    Mode(PowerMode),
    Power(f64),
    Pressure(f64),
    /// Burst length in seconds (entered in ms).
    BurstLength(f64),
    /// Duty cycle as a fraction (entered in %).
    DutyCycle(f64),
    Duration(Duration),
    Simulate(bool),
    Status,
    Report,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  open | close                 connect / release instruments
  start | pause | resume       sweep control
  stop | abort | reset | treat
  freqs <kHz,...>              select frequencies
  mode <power mode>            constant_mi, constant_pressure, constant_isppa,
                               constant_ispta, constant_ispta_mi100
  power <value>                power value (units depend on mode)
  pressure <value>             power value, applied immediately
  burst <ms>                   burst length
  duty <%>                     duty cycle
  duration <s>                 treatment time per frequency
  simulate on|off              only while closed
  status | report | help | quit";

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfiguration(msg.into())
}

fn number(arg: Option<&str>, what: &str) -> Result<f64> {
    let arg = arg.ok_or_else(|| invalid(format!("{what}: missing value")))?;
    arg.parse::<f64>()
        .map_err(|_| invalid(format!("{what}: {arg:?} is not a number")))
}

impl ConsoleCommand {
    /// Parse one input line.  Blank lines and `#` comments yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (word, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();
        let arg = (!rest.is_empty()).then_some(rest);

        let cmd = match word.to_ascii_lowercase().as_str() {
            "open" => Self::Open,
            "close" => Self::Close,
            "start" => Self::Start,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "stop" => Self::Stop,
            "abort" => Self::Abort,
            "reset" => Self::Reset,
            "treat" => Self::Treat,
            "freqs" | "frequencies" => {
                let list = rest
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|t| !t.is_empty())
                    .map(|t| {
                        t.parse::<u32>()
                            .map_err(|_| invalid(format!("freqs: {t:?} is not a frequency")))
                    })
                    .collect::<Result<Vec<u32>>>()?;
                Self::Frequencies(list)
            }
            "mode" => {
                let arg = arg.ok_or_else(|| invalid("mode: missing value"))?;
                Self::Mode(arg.parse()?)
            }
            "power" => Self::Power(number(arg, "power")?),
            "pressure" => Self::Pressure(number(arg, "pressure")?),
            "burst" => Self::BurstLength(number(arg, "burst")? / 1e3),
            "duty" => Self::DutyCycle(number(arg, "duty")? / 100.0),
            "duration" => {
                let secs = number(arg, "duration")?;
                let duration = Duration::try_from_secs_f64(secs)
                    .map_err(|_| invalid(format!("duration: {secs} s out of range")))?;
                Self::Duration(duration)
            }
            "simulate" => match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("on" | "true" | "1") => Self::Simulate(true),
                Some("off" | "false" | "0") => Self::Simulate(false),
                _ => return Err(invalid("simulate: expected on or off")),
            },
            "status" => Self::Status,
            "report" => Self::Report,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(invalid(format!("unknown command {other:?}"))),
        };
        Ok(Some(cmd))
    }
}

/// What the front end should do after a command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Queued; results arrive as notifications.
    Queued,
    Lines(Vec<String>),
    Quit,
}

pub struct Console {
    config: SystemConfig,
    profile: Profile,
    params: TreatmentParameters,
}

impl Console {
    pub fn new(config: SystemConfig, profile: Profile) -> Self {
        let params = TreatmentParameters::from_profile(&profile, config.default_power_mode);
        Self {
            config,
            profile,
            params,
        }
    }

    pub fn parameters(&self) -> &TreatmentParameters {
        &self.params
    }

    pub fn execute(&mut self, cmd: ConsoleCommand, queue: &ControlQueue) -> Result<Reply> {
        match cmd {
            ConsoleCommand::Open => queue.open()?,
            ConsoleCommand::Close => queue.close()?,
            ConsoleCommand::Start => queue.start()?,
            ConsoleCommand::Pause => queue.pause()?,
            ConsoleCommand::Resume => queue.resume()?,
            ConsoleCommand::Stop => queue.stop()?,
            ConsoleCommand::Abort => {
                queue.stop()?;
                queue.reset()?;
            }
            ConsoleCommand::Reset => queue.reset()?,
            ConsoleCommand::Treat => queue.treat()?,
            ConsoleCommand::Frequencies(f) => {
                parameters::validate_frequencies(&f)?;
                queue.set_frequencies(f.clone())?;
                self.params.frequencies_khz = f;
            }
            ConsoleCommand::Mode(mode) => {
                queue.set_power_mode(mode)?;
                self.params.power_mode = mode;
            }
            ConsoleCommand::Power(v) => {
                self.params.power_mode.settings().validate(v)?;
                queue.set_power_value(v)?;
                self.params.power_value = v;
            }
            ConsoleCommand::Pressure(v) => {
                self.params.power_mode.settings().validate(v)?;
                queue.set_pressure(v)?;
                self.params.power_value = v;
            }
            ConsoleCommand::BurstLength(s) => {
                queue.set_burst_length(s)?;
                self.params.burst_length_s = s;
            }
            ConsoleCommand::DutyCycle(d) => {
                queue.set_duty_cycle(d)?;
                self.params.duty_cycle = d;
            }
            ConsoleCommand::Duration(d) => {
                queue.set_duration(d)?;
                self.params.duration = d;
            }
            ConsoleCommand::Simulate(b) => queue.set_simulate(b)?,
            ConsoleCommand::Status => return Ok(Reply::Lines(status_lines(&queue.status()))),
            ConsoleCommand::Report => {
                return Ok(Reply::Lines(report_lines(
                    &self.profile,
                    &self.config,
                    &self.params,
                )));
            }
            ConsoleCommand::Help => return Ok(Reply::Lines(vec![HELP.to_string()])),
            ConsoleCommand::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Queued)
    }
}

pub fn status_lines(s: &ControllerStatus) -> Vec<String> {
    let mut lines = vec![
        format!(
            "connection: {}{}",
            s.connection,
            if s.simulate { " (simulated)" } else { "" }
        ),
        format!("ready: {}  treating: {}", s.ready, s.treating),
        format!("sequence: {:?} at index {}", s.sequence, s.frequency_index),
        match s.frequency_khz {
            Some(f) => format!("frequency: {f} kHz at {:.4} Vpp", s.voltage_vpp),
            None => "frequency: -".to_string(),
        },
        format!("elapsed: {}", dose::format_clock(s.elapsed.as_secs_f64())),
    ];
    lines.extend(DoseWarning::from_flags(s.warnings).map(|w| format!("warning: {w}")));
    lines
}

/// Per-frequency dose table for the profile under `params`.
pub fn report_lines(
    profile: &Profile,
    config: &SystemConfig,
    params: &TreatmentParameters,
) -> Vec<String> {
    let settings = params.power_mode.settings();
    let mut lines = vec![
        format!(
            "{} | {} = {} {} | burst {} ms @ {}% | {} per frequency",
            profile.name,
            settings.label,
            params.power_value,
            settings.units,
            params.burst_length_s * 1e3,
            params.duty_cycle * 100.0,
            dose::format_clock(params.duration.as_secs_f64()),
        ),
        format!(
            "{:>6} {:>9} {:>8} {:>6} {:>8} {:>9} {:>9} {:>8}  flags",
            "kHz", "kPa", "Vpp", "MI", "ISPPA", "ISPTA", "burst ms", "duty %"
        ),
    ];
    let request = params.dose_request();
    for &f in &profile.frequencies_khz {
        let line = match dose::evaluate_frequency(f, &request, &profile.calibration, config.amplifier_gain)
        {
            Ok(d) => format!(
                "{:>6} {:>9.1} {:>8.4} {:>6.2} {:>8.2} {:>9.1} {:>9.3} {:>8.2}  {}",
                f,
                d.pressure_kpa,
                d.input_voltage,
                d.mechanical_index,
                d.isppa,
                d.ispta,
                d.burst_length_s * 1e3,
                d.duty_cycle * 100.0,
                if d.has_warnings() { "!" } else { "" }
            ),
            Err(e) => format!("{f:>6} {e}"),
        };
        lines.push(line);
    }
    lines
}
