//! oncolysis-ctl: operator entry point.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FunctionGenerator   RfSwitch × N   SystemClock   LogNotifier  │
//! │  (SignalSource)      (Routing)      (Clock)       (Notifier)   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  ControlQueue ─▶ worker: Sequencer · Controller        │    │
//! │  │                  dose model · safety · FSM             │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Console (stdin, one command per line)                         │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use log::{error, info, warn};

use oncolysis::adapters::{self, discovery::PortScanner, discovery::SystemPortScanner, discovery::UsbFilter};
use oncolysis::adapters::log_sink::LogNotifier;
use oncolysis::adapters::time::SystemClock;
use oncolysis::app::controller::Controller;
use oncolysis::app::parameters::TreatmentParameters;
use oncolysis::app::ports::AcceptSimulation;
use oncolysis::app::queue::ControlQueue;
use oncolysis::config::SystemConfig;
use oncolysis::console::{self, Console, ConsoleCommand, Reply};
use oncolysis::profile::{self, Profile};

#[derive(Parser)]
#[command(name = "oncolysis-ctl", version, about = "Focused-ultrasound oncolysis treatment controller")]
struct Cli {
    /// More log output (-v debug, -vv trace).  RUST_LOG overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the treatment worker and read console commands from stdin
    Run(RunArgs),
    /// Print the per-frequency dose table for the profile defaults
    Report(SetupArgs),
    /// List USB serial ports
    Ports,
    /// List built-in profiles
    Profiles,
}

#[derive(Args)]
struct SetupArgs {
    /// Built-in profile id
    #[arg(long, default_value = profile::DEFAULT_PROFILE)]
    profile: String,

    /// Profile JSON file (takes precedence over --profile)
    #[arg(long)]
    profile_file: Option<PathBuf>,

    /// System configuration JSON file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    setup: SetupArgs,

    /// Never touch the hardware
    #[arg(long)]
    simulate: bool,

    /// Fall back to simulation when the instruments cannot be reached
    #[arg(long)]
    fallback_simulate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Command::Run(args) => run(&args),
        Command::Report(setup) => report(&setup),
        Command::Ports => ports(),
        Command::Profiles => {
            for id in profile::BUILTIN_PROFILES {
                let p = Profile::builtin(id)?;
                println!("{id:<16} {} ({} frequencies)", p.name, p.frequencies_khz.len());
            }
            Ok(())
        }
    }
}

fn load(setup: &SetupArgs) -> Result<(SystemConfig, Profile)> {
    let config = match &setup.config {
        Some(path) => SystemConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SystemConfig::default(),
    };
    let profile = match &setup.profile_file {
        Some(path) => {
            Profile::load(path).with_context(|| format!("loading profile {}", path.display()))?
        }
        None => Profile::builtin(&setup.profile)?,
    };
    Ok((config, profile))
}

fn run(args: &RunArgs) -> Result<()> {
    let (config, profile) = load(&args.setup)?;
    info!("oncolysis-ctl v{} | profile {}", env!("CARGO_PKG_VERSION"), profile.id);

    let instruments = adapters::serial_instruments(&config, &profile);
    let mut controller = Controller::new(
        config.clone(),
        profile.clone(),
        instruments,
        Box::new(SystemClock::new()),
    )?
    .with_simulate(args.simulate);
    if args.fallback_simulate {
        controller = controller.with_fallback(Box::new(AcceptSimulation));
    }

    let mut queue = ControlQueue::new(controller, Box::new(LogNotifier::new()));
    queue.start_worker()?;
    let mut console = Console::new(config, profile);
    println!("{}", console::HELP);

    for line in io::stdin().lock().lines() {
        let line = line?;
        let cmd = match ConsoleCommand::parse(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                warn!("CONSOLE | {e}");
                continue;
            }
        };
        match console.execute(cmd, &queue) {
            Ok(Reply::Queued) => {}
            Ok(Reply::Lines(lines)) => {
                for l in lines {
                    println!("{l}");
                }
            }
            Ok(Reply::Quit) => break,
            Err(e) => error!("CONSOLE | {e}"),
        }
        if !queue.is_running() {
            warn!("CONSOLE | worker stopped, restarting");
            queue.kill()?;
            queue.start_worker()?;
        }
    }

    queue.kill()?;
    Ok(())
}

fn report(setup: &SetupArgs) -> Result<()> {
    let (config, profile) = load(setup)?;
    let params = TreatmentParameters::from_profile(&profile, config.default_power_mode);
    for line in console::report_lines(&profile, &config, &params) {
        println!("{line}");
    }
    Ok(())
}

fn ports() -> Result<()> {
    let config = SystemConfig::default();
    let fgen = UsbFilter::from(config.function_generator);
    let switch = UsbFilter::from(config.rf_switch);
    for port in SystemPortScanner.scan()? {
        let role = if fgen.matches(&port) {
            "  <- function generator"
        } else if switch.matches(&port) {
            "  <- RF switch"
        } else {
            ""
        };
        println!("{port}{role}");
    }
    Ok(())
}
