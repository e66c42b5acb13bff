//! # canon
//!
//! Host-side CLI for the canonical-machine motion core: a G-code-free
//! demo front end that drives the same `canon`/`motion`/`stepper` stack a
//! real MCU target runs, against a logging [`pipeline::ConsoleBackend`]
//! instead of GPIO.
//!
//! ## Responsibilities
//!
//! *   Splitting demo G-code text into typed [`Dispatcher`] calls (the real
//!     tokenizer is an excluded collaborator; see [`demo_gcode`]).
//! *   Driving the canonical machine's motion planner and segment runtime
//!     to completion against a console stepper backend.
//! *   Reacting to the line protocol's immediate controls (feedhold, cycle
//!     start, queue flush, hard reset) when running interactively.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use tracing::{info, warn};

use canon::config::{InMemoryConfigStore, MachineConfig};
use canon::machine::CanonicalMachine;
use canon::Dispatcher;
use motion::kinematics::AXES;
use motion::Planner;
use proto::framing::{Frame, ImmediateControl, LineFramer, MAX_LINE_LENGTH};

mod batch;
mod demo_gcode;
mod pipeline;

use demo_gcode::apply_demo_command;
use pipeline::ConsoleBackend;

/// A host-side front end for the canonical-machine motion core.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read demo G-code from stdin, one line at a time, draining the
    /// planner to completion after each line.
    Run(RunArgs),
    /// Process a demo G-code file in a batch and print the resulting step
    /// counts.
    Batch(batch::BatchArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
struct RunArgs {
    /// Steps per mm/degree for each axis, comma-separated (X,Y,Z,A,B,C).
    #[arg(long, value_delimiter = ',', default_value = "80,80,400,1,1,1")]
    steps_per_unit: Vec<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_foreground(args),
        Commands::Batch(args) => batch::run_batch_processing(args),
    }
}

/// Reads raw bytes from stdin through a [`LineFramer`], dispatching demo
/// G-code lines against the canonical machine and reacting to immediate
/// controls as they arrive. Each line's queued motion is drained to
/// completion before the next byte is read — this CLI has no ISR levels
/// to overlap planning and execution across lines the way the real-time
/// firmware target does (§5); that overlap is exercised by the `sim`
/// crate's scenario tests instead.
fn run_foreground(args: RunArgs) -> Result<()> {
    info!("starting canon foreground run");

    let store = InMemoryConfigStore::new();
    let config = MachineConfig::load(&store);

    let mut cm = CanonicalMachine::new();
    cm.axes = config.axes;
    cm.offset = config.offsets;

    let mut planner = Planner::new();

    let mut steps_per_unit = [0.0f64; AXES];
    for (i, v) in args.steps_per_unit.iter().take(AXES).enumerate() {
        steps_per_unit[i] = *v;
    }

    let mut backend = ConsoleBackend::default();
    let mut framer: LineFramer<MAX_LINE_LENGTH> = LineFramer::new();

    let stdin = std::io::stdin();
    let mut handle = stdin.lock();
    let mut byte = [0u8; 1];

    loop {
        let n = handle.read(&mut byte).context("reading stdin")?;
        if n == 0 {
            break;
        }

        match framer.push(byte[0]) {
            Ok(Some(Frame::Immediate(ctl))) => apply_immediate(&mut cm, &mut planner, ctl),
            Ok(Some(Frame::Line(line))) => {
                let line = String::from_utf8_lossy(line).into_owned();
                framer.clear();
                apply_line(&mut cm, &mut planner, &line);

                Dispatcher::new(&mut cm, &mut planner).service_requests();
                pipeline::run_to_completion(&mut cm, &mut planner, &steps_per_unit, &mut backend);
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "framing error, resynchronizing"),
        }
    }

    info!(step_counts = ?backend.step_counts, "foreground run finished");
    Ok(())
}

/// Parses and dispatches one line of demo G-code, warning (not aborting)
/// on a rejected command the way `batch::run_batch_processing` does.
fn apply_line(cm: &mut CanonicalMachine, planner: &mut Planner, line: &str) {
    for command in demo_gcode::parse_line(line) {
        let mut dispatcher = Dispatcher::new(cm, planner);
        if let Err(e) = apply_demo_command(&mut dispatcher, command) {
            warn!(error = %e, "command rejected");
        }
    }
}

/// Applies one intercepted immediate control (§6) to the request flags a
/// hard-reset aside, which maps onto the dispatcher's M112-equivalent
/// hard-alarm entry point rather than a request flag.
fn apply_immediate(cm: &mut CanonicalMachine, planner: &mut Planner, ctl: ImmediateControl) {
    match ctl {
        ImmediateControl::FeedHold => cm.requests.feedhold = true,
        ImmediateControl::CycleStart => cm.requests.cycle_start = true,
        ImmediateControl::QueueFlush => cm.requests.queue_flush = true,
        ImmediateControl::HardReset => Dispatcher::new(cm, planner).hard_alarm(),
        ImmediateControl::XOff | ImmediateControl::XOn => {
            // Flow control is a transport concern outside this crate's
            // scope; stdin has no backpressure to apply it to.
        }
    }
}
