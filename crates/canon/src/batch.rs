//! Batch G-code processor: the `canon batch` subcommand.
//!
//! Reads a file line by line and prints the resulting low-level commands,
//! driving a full canon→planner→runtime→prep pipeline run the same way the
//! `run` subcommand does against a real backend — `batch` differs only in
//! reading from a file with no interactive loop.

use anyhow::{Context, Result};
use canon::config::{InMemoryConfigStore, MachineConfig};
use canon::machine::CanonicalMachine;
use canon::Dispatcher;
use clap::Parser;
use motion::kinematics::AXES;
use motion::Planner;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::demo_gcode::{apply_demo_command, parse_line, DemoCommand};
use crate::pipeline::{self, ConsoleBackend};

/// Arguments for the `batch` subcommand.
#[derive(Parser, Debug)]
pub struct BatchArgs {
    /// Path to the G-code file to process.
    #[arg(required = true)]
    gcode_file: PathBuf,

    /// Steps per mm/degree for each axis, comma-separated (X,Y,Z,A,B,C).
    #[arg(long, value_delimiter = ',', default_value = "80,80,400,1,1,1")]
    steps_per_unit: Vec<f64>,
}

/// Runs the batch processing logic: loads a (default, in-memory) machine
/// config, parses each line of `args.gcode_file` with the demo line
/// splitter, dispatches it against the canonical machine, and drains the
/// planner to completion against a logging stepper backend.
pub fn run_batch_processing(args: BatchArgs) -> Result<()> {
    info!(file = ?args.gcode_file, "starting batch processing");

    let store = InMemoryConfigStore::new();
    let config = MachineConfig::load(&store);

    let mut cm = CanonicalMachine::new();
    cm.axes = config.axes;
    cm.offset = config.offsets;

    let mut planner = Planner::new();

    let file = File::open(&args.gcode_file)
        .with_context(|| format!("failed to open G-code file: {:?}", args.gcode_file))?;
    let reader = BufReader::new(file);

    let mut steps_per_unit = [0.0f64; AXES];
    for (i, v) in args.steps_per_unit.iter().take(AXES).enumerate() {
        steps_per_unit[i] = *v;
    }

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        for command in parse_line(&line) {
            if command == DemoCommand::Unrecognized {
                continue;
            }
            let mut dispatcher = Dispatcher::new(&mut cm, &mut planner);
            if let Err(e) = apply_demo_command(&mut dispatcher, command) {
                warn!(line = line_num + 1, error = %e, "command rejected");
            }
        }
    }

    let mut backend = ConsoleBackend::default();
    pipeline::run_to_completion(&mut cm, &mut planner, &steps_per_unit, &mut backend);

    info!(step_counts = ?backend.step_counts, "batch processing finished");
    Ok(())
}

