//! continuo: real-time MIDI bridge between a live performer and a
//! music-generation model

mod bridge;
mod config;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use crossbeam_channel::bounded;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use continuo_core::{BarBuffer, ScheduledQueue};
use continuo_services::{
    connect_clock_input, connect_note_input, list_ports, ClockGrid, CommandEngine,
    GenerationWorker, MidiOutputSink, ModelError, PortError,
};

use bridge::{spawn_input_loop, BridgeController};
use config::{default_config_path, load_config, BridgeConfig};

#[derive(Debug, Error)]
enum BridgeError {
    #[error(transparent)]
    Port(#[from] PortError),
    #[error(transparent)]
    Core(#[from] continuo_core::CoreError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("No model command configured (use --model-command or the config file)")]
    NoModelCommand,
}

/// Couple a DAW (as MIDI clock master) to a generative model: capture one
/// measure of playing, generate N measures of continuation, schedule it on
/// the clock grid.
#[derive(Parser)]
#[command(name = "continuo", version)]
struct Cli {
    /// Path to a TOML config file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,
    /// MIDI clock input port
    #[arg(long)]
    clock_in: Option<String>,
    /// Live MIDI input port
    #[arg(long)]
    in_port: Option<String>,
    /// MIDI output port for generated events
    #[arg(long)]
    out_port: Option<String>,
    /// Measures of continuation per cycle
    #[arg(long)]
    measures: Option<u32>,
    /// Beats per measure
    #[arg(long)]
    beats_per_bar: Option<u8>,
    /// Sampling temperature, 0 to 2
    #[arg(long)]
    temperature: Option<f32>,
    /// Nucleus sampling threshold, 0 to 1
    #[arg(long)]
    top_p: Option<f32>,
    /// Resolution assumed for generated MIDI without one
    #[arg(long)]
    ticks_per_beat: Option<u16>,
    /// External generation command line
    #[arg(long)]
    model_command: Option<String>,
    /// List available MIDI ports and exit
    #[arg(long)]
    list_ports: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("continuo=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), BridgeError> {
    if cli.list_ports {
        let (ins, outs) = list_ports()?;
        println!("Input ports:");
        for name in ins {
            println!("  {name}");
        }
        println!("Output ports:");
        for name in outs {
            println!("  {name}");
        }
        return Ok(());
    }

    let config = resolve_config(&cli);
    config.validate()?;

    let model_command = config
        .model_command
        .as_deref()
        .ok_or(BridgeError::NoModelCommand)?;
    let engine = Arc::new(CommandEngine::new(model_command)?);

    info!(
        clock = %config.clock_port,
        input = %config.in_port,
        output = %config.out_port,
        measures = config.grid.measures,
        beats_per_bar = config.grid.beats_per_bar,
        "starting bridge"
    );

    let stop = Arc::new(AtomicBool::new(false));

    // Port connections stay alive for the lifetime of the bridge.
    let (clock_tx, clock_rx) = bounded(1024);
    let _clock_conn = connect_clock_input(&config.clock_port, clock_tx)?;
    let (in_tx, in_rx) = bounded(256);
    let _in_conn = connect_note_input(&config.in_port, in_tx)?;
    let sink = MidiOutputSink::connect(&config.out_port)?;

    let mut clock_grid = ClockGrid::spawn(clock_rx, stop.clone());
    let worker = GenerationWorker::spawn(engine);
    let bars = Arc::new(BarBuffer::new(config.grid.pulses_per_bar()));
    let queue = Arc::new(ScheduledQueue::new());

    let input_handle = spawn_input_loop(in_rx, clock_grid.state(), bars.clone(), stop.clone());

    let mut controller = BridgeController::new(
        &config,
        clock_grid.state(),
        bars,
        queue,
        worker,
        Box::new(sink),
    );
    controller.run(&stop);

    // The stop flag is already up (fatal port error); unwind the threads.
    let _ = input_handle.join();
    clock_grid.join();
    info!("bridge stopped");
    Ok(())
}

fn resolve_config(cli: &Cli) -> BridgeConfig {
    let path = cli.config.clone().unwrap_or_else(default_config_path);
    let mut config = load_config(&path);

    if let Some(v) = &cli.clock_in {
        config.clock_port = v.clone();
    }
    if let Some(v) = &cli.in_port {
        config.in_port = v.clone();
    }
    if let Some(v) = &cli.out_port {
        config.out_port = v.clone();
    }
    if let Some(v) = cli.measures {
        config.grid.measures = v;
    }
    if let Some(v) = cli.beats_per_bar {
        config.grid.beats_per_bar = v;
    }
    if let Some(v) = cli.temperature {
        config.sampling.temperature = v;
    }
    if let Some(v) = cli.top_p {
        config.sampling.top_p = v;
    }
    if let Some(v) = cli.ticks_per_beat {
        config.ticks_per_beat = v;
    }
    if let Some(v) = &cli.model_command {
        config.model_command = Some(v.clone());
    }
    config
}
