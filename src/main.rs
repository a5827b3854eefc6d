use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use intcode::amplifier;
use intcode::arcade::{Cabinet, Tile};
use intcode::drone::Drone;
use intcode::{BatchPort, Program, State, Verbosity, Vm, VmConfig};

#[derive(Parser)]
#[command(name = "intcode")]
#[command(about = "Integer-instruction VM and its hosts")]
struct Cli {
    /// JSON file with executor settings
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Executor verbosity; repeat for more detail (overrides the config file)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program with batch input and print its outputs
    Run {
        program: PathBuf,
        /// Comma-separated input values
        #[arg(short, long, value_delimiter = ',', allow_negative_numbers = true)]
        input: Vec<i64>,
        /// Write a JSON snapshot of the final machine state
        #[arg(long)]
        dump: Option<PathBuf>,
    },
    /// Run the amplifier chain for one phase setting
    Amplify {
        program: PathBuf,
        #[arg(short, long, value_delimiter = ',', required = true)]
        phases: Vec<i64>,
        /// Wire the stages in a feedback ring
        #[arg(long)]
        feedback: bool,
    },
    /// Ask the drone program whether a point is in the beam
    Probe {
        program: PathBuf,
        x: i64,
        y: i64,
    },
    /// Count beam cells over a grid
    Scan {
        program: PathBuf,
        #[arg(long, default_value_t = 50)]
        width: i64,
        #[arg(long, default_value_t = 50)]
        height: i64,
    },
    /// Run the arcade program once and count the blocks it draws
    Arcade { program: PathBuf },
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

fn load(path: &Path) -> Result<Program> {
    Program::from_file(path).with_context(|| format!("loading {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => VmConfig::load_from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => VmConfig::default(),
    };
    if cli.verbose > 0 {
        config.verbosity = Verbosity::from_level(cli.verbose);
    }

    match cli.command {
        Commands::Run {
            program,
            input,
            dump,
        } => {
            let program = load(&program)?;
            let mut vm = Vm::new(&program, config);
            let mut port = BatchPort::new(input);
            let state = vm.run(&mut port);
            info!(id = %vm.id(), steps = vm.steps(), ?state, "run finished");

            if let Some(path) = dump {
                vm.snapshot()
                    .save_to_file(&path)
                    .with_context(|| format!("writing snapshot {}", path.display()))?;
            }
            let outputs: Vec<String> = port.outputs().iter().map(|v| v.to_string()).collect();
            println!("{}", outputs.join(","));
            if let State::Faulted(fault) = state {
                bail!("program faulted: {}", fault);
            }
        }

        Commands::Amplify {
            program,
            phases,
            feedback,
        } => {
            let program = load(&program)?;
            let signal = if feedback {
                amplifier::run_feedback_with(&program, &phases, config)?
            } else {
                amplifier::run_chain_with(&program, &phases, config)?
            };
            println!("{}", signal);
        }

        Commands::Probe { program, x, y } => {
            let drone = Drone::with_config(load(&program)?, config);
            println!("{}", if drone.probe(x, y)? { 1 } else { 0 });
        }

        Commands::Scan {
            program,
            width,
            height,
        } => {
            let drone = Drone::with_config(load(&program)?, config);
            println!("{}", drone.scan(width, height)?);
        }

        Commands::Arcade { program } => {
            let mut cabinet = Cabinet::with_config(load(&program)?, config);
            cabinet.play(|_| 0)?;
            println!("{}", cabinet.count(Tile::Block));
        }
    }

    Ok(())
}
