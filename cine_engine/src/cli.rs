use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use cine_engine::script::GameVariant;
use cine_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(
    about = "Runs Cine procedure and object scripts tick by tick against a recording host",
    version
)]
pub struct Args {
    /// Procedure file (.PRC) holding the global scripts
    #[arg(long)]
    pub prc: Option<String>,

    /// Relation file (.REL) holding the object scripts
    #[arg(long)]
    pub rel: Option<String>,

    /// Object table (.OBJ) used to seed object parameters
    #[arg(long)]
    pub obj: Option<String>,

    /// Part bundle to resolve file names against instead of --data-dir
    #[arg(long)]
    pub part: Option<PathBuf>,

    /// Directory holding loose game files
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Optional JSON engine configuration
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Game whose opcode table is used (overrides the config file)
    #[arg(long, value_enum)]
    pub variant: Option<GameVariant>,

    /// Seed for the random operand (overrides the config file)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of ticks to run (overrides the config file)
    #[arg(long)]
    pub ticks: Option<u32>,

    /// Procedure enqueued at boot (overrides the config file)
    #[arg(long)]
    pub boot_script: Option<u16>,

    /// Instructions one instance may run per tick before it is aborted
    #[arg(long)]
    pub budget: Option<u32>,

    /// Print a listing of every script instead of running them
    #[arg(long)]
    pub disassemble: bool,

    /// Report jumps to labels the image never defines (with --disassemble)
    #[arg(long)]
    pub validate: bool,

    /// Path to write the per-tick reports as JSON
    #[arg(long)]
    pub report_json: Option<PathBuf>,

    /// Path to write the host event log as JSON
    #[arg(long)]
    pub event_log_json: Option<PathBuf>,

    /// Path to write the final engine state as JSON
    #[arg(long)]
    pub state_json: Option<PathBuf>,
}

/// Where script and table files are read from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Directory(PathBuf),
    Part(PathBuf),
}

#[derive(Debug)]
pub enum Command {
    Disassemble(DisassembleArgs),
    Run(RunArgs),
}

#[derive(Debug)]
pub struct DisassembleArgs {
    pub source: DataSource,
    pub variant: GameVariant,
    pub prc: Option<String>,
    pub rel: Option<String>,
    pub validate: bool,
}

#[derive(Debug)]
pub struct RunArgs {
    pub source: DataSource,
    pub config: EngineConfig,
    pub prc: String,
    pub rel: Option<String>,
    pub obj: Option<String>,
    pub report_json: Option<PathBuf>,
    pub event_log_json: Option<PathBuf>,
    pub state_json: Option<PathBuf>,
}

pub fn parse() -> Result<Command> {
    let args = Args::parse();
    args.into_command()
}

impl Args {
    fn into_command(self) -> Result<Command> {
        if self.validate && !self.disassemble {
            bail!("--validate requires --disassemble");
        }

        let mut config = EngineConfig::from_json_file(self.config.as_deref())?;
        if let Some(variant) = self.variant {
            config.variant = variant;
        }
        if let Some(seed) = self.seed {
            config.rng_seed = seed;
        }
        if let Some(ticks) = self.ticks {
            config.max_ticks = ticks;
        }
        if let Some(boot_script) = self.boot_script {
            config.boot_script = boot_script;
        }
        if self.budget.is_some() {
            config.instruction_budget = self.budget;
        }

        let source = match self.part {
            Some(part) => DataSource::Part(part),
            None => DataSource::Directory(self.data_dir),
        };

        if self.disassemble {
            if self.prc.is_none() && self.rel.is_none() {
                bail!("--disassemble needs --prc or --rel");
            }
            return Ok(Command::Disassemble(DisassembleArgs {
                source,
                variant: config.variant,
                prc: self.prc,
                rel: self.rel,
                validate: self.validate,
            }));
        }

        let Some(prc) = self.prc else {
            bail!("running scripts requires --prc");
        };
        Ok(Command::Run(RunArgs {
            source,
            config,
            prc,
            rel: self.rel,
            obj: self.obj,
            report_json: self.report_json,
            event_log_json: self.event_log_json,
            state_json: self.state_json,
        }))
    }
}
