use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context, Result};
use cine_engine::script::{disassemble, validate_jumps, OpcodeTable};
use cine_engine::state::{PendingLoads, ResourceSize};
use cine_engine::{Engine, RecordingHost, TickReport};
use cine_formats::{parse_objects, parse_prc, parse_rel, PartBundle};
use serde::Serialize;

mod cli;
use cli::{Command, DataSource, DisassembleArgs, RunArgs};

fn main() -> Result<()> {
    env_logger::init();
    match cli::parse()? {
        Command::Disassemble(args) => run_disassembly(args),
        Command::Run(args) => run_scripts(args),
    }
}

/// Resolves game file names against a part bundle or a directory.
enum DataFiles {
    Directory(PathBuf),
    Part(PartBundle),
}

impl DataFiles {
    fn open(source: DataSource) -> Result<Self> {
        Ok(match source {
            DataSource::Directory(dir) => DataFiles::Directory(dir),
            DataSource::Part(path) => DataFiles::Part(PartBundle::open(path)?),
        })
    }

    fn read(&self, name: &str) -> Result<Vec<u8>> {
        match self {
            DataFiles::Part(bundle) => {
                let entry = bundle.find_entry(name).ok_or_else(|| {
                    anyhow!("{name} not found in {}", bundle.path().display())
                })?;
                bundle.read_entry(entry)
            }
            DataFiles::Directory(dir) => {
                let path = dir.join(name);
                fs::read(&path).with_context(|| format!("reading {}", path.display()))
            }
        }
    }

    /// Entry sizes in bundle order; empty when reading loose files.
    fn resources(&self) -> Vec<ResourceSize> {
        match self {
            DataFiles::Part(bundle) => bundle.entries().iter().map(ResourceSize::from).collect(),
            DataFiles::Directory(_) => Vec::new(),
        }
    }

    fn procedures(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        parse_prc(&self.read(name)?).with_context(|| format!("parsing procedures from {name}"))
    }

    fn relations(&self, name: &str) -> Result<Vec<Vec<u8>>> {
        let entries =
            parse_rel(&self.read(name)?).with_context(|| format!("parsing relations from {name}"))?;
        Ok(entries.into_iter().map(|entry| entry.bytes).collect())
    }
}

fn run_disassembly(args: DisassembleArgs) -> Result<()> {
    let files = DataFiles::open(args.source)?;
    let table = OpcodeTable::for_variant(args.variant);
    if let Some(name) = args.prc.as_deref() {
        print_listing("procedure", &files.procedures(name)?, table, args.validate)?;
    }
    if let Some(name) = args.rel.as_deref() {
        print_listing("object script", &files.relations(name)?, table, args.validate)?;
    }
    Ok(())
}

fn print_listing(
    kind: &str,
    images: &[Vec<u8>],
    table: &OpcodeTable,
    validate: bool,
) -> Result<()> {
    for (index, image) in images.iter().enumerate() {
        if image.is_empty() {
            continue;
        }
        println!("== {kind} {index} ({} bytes) ==", image.len());
        match disassemble(image, table) {
            Ok(listing) => {
                for instruction in listing {
                    println!("  {instruction}");
                }
            }
            Err(err) => println!("  !! listing stopped: {err}"),
        }
        if validate {
            for jump in validate_jumps(image, table)
                .with_context(|| format!("validating {kind} {index}"))?
            {
                println!(
                    "  !! {:04x}: {} jumps to undefined label {}",
                    jump.offset, jump.mnemonic, jump.label
                );
            }
        }
    }
    Ok(())
}

fn run_scripts(args: RunArgs) -> Result<()> {
    let files = DataFiles::open(args.source)?;
    let host = RecordingHost::new();
    let max_ticks = args.config.max_ticks;
    let mut engine = Engine::new(args.config.clone(), host.clone());
    engine.set_resources(files.resources());

    engine.load_procedures(files.procedures(&args.prc)?)?;
    if let Some(name) = args.rel.as_deref() {
        engine.load_relations(files.relations(name)?)?;
    }
    if let Some(name) = args.obj.as_deref() {
        let records =
            parse_objects(&files.read(name)?).with_context(|| format!("parsing objects from {name}"))?;
        engine.load_objects(&records);
    }
    engine
        .boot()
        .with_context(|| format!("booting procedure {}", args.config.boot_script))?;

    let mut reports = Vec::new();
    for _ in 0..max_ticks {
        if engine.globals().is_empty() && engine.objects().is_empty() {
            println!("No scripts left after tick {}", engine.tick());
            break;
        }
        let report = engine.run_tick();
        print_tick(&report);
        reports.push(report);

        if let Some(loads) = engine.take_pending_loads() {
            apply_pending_loads(&mut engine, &files, loads)?;
        }
    }

    if let Some(path) = args.report_json.as_ref() {
        write_json(path, &reports, "tick reports")?;
    }
    if let Some(path) = args.event_log_json.as_ref() {
        write_json(path, &host.events(), "host event log")?;
    }
    if let Some(path) = args.state_json.as_ref() {
        write_json(path, engine.state(), "engine state")?;
    }
    Ok(())
}

fn print_tick(report: &TickReport) {
    println!(
        "tick {:>4}: ran {:>2} | aborted {} | objects {:?} | globals {:?}",
        report.tick,
        report.executed.len(),
        report.aborted.len(),
        report.active_objects,
        report.active_globals
    );
    for aborted in &report.aborted {
        println!(
            "  !! {:?} script {} aborted: {}",
            aborted.class, aborted.script, aborted.error
        );
    }
    for failed in &report.failed_requests {
        println!("  !! {:?} failed: {}", failed.request, failed.error);
    }
}

fn apply_pending_loads(
    engine: &mut Engine<RecordingHost>,
    files: &DataFiles,
    loads: PendingLoads,
) -> Result<()> {
    if let Some(name) = loads.procedure.as_deref() {
        println!("Loading procedures from {name}");
        engine.replace_procedures(files.procedures(name)?)?;
    }
    if let Some(name) = loads.relation.as_deref() {
        println!("Loading object scripts from {name}");
        engine.load_relations(files.relations(name)?)?;
    }
    if let Some(name) = loads.object.as_deref() {
        println!("Loading objects from {name}");
        let records =
            parse_objects(&files.read(name)?).with_context(|| format!("parsing objects from {name}"))?;
        engine.load_objects(&records);
    }
    if let Some(name) = loads.message.as_deref() {
        log::info!("message table {name} requested; messages are passed to the host by index");
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json =
        serde_json::to_string_pretty(value).with_context(|| format!("serializing {what} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {what} to {}", path.display()))?;
    println!("Saved {what} to {}", path.display());
    Ok(())
}
