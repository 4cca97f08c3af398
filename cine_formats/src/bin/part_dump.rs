use anyhow::{Context, Result};
use clap::Parser;
use cine_formats::PartBundle;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "List the entries of a Cine part bundle", version)]
struct Args {
    /// Part bundle to inspect
    part: PathBuf,

    /// Print the entry table as JSON instead of columns
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bundle = PartBundle::open(&args.part)?;

    if args.json {
        let json = serde_json::to_string_pretty(bundle.entries())
            .context("serializing part entries")?;
        println!("{json}");
        return Ok(());
    }

    println!(
        "{} entries in {}",
        bundle.entries().len(),
        bundle.path().display()
    );
    for entry in bundle.entries() {
        println!(
            "{name:<14} {offset:>10} {packed:>8} {unpacked:>8} {flag}",
            name = entry.name,
            offset = entry.offset,
            packed = entry.packed_size,
            unpacked = entry.unpacked_size,
            flag = if entry.is_packed() { "packed" } else { "" }
        );
    }
    Ok(())
}
