use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use cine_formats::PartBundle;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(about = "Extract and unpack Cine part bundles", version)]
struct Args {
    /// Part bundle to extract (may be passed multiple times)
    #[arg(long = "part", value_name = "PATH", conflicts_with = "root")]
    parts: Vec<PathBuf>,

    /// Directory scanned recursively for PART* bundles when --part is not used
    #[arg(long = "root", value_name = "DIR", conflicts_with = "parts")]
    root: Option<PathBuf>,

    /// Destination directory for unpacked entries
    #[arg(long, value_name = "DIR", default_value = "extracted")]
    dest: PathBuf,

    /// Entry names to extract (case-insensitive, may repeat)
    #[arg(long = "entry", value_name = "NAME")]
    entries: Vec<String>,

    /// Overwrite existing files instead of skipping them
    #[arg(long)]
    overwrite: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let parts = resolve_part_paths(&args);
    if parts.is_empty() {
        bail!("no part bundles to extract");
    }

    let filter: HashSet<String> = args
        .entries
        .iter()
        .map(|name| name.trim().to_ascii_lowercase())
        .collect();

    fs::create_dir_all(&args.dest)
        .with_context(|| format!("creating destination {}", args.dest.display()))?;

    for part_path in parts {
        let bundle = PartBundle::open(&part_path)
            .with_context(|| format!("opening part bundle {}", part_path.display()))?;
        extract_bundle(&bundle, &args.dest, &filter, args.overwrite)?;
    }
    Ok(())
}

fn resolve_part_paths(args: &Args) -> Vec<PathBuf> {
    let mut parts = args.parts.clone();
    if parts.is_empty() {
        if let Some(root) = args.root.as_ref() {
            parts.extend(
                WalkDir::new(root)
                    .into_iter()
                    .filter_map(|res| res.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .filter(|entry| {
                        entry
                            .file_name()
                            .to_str()
                            .map(|name| name.to_ascii_uppercase().starts_with("PART"))
                            .unwrap_or(false)
                    })
                    .map(|entry| entry.into_path()),
            );
        }
    }
    parts.sort();
    parts.dedup();
    parts
}

fn extract_bundle(
    bundle: &PartBundle,
    dest_root: &Path,
    filter: &HashSet<String>,
    overwrite: bool,
) -> Result<()> {
    let part_name = bundle
        .path()
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.to_ascii_uppercase())
        .unwrap_or_else(|| "PART".to_string());
    let part_dest = dest_root.join(part_name);
    fs::create_dir_all(&part_dest).with_context(|| format!("creating {}", part_dest.display()))?;

    let mut extracted = 0usize;
    for entry in bundle.entries() {
        if !filter.is_empty() && !filter.contains(&entry.name.to_ascii_lowercase()) {
            continue;
        }
        // Entry names are flat 8.3 names; drop anything path-like.
        let file_name = entry.name.replace(['/', '\\'], "_");
        let dest_path = part_dest.join(file_name);
        if dest_path.exists() && !overwrite {
            continue;
        }
        bundle
            .extract_entry(entry, &dest_path)
            .with_context(|| format!("extracting {}", entry.name))?;
        extracted += 1;
    }

    println!(
        "Extracted {} entries from {} into {}",
        extracted,
        bundle.path().display(),
        part_dest.display()
    );
    Ok(())
}
