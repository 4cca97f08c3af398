use std::fs;
use std::process::Command;

use anyhow::{Context, Result};
use cine_formats::{build_bundle, build_prc, pack};
use serde_json::Value;
use tempfile::tempdir;

/// 0: empty, 1: label 0; addToBgList 4; break; goto 0
fn write_procedures(dir: &std::path::Path) -> Result<()> {
    let prc = build_prc(&[
        Vec::new(),
        vec![0x1E, 0x00, 0x16, 0x04, 0x50, 0x1F, 0x00],
    ])?;
    fs::write(dir.join("TEST.PRC"), prc).context("writing procedure file")?;
    Ok(())
}

#[test]
fn runs_ticks_and_writes_reports() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary data directory")?;
    write_procedures(temp_dir.path())?;
    let report_path = temp_dir.path().join("out").join("report.json");
    let events_path = temp_dir.path().join("events.json");

    let output = Command::new(env!("CARGO_BIN_EXE_cine_engine"))
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["--prc", "TEST.PRC", "--ticks", "3"])
        .arg("--report-json")
        .arg(&report_path)
        .arg("--event-log-json")
        .arg(&events_path)
        .output()
        .context("executing cine_engine")?;
    assert!(
        output.status.success(),
        "cine_engine exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let reports: Value = serde_json::from_str(&fs::read_to_string(&report_path)?)?;
    let reports = reports.as_array().context("report is a list")?;
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[2]["tick"], 3);
    assert_eq!(reports[2]["active_globals"], serde_json::json!([1]));

    let events: Value = serde_json::from_str(&fs::read_to_string(&events_path)?)?;
    let events = events.as_array().context("event log is a list")?;
    assert_eq!(events.len(), 3);
    assert!(events
        .iter()
        .all(|event| event["kind"] == "add_to_bg_list" && event["object"] == 4));
    Ok(())
}

#[test]
fn disassembles_procedures() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary data directory")?;
    write_procedures(temp_dir.path())?;

    let output = Command::new(env!("CARGO_BIN_EXE_cine_engine"))
        .arg("--data-dir")
        .arg(temp_dir.path())
        .args(["--prc", "TEST.PRC", "--disassemble", "--validate"])
        .output()
        .context("executing cine_engine --disassemble")?;
    assert!(output.status.success());

    let listing = String::from_utf8_lossy(&output.stdout);
    assert!(listing.contains("== procedure 1 (7 bytes) =="));
    assert!(listing.contains("0002: addToBgList 4"));
    assert!(listing.contains("0005: goto label 0"));
    assert!(!listing.contains("undefined label"));
    Ok(())
}

#[test]
fn reads_packed_procedures_from_a_part_bundle() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary data directory")?;
    let prc = build_prc(&[
        Vec::new(),
        vec![0x1E, 0x00, 0x16, 0x04, 0x16, 0x04, 0x16, 0x04, 0x50, 0x1F, 0x00],
    ])?;
    let packed = pack(&prc)?;
    let bundle = build_bundle(&[("AUTO00.PRC", packed.as_slice(), prc.len() as u32)])?;
    let bundle_path = temp_dir.path().join("PART01");
    fs::write(&bundle_path, bundle).context("writing part bundle")?;
    let events_path = temp_dir.path().join("events.json");

    let output = Command::new(env!("CARGO_BIN_EXE_cine_engine"))
        .arg("--part")
        .arg(&bundle_path)
        .args(["--prc", "auto00.prc", "--ticks", "1"])
        .arg("--event-log-json")
        .arg(&events_path)
        .output()
        .context("executing cine_engine with a part bundle")?;
    assert!(
        output.status.success(),
        "cine_engine exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    let events: Value = serde_json::from_str(&fs::read_to_string(&events_path)?)?;
    assert_eq!(events.as_array().map(Vec::len), Some(3));
    Ok(())
}

#[test]
fn validate_without_disassemble_is_rejected() {
    let output = Command::new(env!("CARGO_BIN_EXE_cine_engine"))
        .args(["--prc", "TEST.PRC", "--validate"])
        .output()
        .expect("cine_engine runs");
    assert!(!output.status.success());
}
