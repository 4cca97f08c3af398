use std::fs::File;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail, ensure};
use byteorder::{BigEndian, ByteOrder};
use memmap2::{Mmap, MmapOptions};
use serde::Serialize;

use crate::unpack::{max_unpacked_len, unpack_into};

const HEADER_SIZE: usize = 4;
pub const ENTRY_SIZE: usize = 30;
const NAME_LEN: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartEntry {
    pub name: String,
    pub offset: u32,
    pub packed_size: u32,
    pub unpacked_size: u32,
}

impl PartEntry {
    pub fn data_range(&self) -> Range<usize> {
        let start = self.offset as usize;
        let end = start + self.packed_size as usize;
        start..end
    }

    pub fn is_packed(&self) -> bool {
        self.packed_size != self.unpacked_size
    }
}

/// Resource bundle ("part" file) holding a flat table of named entries,
/// some of which are packed with the Delphine compressor.
#[derive(Debug)]
pub struct PartBundle {
    path: PathBuf,
    mmap: Mmap,
    entries: Vec<PartEntry>,
}

impl PartBundle {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_buf = path.as_ref().to_path_buf();
        let file = File::open(&path_buf)
            .with_context(|| format!("opening part bundle at {}", path_buf.display()))?;
        let mmap = unsafe { MmapOptions::new().map(&file) }
            .with_context(|| format!("memory-mapping part bundle {}", path_buf.display()))?;

        let entries = parse_entries(&mmap)
            .with_context(|| format!("parsing part bundle {}", path_buf.display()))?;

        Ok(PartBundle {
            path: path_buf,
            mmap,
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[PartEntry] {
        &self.entries
    }

    pub fn find_entry(&self, name: &str) -> Option<&PartEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// Bytes exactly as stored, still packed when `entry.is_packed()`.
    pub fn raw_entry_bytes(&self, entry: &PartEntry) -> &[u8] {
        &self.mmap[entry.data_range()]
    }

    pub fn read_entry(&self, entry: &PartEntry) -> Result<Vec<u8>> {
        let raw = self.raw_entry_bytes(entry);
        if !entry.is_packed() {
            return Ok(raw.to_vec());
        }

        let unpacked = entry.unpacked_size as usize;
        ensure!(
            unpacked <= max_unpacked_len(raw.len()),
            "part entry {} claims {} unpacked bytes from {} packed bytes",
            entry.name,
            unpacked,
            raw.len()
        );
        let mut data = vec![0u8; unpacked];
        let produced = unpack_into(raw, &mut data)
            .with_context(|| format!("unpacking part entry {}", entry.name))?;
        if produced != data.len() {
            log::warn!(
                "part entry {} unpacked to {} bytes, directory says {}",
                entry.name,
                produced,
                data.len()
            );
            data.truncate(produced);
        }
        Ok(data)
    }

    pub fn extract_entry<P: AsRef<Path>>(&self, entry: &PartEntry, dest: P) -> Result<()> {
        let bytes = self.read_entry(entry)?;
        let mut file = File::create(dest.as_ref())
            .with_context(|| format!("creating {}", dest.as_ref().display()))?;
        file.write_all(&bytes)
            .with_context(|| format!("writing {}", dest.as_ref().display()))?;
        Ok(())
    }
}

pub fn parse_entries(bytes: &[u8]) -> Result<Vec<PartEntry>> {
    ensure!(
        bytes.len() >= HEADER_SIZE,
        "part bundle is too small to contain a header"
    );

    let count = BigEndian::read_u16(&bytes[0..2]) as usize;
    let entry_size = BigEndian::read_u16(&bytes[2..4]) as usize;
    if entry_size != ENTRY_SIZE {
        bail!("part bundle declares {entry_size}-byte entries, expected {ENTRY_SIZE}");
    }

    let table_end = count
        .checked_mul(ENTRY_SIZE)
        .and_then(|len| len.checked_add(HEADER_SIZE))
        .ok_or_else(|| anyhow!("part bundle entry count overflow"))?;
    ensure!(
        table_end <= bytes.len(),
        "part bundle truncated inside its entry table"
    );

    let mut entries = Vec::with_capacity(count);
    for index in 0..count {
        let base = HEADER_SIZE + index * ENTRY_SIZE;
        let record = &bytes[base..base + ENTRY_SIZE];

        let name_bytes = &record[..NAME_LEN];
        let name_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        ensure!(name_len > 0, "part entry {index} has an empty name");
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).into_owned();

        let offset = BigEndian::read_u32(&record[14..18]);
        let packed_size = BigEndian::read_u32(&record[18..22]);
        let unpacked_size = BigEndian::read_u32(&record[22..26]);

        let end = (offset as usize)
            .checked_add(packed_size as usize)
            .ok_or_else(|| anyhow!("part entry {index} size overflow"))?;
        ensure!(
            end <= bytes.len(),
            "part entry {index} ({name}) data extends beyond file"
        );

        entries.push(PartEntry {
            name,
            offset,
            packed_size,
            unpacked_size,
        });
    }

    Ok(entries)
}

/// Serialises a bundle holding `(name, stored bytes, unpacked size)` records.
/// Entries whose stored length differs from the unpacked size are expected
/// to already be packed.
pub fn build_bundle(records: &[(&str, &[u8], u32)]) -> Result<Vec<u8>> {
    let count = u16::try_from(records.len()).context("too many part entries")?;
    let mut header = Vec::with_capacity(HEADER_SIZE + records.len() * ENTRY_SIZE);
    header.extend_from_slice(&count.to_be_bytes());
    header.extend_from_slice(&(ENTRY_SIZE as u16).to_be_bytes());

    let mut offset = HEADER_SIZE + records.len() * ENTRY_SIZE;
    let mut payload = Vec::new();
    for (name, stored, unpacked_size) in records {
        ensure!(
            !name.is_empty() && name.len() < NAME_LEN,
            "part entry name {name:?} must be 1..{NAME_LEN} bytes"
        );
        let mut name_field = [0u8; NAME_LEN];
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        header.extend_from_slice(&name_field);
        header.extend_from_slice(&(offset as u32).to_be_bytes());
        header.extend_from_slice(&(stored.len() as u32).to_be_bytes());
        header.extend_from_slice(&unpacked_size.to_be_bytes());
        header.extend_from_slice(&0u32.to_be_bytes());
        payload.extend_from_slice(stored);
        offset += stored.len();
    }

    header.extend_from_slice(&payload);
    Ok(header)
}
