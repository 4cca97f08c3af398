//! Script containers: procedure (`.PRC`) files holding the global scripts
//! of an area, and relation (`.REL`) files holding object scripts.

use anyhow::{Context, Result, ensure};
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;

/// Object script read from a `.REL` file. The three parameters are kept
/// as stored; they are not interpreted by the script machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelEntry {
    pub params: [u16; 3],
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Splits a `.PRC` image into per-script byte-code images, keeping empty
/// slots so script indices stay stable.
pub fn parse_prc(bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut cursor = bytes;
    let count = cursor
        .read_u16::<BigEndian>()
        .context("reading PRC script count")?;

    let mut sizes = Vec::with_capacity(count as usize);
    for index in 0..count {
        let size = cursor
            .read_u16::<BigEndian>()
            .with_context(|| format!("reading PRC size for script {index}"))?;
        sizes.push(size as usize);
    }

    let mut scripts = Vec::with_capacity(sizes.len());
    for (index, size) in sizes.into_iter().enumerate() {
        scripts.push(take(&mut cursor, size).with_context(|| format!("PRC script {index}"))?);
    }
    Ok(scripts)
}

pub fn parse_rel(bytes: &[u8]) -> Result<Vec<RelEntry>> {
    let mut cursor = bytes;
    let count = cursor
        .read_u16::<BigEndian>()
        .context("reading REL entry count")?;

    let mut headers = Vec::with_capacity(count as usize);
    for index in 0..count {
        let mut fields = [0u16; 4];
        cursor
            .read_u16_into::<BigEndian>(&mut fields)
            .with_context(|| format!("reading REL header for entry {index}"))?;
        headers.push(fields);
    }

    let mut entries = Vec::with_capacity(headers.len());
    for (index, [size, p1, p2, p3]) in headers.into_iter().enumerate() {
        let bytes =
            take(&mut cursor, size as usize).with_context(|| format!("REL entry {index}"))?;
        entries.push(RelEntry {
            params: [p1, p2, p3],
            bytes,
        });
    }
    Ok(entries)
}

fn take(cursor: &mut &[u8], len: usize) -> Result<Vec<u8>> {
    ensure!(
        cursor.len() >= len,
        "image of {len} bytes truncated ({} available)",
        cursor.len()
    );
    let (head, tail) = cursor.split_at(len);
    *cursor = tail;
    Ok(head.to_vec())
}

/// Builds a `.PRC` image from script images; the inverse of [`parse_prc`].
pub fn build_prc(scripts: &[Vec<u8>]) -> Result<Vec<u8>> {
    let count = u16::try_from(scripts.len()).context("too many scripts for a PRC file")?;
    let mut out = Vec::new();
    out.extend_from_slice(&count.to_be_bytes());
    for script in scripts {
        let size = u16::try_from(script.len()).context("script larger than 64 KiB")?;
        out.extend_from_slice(&size.to_be_bytes());
    }
    for script in scripts {
        out.extend_from_slice(script);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_prc_images_and_keeps_empty_slots() {
        let scripts = vec![vec![0x50], Vec::new(), vec![0x1E, 0x02, 0x50]];
        let image = build_prc(&scripts).unwrap();
        assert_eq!(&image[..2], &[0x00, 0x03]);
        assert_eq!(parse_prc(&image).unwrap(), scripts);
    }

    #[test]
    fn truncated_prc_is_rejected() {
        let mut image = build_prc(&[vec![1, 2, 3, 4]]).unwrap();
        image.pop();
        let err = parse_prc(&image).unwrap_err();
        assert!(format!("{err:#}").contains("truncated"));
    }

    #[test]
    fn parses_rel_entries() {
        let mut image = Vec::new();
        image.extend_from_slice(&2u16.to_be_bytes());
        for header in [[2u16, 7, 8, 9], [1, 0, 0, 1]] {
            for field in header {
                image.extend_from_slice(&field.to_be_bytes());
            }
        }
        image.extend_from_slice(&[0x50, 0x50, 0x51]);

        let entries = parse_rel(&image).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].params, [7, 8, 9]);
        assert_eq!(entries[0].bytes, vec![0x50, 0x50]);
        assert_eq!(entries[1].bytes, vec![0x51]);
    }
}
