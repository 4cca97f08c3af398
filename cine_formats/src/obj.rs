use anyhow::{Result, bail, ensure};
use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;

const HEADER_SIZE: usize = 4;
pub const OBJECT_RECORD_SIZE: usize = 32;
const NAME_LEN: usize = 20;

/// One record of an `.OBJ` object table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ObjectRecord {
    pub x: i16,
    pub y: i16,
    pub mask: u16,
    pub frame: i16,
    pub costume: i16,
    pub name: String,
    pub part: u16,
}

pub fn parse_objects(bytes: &[u8]) -> Result<Vec<ObjectRecord>> {
    ensure!(
        bytes.len() >= HEADER_SIZE,
        "object table is too small to contain a header"
    );
    let count = BigEndian::read_u16(&bytes[0..2]) as usize;
    let entry_size = BigEndian::read_u16(&bytes[2..4]) as usize;
    if entry_size != OBJECT_RECORD_SIZE {
        bail!("object table declares {entry_size}-byte records, expected {OBJECT_RECORD_SIZE}");
    }
    ensure!(
        HEADER_SIZE + count * OBJECT_RECORD_SIZE <= bytes.len(),
        "object table truncated: {count} records declared, {} bytes present",
        bytes.len()
    );

    let records = bytes[HEADER_SIZE..HEADER_SIZE + count * OBJECT_RECORD_SIZE]
        .chunks_exact(OBJECT_RECORD_SIZE)
        .map(|record| {
            let name_bytes = &record[10..10 + NAME_LEN];
            let name_len = name_bytes
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(NAME_LEN);
            ObjectRecord {
                x: BigEndian::read_i16(&record[0..2]),
                y: BigEndian::read_i16(&record[2..4]),
                mask: BigEndian::read_u16(&record[4..6]),
                frame: BigEndian::read_i16(&record[6..8]),
                costume: BigEndian::read_i16(&record[8..10]),
                name: String::from_utf8_lossy(&name_bytes[..name_len]).into_owned(),
                part: BigEndian::read_u16(&record[30..32]),
            }
        })
        .collect();
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: i16, y: i16, name: &str, part: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&x.to_be_bytes());
        out.extend_from_slice(&y.to_be_bytes());
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(&(-1i16).to_be_bytes());
        out.extend_from_slice(&2i16.to_be_bytes());
        let mut name_field = [0u8; NAME_LEN];
        name_field[..name.len()].copy_from_slice(name.as_bytes());
        out.extend_from_slice(&name_field);
        out.extend_from_slice(&part.to_be_bytes());
        out
    }

    #[test]
    fn parses_object_records() {
        let mut table = vec![0x00, 0x02, 0x00, 0x20];
        table.extend(record(10, -4, "porte", 1));
        table.extend(record(300, 150, "clef", 0));

        let objects = parse_objects(&table).unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].x, 10);
        assert_eq!(objects[0].y, -4);
        assert_eq!(objects[0].mask, 3);
        assert_eq!(objects[0].frame, -1);
        assert_eq!(objects[0].costume, 2);
        assert_eq!(objects[0].name, "porte");
        assert_eq!(objects[1].name, "clef");
        assert_eq!(objects[1].part, 0);
    }

    #[test]
    fn rejects_truncated_table() {
        let mut table = vec![0x00, 0x02, 0x00, 0x20];
        table.extend(record(0, 0, "a", 0));
        let err = parse_objects(&table).unwrap_err();
        assert!(err.to_string().contains("truncated"));
    }
}
