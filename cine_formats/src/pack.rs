// SPDX-License-Identifier: GPL-2.0-or-later
//
// Greedy encoder for the Delphine packed format understood by `unpack`.
//
// The decoder rebuilds its output from the end, so the encoder walks the
// input backward as well and records operations in decode order. Bits are
// collected in the order the decoder will consume them and only laid out
// into the reversed word stream by `BitStreamWriter::finish`.

use thiserror::Error;

/// Longest back-reference the format can express.
pub const MAX_REFERENCE_LEN: usize = 256;
/// Largest back-reference offset (12-bit form).
pub const MAX_REFERENCE_OFFSET: usize = 0x0FFF;

const SHORT_LITERAL_MAX: usize = 8;
const LONG_LITERAL_MAX: usize = 8 + 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("input of {0} bytes does not fit the 32-bit length field")]
    InputTooLarge(usize),
    #[error("no reference form encodes offset {offset} with count {count}")]
    ReferenceNotEncodable { offset: usize, count: usize },
}

/// Collects decoder-ordered bits and lays them out as a packed buffer.
#[derive(Debug, Default, Clone)]
pub struct BitStreamWriter {
    bits: Vec<bool>,
}

impl BitStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    fn push_bits(&mut self, value: u32, count: u32) {
        for shift in (0..count).rev() {
            self.bits.push((value >> shift) & 1 == 1);
        }
    }

    /// Emits literal runs for `bytes`, listed in the order the decoder
    /// produces them (from the end of the output toward its start).
    pub fn literals(&mut self, bytes: &[u8]) {
        for run in bytes.chunks(LONG_LITERAL_MAX) {
            if run.len() <= SHORT_LITERAL_MAX {
                self.push_bits(0b00, 2);
                self.push_bits(run.len() as u32 - 1, 3);
            } else {
                self.push_bits(0b111, 3);
                self.push_bits((run.len() - SHORT_LITERAL_MAX - 1) as u32, 8);
            }
            for &byte in run {
                self.push_bits(byte as u32, 8);
            }
        }
    }

    /// Emits a back-reference using the shortest form that can express it.
    pub fn reference(&mut self, offset: usize, count: usize) -> Result<(), PackError> {
        match (count, offset) {
            (2, 0..=0xFF) => {
                self.push_bits(0b01, 2);
                self.push_bits(offset as u32, 8);
            }
            (3, 0..=0x1FF) => {
                self.push_bits(0b100, 3);
                self.push_bits(offset as u32, 9);
            }
            (4, 0..=0x3FF) => {
                self.push_bits(0b101, 3);
                self.push_bits(offset as u32, 10);
            }
            (1..=MAX_REFERENCE_LEN, 0..=MAX_REFERENCE_OFFSET) => {
                self.push_bits(0b110, 3);
                self.push_bits(count as u32 - 1, 8);
                self.push_bits(offset as u32, 12);
            }
            _ => return Err(PackError::ReferenceNotEncodable { offset, count }),
        }
        Ok(())
    }

    /// Lays the collected bits out as a packed buffer whose trailer
    /// announces `unpacked_len` bytes.
    pub fn finish(self, unpacked_len: usize) -> Result<Vec<u8>, PackError> {
        let unpacked_len =
            u32::try_from(unpacked_len).map_err(|_| PackError::InputTooLarge(unpacked_len))?;

        // Leftover bits ride in the initial accumulator below a marker bit so
        // the remaining stream splits into whole words.
        let head = self.bits.len() % 32;
        let mut accumulator = 1u32 << head;
        for (index, &bit) in self.bits[..head].iter().enumerate() {
            accumulator |= (bit as u32) << index;
        }

        let words: Vec<u32> = self.bits[head..]
            .chunks(32)
            .map(|chunk| {
                chunk
                    .iter()
                    .enumerate()
                    .fold(0u32, |word, (index, &bit)| word | ((bit as u32) << index))
            })
            .collect();
        let checksum = words.iter().fold(accumulator, |crc, word| crc ^ word);

        let mut out = Vec::with_capacity((words.len() + 3) * 4);
        for word in words.iter().rev() {
            out.extend_from_slice(&word.to_be_bytes());
        }
        out.extend_from_slice(&accumulator.to_be_bytes());
        out.extend_from_slice(&checksum.to_be_bytes());
        out.extend_from_slice(&unpacked_len.to_be_bytes());
        Ok(out)
    }
}

/// Packs `data` into the Delphine format.
pub fn pack(data: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut writer = BitStreamWriter::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut remaining = data.len();

    while remaining > 0 {
        match find_reference(data, remaining) {
            Some((offset, count)) => {
                if !pending.is_empty() {
                    writer.literals(&pending);
                    pending.clear();
                }
                writer.reference(offset, count)?;
                remaining -= count;
            }
            None => {
                remaining -= 1;
                pending.push(data[remaining]);
            }
        }
    }
    if !pending.is_empty() {
        writer.literals(&pending);
    }

    writer.finish(data.len())
}

/// Finds the most useful reference for the bytes ending at `remaining`,
/// returning `(offset, count)`.
fn find_reference(data: &[u8], remaining: usize) -> Option<(usize, usize)> {
    let max_offset = MAX_REFERENCE_OFFSET.min(data.len() - remaining);
    let max_len = MAX_REFERENCE_LEN.min(remaining);
    let mut best: Option<(usize, usize)> = None;

    for offset in 1..=max_offset {
        let len = (0..max_len)
            .take_while(|&step| {
                let position = remaining - 1 - step;
                data[position] == data[position + offset]
            })
            .count();
        let count = encodable_count(offset, len);
        if count > best.map_or(0, |(_, best_count)| best_count) {
            best = Some((offset, count));
            if count == max_len {
                break;
            }
        }
    }

    best
}

fn encodable_count(offset: usize, len: usize) -> usize {
    match len {
        0 | 1 => 0,
        // Pairs only have the 8-bit offset form; anything longer can fall
        // back to the 12-bit form.
        2 if offset <= 0xFF => 2,
        2 => 0,
        _ => len,
    }
}
