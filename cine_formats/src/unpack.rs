// SPDX-License-Identifier: GPL-2.0-or-later
//
// Delphine ("ByteKiller") decompressor used by the Future Wars and
// Operation Stealth resource bundles.
//
// A packed buffer is consumed from its tail toward its head, and the output
// is produced from its last byte toward its first. The final three
// big-endian words of the input hold, in order, the initial bit accumulator,
// the checksum seed and the unpacked length.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

/// Bytes occupied by the accumulator/checksum/length trailer.
pub const TRAILER_LEN: usize = 12;

/// Upper bound on output bytes per packed byte. The densest operation is a
/// 256-byte reference encoded in 23 bits.
pub const MAX_EXPANSION: usize = 90;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnpackError {
    #[error("unpacked size {unpacked} exceeds destination capacity {capacity}")]
    CapacityExceeded { unpacked: usize, capacity: usize },
    #[error("packed stream exhausted before the output was complete")]
    TruncatedInput,
    #[error("back-reference offset {offset} at output position {position} points past the unpacked data")]
    ReferenceOutOfRange { offset: usize, position: usize },
    #[error("checksum mismatch after unpacking (crc {crc:#010x})")]
    ChecksumMismatch { crc: u32 },
    #[error("unpacked size {unpacked} cannot come from {packed} packed bytes")]
    ImplausibleLength { unpacked: usize, packed: usize },
}

/// Reads the unpacked length stored in the trailer of a packed buffer.
pub fn unpacked_len(src: &[u8]) -> Result<usize, UnpackError> {
    if src.len() < TRAILER_LEN {
        return Err(UnpackError::TruncatedInput);
    }
    Ok(BigEndian::read_u32(&src[src.len() - 4..]) as usize)
}

/// Largest output a packed buffer of `packed` bytes can decode to.
pub fn max_unpacked_len(packed: usize) -> usize {
    packed.saturating_mul(MAX_EXPANSION)
}

/// Unpacks `src` into a freshly allocated buffer sized from its trailer.
/// Lengths no stream of this size could encode are refused before allocating.
pub fn unpack(src: &[u8]) -> Result<Vec<u8>, UnpackError> {
    let len = unpacked_len(src)?;
    if len > max_unpacked_len(src.len()) {
        return Err(UnpackError::ImplausibleLength {
            unpacked: len,
            packed: src.len(),
        });
    }
    let mut out = vec![0u8; len];
    unpack_into(src, &mut out)?;
    Ok(out)
}

/// Unpacks `src` into the front of `dst`, returning the number of bytes
/// produced.
///
/// The only check made before writing is that the encoded length fits in
/// `dst`. Every other problem is detected while or after decoding, at which
/// point `dst` has already been partially written and must not be trusted.
pub fn unpack_into(src: &[u8], dst: &mut [u8]) -> Result<usize, UnpackError> {
    let unpacked = unpacked_len(src)?;
    if unpacked > dst.len() {
        return Err(UnpackError::CapacityExceeded {
            unpacked,
            capacity: dst.len(),
        });
    }

    let mut ctx = UnpackContext {
        src,
        src_pos: src.len() - 4,
        dst: &mut dst[..unpacked],
        remaining: unpacked,
        crc: 0,
        bits: 0,
    };
    ctx.crc = ctx.read_word()?;
    ctx.bits = ctx.read_word()?;
    ctx.crc ^= ctx.bits;

    while ctx.remaining > 0 {
        if ctx.next_bit()? == 0 {
            if ctx.next_bit()? == 0 {
                ctx.copy_literal(3, 0)?;
            } else {
                ctx.copy_reference(8, 2)?;
            }
        } else {
            match ctx.get_bits(2)? {
                3 => ctx.copy_literal(8, 8)?,
                2 => {
                    let count = ctx.get_bits(8)? as usize + 1;
                    ctx.copy_reference(12, count)?;
                }
                1 => ctx.copy_reference(10, 4)?,
                _ => ctx.copy_reference(9, 3)?,
            }
        }
    }

    if ctx.crc != 0 {
        return Err(UnpackError::ChecksumMismatch { crc: ctx.crc });
    }
    Ok(unpacked)
}

struct UnpackContext<'a> {
    src: &'a [u8],
    // One past the next word to read; moves toward zero.
    src_pos: usize,
    dst: &'a mut [u8],
    // dst[remaining..] is complete.
    remaining: usize,
    crc: u32,
    bits: u32,
}

impl UnpackContext<'_> {
    fn read_word(&mut self) -> Result<u32, UnpackError> {
        if self.src_pos < 4 {
            return Err(UnpackError::TruncatedInput);
        }
        self.src_pos -= 4;
        Ok(BigEndian::read_u32(&self.src[self.src_pos..self.src_pos + 4]))
    }

    fn next_bit(&mut self) -> Result<u32, UnpackError> {
        let mut carry = self.bits & 1;
        self.bits >>= 1;
        if self.bits == 0 {
            let word = self.read_word()?;
            self.crc ^= word;
            carry = word & 1;
            // The forced top bit marks the end of the refilled word.
            self.bits = 0x8000_0000 | (word >> 1);
        }
        Ok(carry)
    }

    fn get_bits(&mut self, count: u32) -> Result<u32, UnpackError> {
        let mut value = 0;
        for _ in 0..count {
            value = (value << 1) | self.next_bit()?;
        }
        Ok(value)
    }

    fn copy_literal(&mut self, count_bits: u32, base_len: usize) -> Result<(), UnpackError> {
        let count = self.get_bits(count_bits)? as usize + base_len + 1;
        for _ in 0..count.min(self.remaining) {
            let byte = self.get_bits(8)? as u8;
            self.remaining -= 1;
            self.dst[self.remaining] = byte;
        }
        Ok(())
    }

    fn copy_reference(&mut self, offset_bits: u32, count: usize) -> Result<(), UnpackError> {
        let offset = self.get_bits(offset_bits)? as usize;
        // Byte-by-byte so overlapping ranges replicate recent output.
        for _ in 0..count.min(self.remaining) {
            self.remaining -= 1;
            let byte = *self.dst.get(self.remaining + offset).ok_or(
                UnpackError::ReferenceOutOfRange {
                    offset,
                    position: self.remaining,
                },
            )?;
            self.dst[self.remaining] = byte;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer(bits: u32, crc: u32, len: u32) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&bits.to_be_bytes());
        data.extend_from_slice(&crc.to_be_bytes());
        data.extend_from_slice(&len.to_be_bytes());
        data
    }

    #[test]
    fn empty_stream_needs_balanced_checksum() {
        let ok = trailer(1, 1, 0);
        assert_eq!(unpack(&ok).unwrap(), Vec::<u8>::new());

        let bad = trailer(1, 0, 0);
        assert_eq!(
            unpack(&bad),
            Err(UnpackError::ChecksumMismatch { crc: 1 })
        );
    }

    #[test]
    fn decodes_literal_from_initial_accumulator() {
        // Bits in decode order: 0 0 (short literal) 000 (count 1) then 0x41
        // MSB-first, followed by the marker bit.
        let mut bits = 0u32;
        let stream: [u32; 13] = [0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 1];
        for (index, bit) in stream.iter().enumerate() {
            bits |= *bit << index;
        }
        bits |= 1 << stream.len();
        let data = trailer(bits, bits, 1);
        assert_eq!(unpack(&data).unwrap(), b"A".to_vec());
    }

    #[test]
    fn short_buffer_is_truncated() {
        assert_eq!(unpack(&[0u8; 8]), Err(UnpackError::TruncatedInput));
    }

    #[test]
    fn refill_past_start_reports_truncation() {
        // Marker-only accumulator forces an immediate refill with no words left.
        let data = trailer(1, 1, 4);
        assert_eq!(unpack(&data), Err(UnpackError::TruncatedInput));
    }

    #[test]
    fn oversized_trailer_length_is_refused() {
        let data = trailer(1, 1, u32::MAX);
        assert_eq!(
            unpack(&data),
            Err(UnpackError::ImplausibleLength {
                unpacked: u32::MAX as usize,
                packed: TRAILER_LEN
            })
        );
        let data = trailer(1, 1, (TRAILER_LEN * MAX_EXPANSION) as u32);
        assert_eq!(unpack(&data), Err(UnpackError::TruncatedInput));
    }

    #[test]
    fn capacity_is_checked_before_decoding() {
        let data = trailer(1, 1, 16);
        let mut dst = [0xAAu8; 15];
        assert_eq!(
            unpack_into(&data, &mut dst),
            Err(UnpackError::CapacityExceeded {
                unpacked: 16,
                capacity: 15
            })
        );
        assert!(dst.iter().all(|&b| b == 0xAA));
    }
}
