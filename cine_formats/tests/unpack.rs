use cine_formats::unpack::TRAILER_LEN;
use cine_formats::{BitStreamWriter, UnpackError, pack, unpack, unpack_into, unpacked_len};

fn sample_resource() -> Vec<u8> {
    let mut data = Vec::new();
    for row in 0..40u8 {
        data.extend_from_slice(b"SCRIPT");
        data.extend((0..24).map(|col| row.wrapping_mul(7) ^ (col & 0x0F)));
        data.extend(std::iter::repeat(0xFF).take(row as usize % 9));
    }
    data
}

#[test]
fn packed_resource_round_trips() {
    let data = sample_resource();
    let packed = pack(&data).unwrap();
    assert!(packed.len() < data.len());
    assert_eq!(unpacked_len(&packed).unwrap(), data.len());

    let mut dst = vec![0u8; data.len() + 16];
    let produced = unpack_into(&packed, &mut dst).unwrap();
    assert_eq!(produced, data.len());
    assert_eq!(&dst[..produced], data.as_slice());
    assert!(dst[produced..].iter().all(|&b| b == 0));
}

#[test]
fn round_trips_edge_lengths() {
    for len in [1usize, 2, 3, 8, 9, 31, 32, 33, 264, 265, 1000] {
        let data: Vec<u8> = (0..len).map(|i| (i * 37 % 251) as u8).collect();
        let packed = pack(&data).unwrap();
        assert_eq!(unpack(&packed).unwrap(), data, "length {len}");
    }
}

#[test]
fn corrupted_checksum_seed_fails() {
    let mut packed = pack(&sample_resource()).unwrap();
    let index = packed.len() - 5;
    packed[index] ^= 0x01;
    assert!(matches!(
        unpack(&packed),
        Err(UnpackError::ChecksumMismatch { .. })
    ));
}

#[test]
fn flipped_payload_bit_fails() {
    let mut packed = pack(&sample_resource()).unwrap();
    let index = packed.len() - TRAILER_LEN - 1;
    packed[index] ^= 0x10;
    assert!(unpack(&packed).is_err());
}

#[test]
fn capacity_one_byte_short_is_rejected_untouched() {
    let data = sample_resource();
    let packed = pack(&data).unwrap();
    let mut dst = vec![0x5Au8; data.len() - 1];
    assert_eq!(
        unpack_into(&packed, &mut dst),
        Err(UnpackError::CapacityExceeded {
            unpacked: data.len(),
            capacity: data.len() - 1,
        })
    );
    assert!(dst.iter().all(|&b| b == 0x5A));
}

#[test]
fn overlapping_nine_bit_reference_repeats_byte() {
    let mut writer = BitStreamWriter::new();
    writer.literals(&[b'A']);
    writer.reference(1, 3).unwrap();
    assert_eq!(writer.bit_len(), 13 + 12);

    let packed = writer.finish(4).unwrap();
    assert_eq!(unpack(&packed).unwrap(), b"AAAA".to_vec());
}

#[test]
fn reference_outside_output_is_reported() {
    let mut writer = BitStreamWriter::new();
    writer.reference(5, 2).unwrap();
    let packed = writer.finish(2).unwrap();
    assert_eq!(
        unpack(&packed),
        Err(UnpackError::ReferenceOutOfRange {
            offset: 5,
            position: 1
        })
    );
}

#[test]
fn final_chunk_is_clamped_to_remaining() {
    // A four-byte literal run against a two-byte output stops after two.
    let mut writer = BitStreamWriter::new();
    writer.literals(b"abcd");
    let packed = writer.finish(2).unwrap();
    assert_eq!(unpack(&packed).unwrap(), b"ba".to_vec());
}
