//! ISOBMFF top-level box structural validation (spec §4.4 "Integrity").
//!
//! Walks the top-level boxes of a downloaded segment and checks that their
//! declared sizes exactly tile the buffer, without decoding box contents.
//! A failure here is treated as a retryable NETWORK-like condition by the
//! fetcher (spec §7 "INTEGRITY ... treated as NETWORK retryable after
//! byte-range widening").

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

use crate::error::IntegrityError;

fn is_printable_ascii(tag: &[u8; 4]) -> bool {
    tag.iter().all(|b| b.is_ascii_graphic() || *b == b' ')
}

/// Validate that `data` is a sequence of well-formed ISOBMFF boxes that
/// exactly covers the buffer. Box *contents* are not interpreted.
pub fn check_isobmff_structure(data: &[u8]) -> Result<(), IntegrityError> {
    if data.len() < 8 {
        return Err(IntegrityError::Mp4Malformed("segment shorter than one box header".into()));
    }
    let mut cursor = Cursor::new(data);
    let total_len = data.len() as u64;

    while cursor.position() < total_len {
        let box_start = cursor.position();
        let remaining = total_len - box_start;
        if remaining < 8 {
            return Err(IntegrityError::Mp4Malformed(format!(
                "trailing {remaining} bytes too short for a box header"
            )));
        }
        let declared_size = cursor
            .read_u32::<BigEndian>()
            .map_err(|e| IntegrityError::Mp4Malformed(e.to_string()))? as u64;
        let mut tag = [0u8; 4];
        std::io::Read::read_exact(&mut cursor, &mut tag)
            .map_err(|e| IntegrityError::Mp4Malformed(e.to_string()))?;
        if !is_printable_ascii(&tag) {
            return Err(IntegrityError::Mp4Malformed(format!("non-ASCII box type at offset {box_start}")));
        }

        let header_len = 8;
        let box_size = if declared_size == 1 {
            if remaining < 16 {
                return Err(IntegrityError::Mp4Malformed("largesize box header truncated".into()));
            }
            cursor.read_u64::<BigEndian>().map_err(|e| IntegrityError::Mp4Malformed(e.to_string()))?
        } else if declared_size == 0 {
            // "box extends to end of file" per ISO/IEC 14496-12.
            remaining
        } else {
            declared_size
        };

        if box_size < header_len || box_size > remaining {
            return Err(IntegrityError::Mp4Malformed(format!(
                "box {:?} at offset {box_start} declares size {box_size}, {remaining} bytes remain",
                String::from_utf8_lossy(&tag)
            )));
        }

        cursor.set_position(box_start + box_size);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_box(kind: &[u8; 4], payload_len: usize) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&((8 + payload_len) as u32).to_be_bytes());
        b.extend_from_slice(kind);
        b.extend(std::iter::repeat(0u8).take(payload_len));
        b
    }

    #[test]
    fn single_well_formed_box_passes() {
        let data = make_box(b"styp", 0);
        assert!(check_isobmff_structure(&data).is_ok());
    }

    #[test]
    fn two_boxes_tiling_the_buffer_pass() {
        let mut data = make_box(b"styp", 4);
        data.extend(make_box(b"moof", 10));
        assert!(check_isobmff_structure(&data).is_ok());
    }

    #[test]
    fn truncated_box_fails() {
        let mut data = make_box(b"moof", 20);
        data.truncate(data.len() - 5);
        assert!(check_isobmff_structure(&data).is_err());
    }

    #[test]
    fn oversized_declared_box_fails() {
        let mut data = make_box(b"moof", 10);
        data[3] = 0xff; // corrupt the low byte of the 32-bit size to something huge
        assert!(check_isobmff_structure(&data).is_err());
    }

    #[test]
    fn zero_size_box_extends_to_end_of_buffer() {
        let mut b = Vec::new();
        b.extend_from_slice(&0u32.to_be_bytes());
        b.extend_from_slice(b"mdat");
        b.extend(std::iter::repeat(0u8).take(100));
        assert!(check_isobmff_structure(&b).is_ok());
    }
}
