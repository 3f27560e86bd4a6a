//! Point-cloud encoding: filter aligned depth/color grids into dense point
//! buffers.
//!
//! Two serializations exist. The compact binary layout (a `u64` point count
//! followed by fixed 9-byte records) feeds the frame cache and the HTTP
//! facade; the line-oriented text layout feeds `.pts`-style file export.
//! Both scan pixels in row-major order and skip pixels whose position is
//! the all-zero vector, so valid points keep their raster order.

use std::sync::OnceLock;

use bytes::Bytes;
use depth_ingest::AlignedFrame;

/// Bytes per record in the binary layout: x,y,z as i16 plus r,g,b.
pub(crate) const POINT_STRIDE: usize = 9;

/// Bytes of the little-endian point count preceding the records.
pub(crate) const COUNT_PREFIX: usize = 8;

/// Encode a frame into the compact binary layout.
///
/// A frame with no valid points encodes to just the zero count prefix.
pub(crate) fn encode_binary(frame: &AlignedFrame) -> Bytes {
    let pixels = frame.pixel_count();
    let mut out = Vec::with_capacity(COUNT_PREFIX + pixels * POINT_STRIDE);
    out.extend_from_slice(&0u64.to_le_bytes());

    let mut count: u64 = 0;
    for idx in 0..pixels {
        let x = frame.positions[idx * 3];
        let y = frame.positions[idx * 3 + 1];
        let z = frame.positions[idx * 3 + 2];
        if x == 0 && y == 0 && z == 0 {
            continue;
        }
        out.extend_from_slice(&x.to_le_bytes());
        out.extend_from_slice(&y.to_le_bytes());
        out.extend_from_slice(&z.to_le_bytes());
        let color = &frame.color[idx * 4..idx * 4 + 4];
        // Alpha is dropped in the compact layout.
        out.extend_from_slice(&color[..3]);
        count += 1;
    }

    out[..COUNT_PREFIX].copy_from_slice(&count.to_le_bytes());
    Bytes::from(out)
}

/// Point count recorded in a binary buffer's prefix.
pub(crate) fn point_count(buffer: &[u8]) -> u64 {
    match buffer.get(..COUNT_PREFIX) {
        Some(prefix) => u64::from_le_bytes(prefix.try_into().unwrap_or([0u8; 8])),
        None => 0,
    }
}

/// Encode a frame into the text layout: one `x y z r g b a` line per valid
/// point, base-10 fields separated by single spaces.
pub(crate) fn encode_text(frame: &AlignedFrame) -> Vec<u8> {
    let table = decimal_table();
    let pixels = frame.pixel_count();
    // Worst case per line: three 6-byte coordinates, four 3-byte channels,
    // separators and the newline.
    let mut out = Vec::with_capacity(pixels * 38);

    for idx in 0..pixels {
        let x = frame.positions[idx * 3];
        let y = frame.positions[idx * 3 + 1];
        let z = frame.positions[idx * 3 + 2];
        if x == 0 && y == 0 && z == 0 {
            continue;
        }
        let color = &frame.color[idx * 4..idx * 4 + 4];
        table.push(&mut out, x);
        out.push(b' ');
        table.push(&mut out, y);
        out.push(b' ');
        table.push(&mut out, z);
        out.push(b' ');
        table.push(&mut out, color[0] as i16);
        out.push(b' ');
        table.push(&mut out, color[1] as i16);
        out.push(b' ');
        table.push(&mut out, color[2] as i16);
        out.push(b' ');
        table.push(&mut out, color[3] as i16);
        out.push(b'\n');
    }

    out
}

/// Precomputed decimal strings for every i16, so the per-point text
/// conversion is a fixed-size copy instead of general formatting.
struct DecimalTable {
    bytes: Vec<u8>,
    spans: Vec<(u32, u8)>,
}

impl DecimalTable {
    fn build() -> Self {
        let mut bytes = Vec::with_capacity(65536 * 6);
        let mut spans = Vec::with_capacity(65536);
        for value in i16::MIN as i32..=i16::MAX as i32 {
            let start = bytes.len() as u32;
            let text = value.to_string();
            bytes.extend_from_slice(text.as_bytes());
            spans.push((start, text.len() as u8));
        }
        Self { bytes, spans }
    }

    #[inline]
    fn push(&self, out: &mut Vec<u8>, value: i16) {
        let (start, len) = self.spans[(value as i32 - i16::MIN as i32) as usize];
        out.extend_from_slice(&self.bytes[start as usize..start as usize + len as usize]);
    }
}

fn decimal_table() -> &'static DecimalTable {
    static TABLE: OnceLock<DecimalTable> = OnceLock::new();
    TABLE.get_or_init(DecimalTable::build)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a frame from per-pixel (position, rgba) samples.
    fn frame(width: u32, pixels: &[([i16; 3], [u8; 4])]) -> AlignedFrame {
        assert_eq!(pixels.len() % width as usize, 0);
        let mut positions = Vec::new();
        let mut color = Vec::new();
        for (position, rgba) in pixels {
            positions.extend_from_slice(position);
            color.extend_from_slice(rgba);
        }
        AlignedFrame {
            width,
            height: pixels.len() as u32 / width,
            positions,
            color,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn invalid_pixels_are_skipped_and_order_is_raster() {
        let frame = frame(
            4,
            &[
                ([0, 0, 0], [9, 9, 9, 9]),
                ([1, 0, 0], [10, 11, 12, 13]),
                ([0, 2, 0], [20, 21, 22, 23]),
                ([0, 0, 3], [30, 31, 32, 33]),
            ],
        );
        let buffer = encode_binary(&frame);
        assert_eq!(point_count(&buffer), 3);
        assert_eq!(buffer.len(), COUNT_PREFIX + 3 * POINT_STRIDE);

        // Records appear in source pixel order 1, 2, 3.
        let first = &buffer[COUNT_PREFIX..COUNT_PREFIX + POINT_STRIDE];
        assert_eq!(first, &[1, 0, 0, 0, 0, 0, 10, 11, 12]);
        let third = &buffer[COUNT_PREFIX + 2 * POINT_STRIDE..];
        assert_eq!(third, &[0, 0, 0, 0, 3, 0, 30, 31, 32]);
    }

    #[test]
    fn record_packs_little_endian_positions_and_drops_alpha() {
        let frame = frame(1, &[([-2, 300, -32768], [1, 2, 3, 200])]);
        let buffer = encode_binary(&frame);
        assert_eq!(point_count(&buffer), 1);
        let record = &buffer[COUNT_PREFIX..];
        assert_eq!(&record[..2], &(-2i16).to_le_bytes());
        assert_eq!(&record[2..4], &300i16.to_le_bytes());
        assert_eq!(&record[4..6], &(-32768i16).to_le_bytes());
        assert_eq!(&record[6..], &[1, 2, 3]);
    }

    #[test]
    fn degenerate_frame_encodes_to_empty_buffer() {
        let frame = frame(2, &[([0, 0, 0], [1, 1, 1, 1]), ([0, 0, 0], [2, 2, 2, 2])]);
        let buffer = encode_binary(&frame);
        assert_eq!(point_count(&buffer), 0);
        assert_eq!(buffer.len(), COUNT_PREFIX);

        assert!(encode_text(&frame).is_empty());
    }

    #[test]
    fn text_layout_is_space_separated_rgba_lines() {
        let frame = frame(
            2,
            &[
                ([5, -6, 700], [10, 20, 30, 255]),
                ([0, 0, 0], [1, 1, 1, 1]),
            ],
        );
        let text = String::from_utf8(encode_text(&frame)).unwrap();
        assert_eq!(text, "5 -6 700 10 20 30 255\n");
    }

    #[test]
    fn decimal_table_covers_extremes() {
        let table = decimal_table();
        for value in [i16::MIN, -1, 0, 1, 255, i16::MAX] {
            let mut out = Vec::new();
            table.push(&mut out, value);
            assert_eq!(String::from_utf8(out).unwrap(), value.to_string());
        }
    }

    #[test]
    fn point_count_of_truncated_buffer_is_zero() {
        assert_eq!(point_count(&[1, 2, 3]), 0);
        assert_eq!(point_count(&[]), 0);
    }
}
