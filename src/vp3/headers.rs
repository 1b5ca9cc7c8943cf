// Theora extradata / tables parsing (C11 VP3/Theora half, SPEC_FULL.md §6b).
//
// Grounded on `theora_decode_header`/`theora_decode_tables`/
// `theora_decode_init` in the original decoder: the three Xiph-laced
// packets (info/comment/tables), the loop-filter limit table, the AC/DC
// scale tables, the base-matrix pool and per-(inter,plane) quantizer ramps
// read by `init_dequantizer`, and the 80 canonical Huffman trees read by
// `read_huffman_tree`. The fixed VP3.1 default tables
// (`vp31_dc_scale_factor`, `vp31_intra_y_dequant`, etc.) are not present in
// the retrieved excerpt and are not needed here: every field this decoder
// requires is supplied by the Theora tables packet itself, never falling
// back to raw-VP3 built-in defaults (see DESIGN.md's "no raw-VP3 defaults"
// decision).

use crate::bitreader::BitReader;
use crate::error::{DecodeError, Result};
use crate::vlc::HuffmanTable;

const THEORA_MAGIC: [u8; 6] = *b"theora";
const HUFFMAN_TABLE_COUNT: usize = 80;
const MAX_BASE_MATRICES: usize = 384;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
  Yuv420,
  Yuv422,
  Yuv444,
}

#[derive(Clone, Copy, Debug)]
pub struct InfoHeader {
  pub version_major: u8,
  pub version_minor: u8,
  pub version_revision: u8,
  pub frame_mb_width: u32,
  pub frame_mb_height: u32,
  pub picture_width: u32,
  pub picture_height: u32,
  pub picture_x_offset: u32,
  pub picture_y_offset: u32,
  pub pixel_format: PixelFormat,
}

impl InfoHeader {
  fn version_at_least(&self, major: u8, minor: u8, revision: u8) -> bool {
    (self.version_major, self.version_minor, self.version_revision) >= (major, minor, revision)
  }

  pub fn parse(bits: &mut BitReader) -> Result<Self> {
    let version_major = bits.read_bits(8) as u8;
    let version_minor = bits.read_bits(8) as u8;
    let version_revision = bits.read_bits(8) as u8;

    let frame_mb_width = bits.read_bits(16);
    let frame_mb_height = bits.read_bits(16);

    let mut picture_width = frame_mb_width * 16;
    let mut picture_height = frame_mb_height * 16;
    let mut picture_x_offset = 0;
    let mut picture_y_offset = 0;

    let header = Self {
      version_major,
      version_minor,
      version_revision,
      frame_mb_width,
      frame_mb_height,
      picture_width,
      picture_height,
      picture_x_offset,
      picture_y_offset,
      pixel_format: PixelFormat::Yuv420,
    };

    if header.version_at_least(3, 2, 1) {
      picture_width = bits.read_bits(24);
      picture_height = bits.read_bits(24);
      picture_x_offset = bits.read_bits(8);
      picture_y_offset = bits.read_bits(8);
    }

    let _frame_rate_numerator = bits.read_bits(32);
    let _frame_rate_denominator = bits.read_bits(32);
    let _aspect_numerator = bits.read_bits(24);
    let _aspect_denominator = bits.read_bits(24);
    let _keyframe_interval_hint = bits.read_se_golomb();

    let colorspace = bits.read_bits(8);
    if colorspace != 0 && colorspace != 1 {
      return Err(DecodeError::InvalidSyntax(format!("reserved colorspace tag {}", colorspace)));
    }

    let _target_bitrate = bits.read_bits(24);
    let _quality_hint = bits.read_bits(6);
    let _keyframe_granule_shift = bits.read_bits(5);

    let pixel_format = match bits.read_bits(2) {
      0 => PixelFormat::Yuv420,
      2 => PixelFormat::Yuv422,
      3 => PixelFormat::Yuv444,
      other => return Err(DecodeError::InvalidSyntax(format!("reserved pixel format {}", other))),
    };
    let _reserved = bits.read_bit();

    if pixel_format != PixelFormat::Yuv420 {
      return Err(DecodeError::UnsupportedFeature(
        "only 4:2:0 pixel format is implemented".into(),
      ));
    }

    Ok(Self {
      picture_width,
      picture_height,
      picture_x_offset,
      picture_y_offset,
      pixel_format,
      ..header
    })
  }
}

// Parsed only for structural validity (vendor string + comment lengths);
// comment text itself is never surfaced (spec §6b).
pub fn validate_comment_packet(payload: &[u8]) -> Result<()> {
  if payload.len() < 4 {
    return Err(DecodeError::Truncated("comment packet missing vendor length".into()));
  }
  let vendor_len = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
  let mut pos = 4usize.checked_add(vendor_len).ok_or_else(|| truncated_comment())?;
  if pos > payload.len() {
    return Err(truncated_comment());
  }
  if pos + 4 > payload.len() {
    return Err(truncated_comment());
  }
  let comment_count = u32::from_le_bytes([payload[pos], payload[pos + 1], payload[pos + 2], payload[pos + 3]]) as usize;
  pos += 4;
  for _ in 0..comment_count {
    if pos + 4 > payload.len() {
      return Err(truncated_comment());
    }
    let len = u32::from_le_bytes([payload[pos], payload[pos + 1], payload[pos + 2], payload[pos + 3]]) as usize;
    pos += 4;
    pos = pos.checked_add(len).ok_or_else(truncated_comment)?;
    if pos > payload.len() {
      return Err(truncated_comment());
    }
  }
  Ok(())
}

fn truncated_comment() -> DecodeError {
  DecodeError::Truncated("comment packet shorter than its declared lengths".into())
}

#[derive(Clone, Debug)]
pub struct QuantizerRamp {
  // qr_size[i] sums to 63 across the ramp; qr_base has one more entry than
  // qr_size (the base-matrix index on either side of each run), matching
  // `init_dequantizer`'s `qr_base[qri]`/`qr_base[qri + 1]` pairing.
  pub sizes: Vec<u32>,
  pub bases: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct SetupTables {
  pub loop_filter_limits: [u8; 64],
  pub ac_scale_factor: [u16; 64],
  pub dc_scale_factor: [u16; 64],
  pub base_matrices: Vec<[u8; 64]>,
  // Indexed [inter][plane], matching `qr_count`/`qr_size`/`qr_base` in
  // `init_dequantizer`.
  pub quantizer_ramps: [[QuantizerRamp; 3]; 2],
  pub huffman_tables: Vec<HuffmanTable>,
}

fn read_scale_table(bits: &mut BitReader) -> Result<[u16; 64]> {
  let mut out = [0u16; 64];
  // Self-describing width trick: one flag bit selects between a fixed
  // 16-bit-per-entry table and a compact form whose per-entry width is
  // itself carried as a 4-bit "width minus one" field.
  if bits.read_bit() == 1 {
    for v in out.iter_mut() {
      *v = bits.read_bits(16) as u16;
    }
  } else {
    let width = bits.read_bits(4) + 1;
    for v in out.iter_mut() {
      *v = bits.read_bits(width) as u16;
    }
  }
  Ok(out)
}

// `(inter, plane)` is this ramp's position in `qr_count`/`qr_size`/`qr_base`
// iteration order (flat index `inter * 3 + plane`); `ramps` holds every
// ramp already decoded at a lower flat index, addressable by that same
// `inter * 3 + plane` scheme. The very first ramp (inter=0, plane=0) is
// always freshly coded - there is nothing earlier to back-reference.
fn read_quantizer_ramp(bits: &mut BitReader, inter: usize, plane: usize, ramps: &[QuantizerRamp]) -> Result<QuantizerRamp> {
  let newqr = if inter == 0 && plane == 0 { true } else { bits.read_bit() == 1 };
  if !newqr {
    // Default back-reference target is the previous plane's same-inter
    // ramp (wrapping to the last inter=0 ramp off the end of inter=1); an
    // inter=1 ramp may instead select its own plane's intra ramp.
    let (qtj, plj) = if inter == 1 && bits.read_bit() == 1 {
      (0usize, plane)
    } else {
      ((3 * inter + plane - 1) / 3, (plane + 2) % 3)
    };
    return Ok(ramps[qtj * 3 + plj].clone());
  }
  let mut sizes = Vec::new();
  let mut bases = Vec::new();
  bases.push(bits.read_bits(9));
  let mut sum = 0u32;
  while sum < 63 {
    let size = bits.read_ue_golomb() + 1;
    let size = size.min(63 - sum);
    sizes.push(size);
    sum += size;
    bases.push(bits.read_bits(9));
    if bases.len() > 64 {
      return Err(DecodeError::MalformedTable("quantizer ramp never reached 63 buckets".into()));
    }
  }
  Ok(QuantizerRamp { sizes, bases })
}

impl SetupTables {
  pub fn parse(bits: &mut BitReader) -> Result<Self> {
    let mut loop_filter_limits = [0u8; 64];
    for v in loop_filter_limits.iter_mut() {
      *v = bits.read_bits(7) as u8;
    }

    let ac_scale_factor = read_scale_table(bits)?;
    let dc_scale_factor = read_scale_table(bits)?;

    let num_base_matrices = bits.read_bits(9) as usize;
    if num_base_matrices > MAX_BASE_MATRICES {
      return Err(DecodeError::MalformedTable(format!(
        "{} base matrices exceeds the {} maximum",
        num_base_matrices, MAX_BASE_MATRICES
      )));
    }
    let mut base_matrices = Vec::with_capacity(num_base_matrices);
    for _ in 0..num_base_matrices {
      let mut matrix = [0u8; 64];
      for v in matrix.iter_mut() {
        *v = bits.read_bits(8) as u8;
      }
      base_matrices.push(matrix);
    }

    let mut ramps: Vec<QuantizerRamp> = Vec::with_capacity(6);
    for flat_index in 0..6 {
      let inter = flat_index / 3;
      let plane = flat_index % 3;
      let ramp = read_quantizer_ramp(bits, inter, plane, &ramps)?;
      ramps.push(ramp);
    }
    let mut drained = ramps.into_iter();
    let quantizer_ramps: [[QuantizerRamp; 3]; 2] = [
      [drained.next().unwrap(), drained.next().unwrap(), drained.next().unwrap()],
      [drained.next().unwrap(), drained.next().unwrap(), drained.next().unwrap()],
    ];

    let mut huffman_tables = Vec::with_capacity(HUFFMAN_TABLE_COUNT);
    for _ in 0..HUFFMAN_TABLE_COUNT {
      huffman_tables.push(HuffmanTable::read_from_bitstream(bits, 5)?);
    }

    Ok(Self {
      loop_filter_limits,
      ac_scale_factor,
      dc_scale_factor,
      base_matrices,
      quantizer_ramps,
      huffman_tables,
    })
  }
}

pub struct TheoraExtradata {
  pub info: InfoHeader,
  pub tables: SetupTables,
}

fn read_xiph_lacing_length(data: &[u8], pos: &mut usize) -> Result<usize> {
  let mut len = 0usize;
  loop {
    let byte = *data.get(*pos).ok_or_else(|| DecodeError::Truncated("xiph lacing header ran past extradata".into()))?;
    *pos += 1;
    len += byte as usize;
    if byte != 0xFF {
      break;
    }
  }
  Ok(len)
}

fn take_packet<'a>(data: &'a [u8], expected_type: u8) -> Result<&'a [u8]> {
  if data.len() < 7 {
    return Err(DecodeError::Truncated("theora packet shorter than its 7-byte header".into()));
  }
  if data[0] != expected_type {
    return Err(DecodeError::InvalidSyntax(format!(
      "expected theora packet type 0x{:02x}, got 0x{:02x}",
      expected_type, data[0]
    )));
  }
  if data[1..7] != THEORA_MAGIC {
    return Err(DecodeError::InvalidSyntax("missing \"theora\" magic".into()));
  }
  Ok(&data[7..])
}

impl TheoraExtradata {
  pub fn parse(extradata: &[u8]) -> Result<Self> {
    let mut pos = 0usize;
    let len0 = read_xiph_lacing_length(extradata, &mut pos)?;
    let len1 = read_xiph_lacing_length(extradata, &mut pos)?;

    let total = extradata.len();
    let packet0_end = pos.checked_add(len0).ok_or_else(|| DecodeError::Truncated("extradata packet length overflow".into()))?;
    let packet1_end = packet0_end.checked_add(len1).ok_or_else(|| DecodeError::Truncated("extradata packet length overflow".into()))?;
    if packet1_end > total {
      return Err(DecodeError::Truncated("extradata shorter than its lacing lengths".into()));
    }

    let packet0 = &extradata[pos..packet0_end];
    let packet1 = &extradata[packet0_end..packet1_end];
    let packet2 = &extradata[packet1_end..];

    let info_payload = take_packet(packet0, 0x80)?;
    let mut info_bits = BitReader::new(info_payload);
    let info = InfoHeader::parse(&mut info_bits)?;

    let comment_payload = take_packet(packet1, 0x81)?;
    validate_comment_packet(comment_payload)?;

    let tables_payload = take_packet(packet2, 0x82)?;
    let mut tables_bits = BitReader::new(tables_payload);
    let tables = SetupTables::parse(&mut tables_bits)?;

    Ok(Self { info, tables })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn xiph_lacing_length_handles_multi_byte_runs() {
    let data = [0xFFu8, 0xFFu8, 0x05u8];
    let mut pos = 0;
    let len = read_xiph_lacing_length(&data, &mut pos).unwrap();
    assert_eq!(len, 0xFF + 0xFF + 5);
    assert_eq!(pos, 3);
  }

  #[test]
  fn comment_packet_validates_declared_lengths() {
    let mut payload = Vec::new();
    payload.extend_from_slice(&4u32.to_le_bytes()); // vendor length
    payload.extend_from_slice(b"xiph");
    payload.extend_from_slice(&1u32.to_le_bytes()); // comment count
    payload.extend_from_slice(&5u32.to_le_bytes());
    payload.extend_from_slice(b"hello");
    assert!(validate_comment_packet(&payload).is_ok());

    payload.truncate(payload.len() - 1);
    assert!(validate_comment_packet(&payload).is_err());
  }

  #[test]
  fn rejects_wrong_packet_type() {
    let mut packet = vec![0x81u8];
    packet.extend_from_slice(&THEORA_MAGIC);
    assert!(take_packet(&packet, 0x80).is_err());
  }

  #[test]
  fn rejects_bad_magic() {
    let mut packet = vec![0x80u8];
    packet.extend_from_slice(b"xxxxxx");
    assert!(take_packet(&packet, 0x80).is_err());
  }

  fn bits_to_bytes(bits: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut acc = 0u8;
    let mut n = 0u32;
    for c in bits.chars() {
      acc = (acc << 1) | (c as u8 - b'0');
      n += 1;
      if n == 8 {
        bytes.push(acc);
        acc = 0;
        n = 0;
      }
    }
    if n > 0 {
      acc <<= 8 - n;
      bytes.push(acc);
    }
    bytes
  }

  fn field(value: u32, width: u32) -> String {
    format!("{:0width$b}", value, width = width as usize)
  }

  #[test]
  fn info_header_parses_core_version_and_dimension_fields() {
    // version 3.2.1, frame_mb_width/height = 1 (16x16 frame), picture
    // width/height/x/y via the >=3.2.1 branch, frame rate, aspect, kf
    // interval (se_golomb(0) = "1"), colorspace=0, bitrate, quality,
    // kfgshift, pixel format 0 (4:2:0), reserved bit.
    let bits = field(3, 8)
      + &field(2, 8)
      + &field(1, 8)
      + &field(1, 16)
      + &field(1, 16)
      + &field(16, 24)
      + &field(16, 24)
      + &field(0, 8)
      + &field(0, 8)
      + &field(30, 32)
      + &field(1, 32)
      + &field(1, 24)
      + &field(1, 24)
      + "1" // se_golomb(0)
      + &field(0, 8) // colorspace
      + &field(0, 24) // bitrate
      + &field(0, 6) // quality
      + &field(0, 5) // kfgshift
      + &field(0, 2) // pixel format
      + "0"; // reserved
    let info_payload = bits_to_bytes(&bits);

    let mut reader = BitReader::new(&info_payload);
    let info = InfoHeader::parse(&mut reader).unwrap();
    assert_eq!(info.version_major, 3);
    assert_eq!(info.version_minor, 2);
    assert_eq!(info.version_revision, 1);
    assert_eq!(info.picture_width, 16);
    assert_eq!(info.picture_height, 16);
    assert_eq!(info.pixel_format, PixelFormat::Yuv420);
  }
}
