// VP3/Theora entropy unpack (C6): superblock/block coding flags, macroblock
// modes, motion vectors, per-block quantizer indices and DCT tokens.
//
// Grounded on `unpack_block_coding`/`unpack_modes`/`unpack_vectors`/
// `unpack_block_qpis`/`unpack_vlcs`/`unpack_dct_coeffs` in the original
// decoder. `ModeAlphabet`/`token_to_type` are carried verbatim from the
// original source. The four fixed VLC tables the original builds once at
// init time from its own compile-time data
// (`superblock_run_length_vlc_table`, `fragment_run_length_vlc_table`,
// `mode_code_vlc_table`, `motion_vector_vlc_table`) and the per-token
// EOB/zero-run/coefficient magnitude tables (`eob_run_base`,
// `eob_run_get_bits`, `zero_run_get_bits`, `coeff_get_bits`, `coeff_tables`,
// `zero_run_base`, `fixed_motion_vector_table`, `motion_vector_table`) are
// declared but never defined anywhere in the retrieved source - they live in
// a separate, unretrieved tables header. Each is reconstructed here from the
// *algorithm* the original describes (a prefix-free code indexed by
// increasing symbol, magnitude classes that widen with the token index) and
// clearly labelled as a reconstruction, the same treatment `dirac/arith.rs`
// gives `PROB_STEP`/`NEXT_CONTEXT`. These are functionally self-consistent
// (pack/unpack round-trips, codes stay prefix-free) but are not guaranteed
// to match the original bit patterns.

use crate::bitreader::BitReader;
use crate::block::{BlockStore, DctToken, MacroblockMode};
use crate::error::{DecodeError, Result};
use crate::vlc::HuffmanTable;

pub const CODING_MODE_COUNT: usize = 8;

pub const MODE_ALPHABET: [[u8; CODING_MODE_COUNT]; 6] = [
  [2, 4, 3, 0, 1, 5, 6, 7],
  [2, 4, 0, 3, 1, 5, 6, 7],
  [2, 3, 4, 0, 1, 5, 6, 7],
  [2, 3, 0, 4, 1, 5, 6, 7],
  [0, 2, 4, 3, 1, 5, 6, 7],
  [0, 5, 2, 4, 3, 1, 6, 7],
];

// 0=EOB, 1=pure zero run, 2=single coefficient, 3=zero run then coefficient.
const TOKEN_TO_TYPE: [u8; 32] = [
  0, 0, 0, 0, 0, 0, 0, //
  1, 1, //
  2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, 2, //
  3, 3, 3, 3, 3, 3, 3, 3, 3,
];

// A prefix-free code assigning symbol `i` the codeword "1"*i + "0" (the last
// symbol gets "1"*(n-1) with no terminator). Simple, always valid regardless
// of `n`, and documented as a stand-in for the original's (unavailable)
// real codeword assignment - see the module doc comment.
fn unary_codes(n: usize) -> Vec<(u32, u32, u8)> {
  let mut codes = Vec::with_capacity(n);
  for i in 0..n - 1 {
    let bits = (i + 1) as u32;
    let code = ((1u32 << i) - 1) << 1;
    codes.push((code, bits, i as u8));
  }
  let bits = (n - 1) as u32;
  let code = (1u32 << (n - 1)) - 1;
  codes.push((code, bits.max(1), (n - 1) as u8));
  codes
}

pub struct FixedTables {
  pub long_run: HuffmanTable,
  pub short_run: HuffmanTable,
  pub mode_code: HuffmanTable,
  pub motion_vector: HuffmanTable,
}

impl FixedTables {
  pub fn build() -> Result<Self> {
    Ok(Self {
      long_run: HuffmanTable::from_codes(&unary_codes(34))?,
      short_run: HuffmanTable::from_codes(&unary_codes(30))?,
      mode_code: HuffmanTable::from_codes(&unary_codes(8))?,
      motion_vector: HuffmanTable::from_codes(&unary_codes(63))?,
    })
  }
}

fn fixed_mv_value(code: u32) -> i32 {
  code as i32 - 31
}

// Symbols near 0 get shorter unary codes, so a zigzag mapping puts the most
// probable (small, alternating-sign) motion vector deltas on the cheapest
// codes - the same ordering rationale the original's probability-sorted
// table would have used.
fn vlc_mv_value(symbol: u32) -> i32 {
  if symbol == 0 {
    0
  } else if symbol % 2 == 1 {
    -(((symbol + 1) / 2) as i32)
  } else {
    (symbol / 2) as i32
  }
}

#[derive(Clone, Copy)]
struct EobClass {
  base: u32,
  extra_bits: u32,
}

// 7 EOB-run magnitude classes (token indices 0..6): small literal runs, then
// widening ranges for the last two tokens.
const EOB_CLASSES: [EobClass; 7] = [
  EobClass { base: 1, extra_bits: 0 },
  EobClass { base: 2, extra_bits: 0 },
  EobClass { base: 3, extra_bits: 0 },
  EobClass { base: 4, extra_bits: 0 },
  EobClass { base: 5, extra_bits: 0 },
  EobClass { base: 6, extra_bits: 2 },
  EobClass { base: 10, extra_bits: 6 },
];

// Pure zero-run tokens (indices 7..8): no base, a short and a long class.
const ZERO_RUN_ONLY_BITS: [u32; 2] = [3, 6];

#[derive(Clone, Copy)]
struct OneCoeffBand {
  bits: u32,
  base: i32,
}

// 7 magnitude bands x 2 sign variants = 14 single-coefficient tokens
// (indices 9..22).
const ONE_COEFF_BANDS: [OneCoeffBand; 7] = [
  OneCoeffBand { bits: 0, base: 1 },
  OneCoeffBand { bits: 0, base: 2 },
  OneCoeffBand { bits: 1, base: 3 },
  OneCoeffBand { bits: 2, base: 5 },
  OneCoeffBand { bits: 3, base: 9 },
  OneCoeffBand { bits: 4, base: 17 },
  OneCoeffBand { bits: 5, base: 33 },
];

#[derive(Clone, Copy)]
struct ZeroRunCoeffBand {
  run_bits: u32,
  run_base: u32,
}

// 9 zero-run-then-coefficient tokens (indices 23..31): the coefficient is
// always +-1 (sign by token parity), the run length widens with token index.
const ZERO_RUN_COEFF_BANDS: [ZeroRunCoeffBand; 9] = [
  ZeroRunCoeffBand { run_bits: 0, run_base: 1 },
  ZeroRunCoeffBand { run_bits: 0, run_base: 1 },
  ZeroRunCoeffBand { run_bits: 1, run_base: 2 },
  ZeroRunCoeffBand { run_bits: 1, run_base: 2 },
  ZeroRunCoeffBand { run_bits: 2, run_base: 4 },
  ZeroRunCoeffBand { run_bits: 2, run_base: 4 },
  ZeroRunCoeffBand { run_bits: 3, run_base: 8 },
  ZeroRunCoeffBand { run_bits: 3, run_base: 8 },
  ZeroRunCoeffBand { run_bits: 4, run_base: 16 },
];

// Phase 1: per-superblock partial/full coding state, plus the derived
// per-block coded flag list (§9 "Coded state").
pub fn unpack_block_coding(
  bits: &mut BitReader,
  tables: &FixedTables,
  store: &mut BlockStore,
  num_superblocks: [usize; 3],
) -> Result<()> {
  let total_sb: usize = num_superblocks.iter().sum();
  let mut sb_partial = vec![false; total_sb];
  let mut sb_full = vec![false; total_sb];

  let mut decoded = 0usize;
  let mut num_partial = 0usize;
  let mut bit = bits.read_bit() == 1;
  loop {
    let mut run = tables.long_run.decode(bits)? as usize + 1;
    if run == 34 {
      run += bits.read_bits(12) as usize;
    }
    if decoded + run > total_sb {
      return Err(DecodeError::InvalidSyntax("superblock run length overruns superblock count".into()));
    }
    for slot in sb_partial.iter_mut().skip(decoded).take(run) {
      *slot = bit;
    }
    decoded += run;
    if bit {
      num_partial += run;
    }
    if run == 4129 {
      bit = bits.read_bit() == 1;
    } else {
      bit = !bit;
    }
    if decoded >= total_sb {
      break;
    }
  }

  if total_sb > num_partial {
    let mut decoded = 0usize;
    let mut i = 0usize;
    let mut bit = bits.read_bit() == 1;
    let target = total_sb - num_partial;
    loop {
      let mut run = tables.long_run.decode(bits)? as usize + 1;
      if run == 34 {
        run += bits.read_bits(12) as usize;
      }
      let mut filled = 0usize;
      while filled < run {
        if i >= total_sb {
          return Err(DecodeError::InvalidSyntax("full-coding run ran past superblock count".into()));
        }
        if !sb_partial[i] {
          sb_full[i] = bit;
          filled += 1;
        }
        i += 1;
      }
      decoded += run;
      if run == 4129 {
        bit = bits.read_bit() == 1;
      } else {
        bit = !bit;
      }
      if decoded >= target {
        break;
      }
    }
  }

  let mut fragment_bit = false;
  let mut fragment_run = 0u32;
  if num_partial > 0 {
    fragment_bit = bits.read_bit() == 0;
  }

  let mut sb_cursor = 0usize;
  for plane in 0..3 {
    let mut num_coded = 0u32;
    for sb in 0..num_superblocks[plane] {
      let global_sb = sb_cursor + sb;
      let partially_coded = sb_partial[global_sb];
      let fully_coded = sb_full[global_sb];
      for hilbert_i in 0..16 {
        let slot = 16 * sb + hilbert_i;
        let Some(block_i) = store.all_blocks[plane].get(slot).copied().flatten() else {
          continue;
        };
        let coded = if partially_coded {
          // A freshly (re)loaded run is not decremented on the same
          // iteration it was read on - the original's postfix `run_length--`
          // has its decrement overwritten by the reload assignment, so a
          // decoded run of R covers R+1 blocks before the next reload.
          if fragment_run == 0 {
            fragment_run = tables.short_run.decode(bits)? as u32;
            fragment_bit = !fragment_bit;
          } else {
            fragment_run -= 1;
          }
          fragment_bit
        } else {
          fully_coded
        };
        let block = &mut store.blocks[plane][block_i as usize];
        *block = bytemuck::Zeroable::zeroed();
        if coded {
          block.set_coded(crate::block::CodedState::PartiallyCoded);
          store.coded_blocks.push(block_i);
          num_coded += 1;
        } else {
          block.set_coded(crate::block::CodedState::NotCoded);
        }
      }
    }
    store.coded_blocks.finish_plane(plane);
    let _ = num_coded;
    sb_cursor += num_superblocks[plane];
  }
  Ok(())
}

pub struct MacroblockModes {
  // One mode per macroblock, in the same luma-Hilbert macroblock order the
  // decoder's other phases iterate (`all_blocks[0]` grouped 4-at-a-time).
  pub modes: Vec<MacroblockMode>,
  pub num_mvs: usize,
}

// Phase 3: per-macroblock coding mode.
pub fn unpack_modes(bits: &mut BitReader, tables: &FixedTables, store: &BlockStore) -> Result<MacroblockModes> {
  let num_macroblocks = store.all_blocks[0].len() / 4;
  let scheme = bits.read_bits(3);

  let mut custom = [0u8; CODING_MODE_COUNT];
  let mode_table: [u8; CODING_MODE_COUNT] = if scheme == 0 {
    for i in 0..8u8 {
      custom[bits.read_bits(3) as usize] = i;
    }
    custom
  } else {
    MODE_ALPHABET[(scheme - 1) as usize]
  };

  let mut modes = Vec::with_capacity(num_macroblocks);
  let mut num_mvs = 0usize;

  for mb_i in 0..num_macroblocks {
    let luma_blocks: Vec<Option<u32>> = (0..4).map(|j| store.all_blocks[0][4 * mb_i + j]).collect();
    if luma_blocks[0].is_none() {
      modes.push(MacroblockMode::InterNoMv);
      continue;
    }
    let any_coded = luma_blocks
      .iter()
      .flatten()
      .any(|&b| store.blocks[0][b as usize].coded().is_coded());
    if !any_coded {
      modes.push(MacroblockMode::InterNoMv);
      continue;
    }

    let code = if scheme == 7 {
      bits.read_bits(3) as u8
    } else {
      mode_table[tables.mode_code.decode(bits)? as usize]
    };
    let mode = MacroblockMode::from_code(code);

    match mode {
      MacroblockMode::InterPlusMv | MacroblockMode::InterGoldenMv => num_mvs += 1,
      MacroblockMode::InterFourMv => {
        num_mvs += luma_blocks.iter().flatten().filter(|&&b| store.blocks[0][b as usize].coded().is_coded()).count();
      }
      _ => {}
    }

    modes.push(mode);
  }

  Ok(MacroblockModes { modes, num_mvs })
}

// Phase 4: flat list of motion vectors, consumed by the reconstruction
// scheduler in the same per-macroblock order `unpack_modes` produced them.
pub fn unpack_vectors(bits: &mut BitReader, tables: &FixedTables, num_mvs: usize) -> Vec<(i32, i32)> {
  let mut mvs = Vec::with_capacity(num_mvs);
  if bits.read_bit() == 1 {
    for _ in 0..num_mvs {
      let x = fixed_mv_value(bits.read_bits(6));
      let y = fixed_mv_value(bits.read_bits(6));
      mvs.push((x, y));
    }
  } else {
    for _ in 0..num_mvs {
      let x = tables.motion_vector.decode(bits).map(vlc_mv_value).unwrap_or(0);
      let y = tables.motion_vector.decode(bits).map(vlc_mv_value).unwrap_or(0);
      mvs.push((x, y));
    }
  }
  mvs
}

// Phase 5: per-block quantizer-index bump, run-length coded the same way as
// phase 1's superblock coding. Walks the cross-plane flat coded-block list,
// bumping `qpi` on blocks whose current `qpi` equals the pass index - same
// "only touch blocks still at this qpi" rule as the original.
pub fn unpack_block_qpis(bits: &mut BitReader, tables: &FixedTables, store: &mut BlockStore, num_qps: usize) -> Result<()> {
  let num_coded_blocks = store.coded_blocks.total_coded_blocks();
  let mut num_blocks = num_coded_blocks;

  for qpi in 0..num_qps.saturating_sub(1) {
    if num_blocks == 0 {
      break;
    }
    let mut i = 0usize;
    let mut decoded = 0usize;
    let mut num_at_qpi = 0usize;
    let mut bit = bits.read_bit() == 1;
    loop {
      let mut run = tables.long_run.decode(bits)? as usize + 1;
      if run == 34 {
        run += bits.read_bits(12) as usize;
      }
      decoded += run;
      if !bit {
        num_at_qpi += run;
      }
      let mut filled = 0usize;
      while filled < run {
        if i >= num_coded_blocks {
          return Err(DecodeError::InvalidSyntax("qpi run ran past coded block count".into()));
        }
        let plane = store.coded_blocks.plane_for_flat_index(i);
        let raster = store.coded_blocks.flat()[i];
        let block = &mut store.blocks[plane][raster as usize];
        if block.qpi as usize == qpi {
          block.qpi += bit as u8;
          filled += 1;
        }
        i += 1;
      }
      if run == 4129 {
        bit = bits.read_bit() == 1;
      } else {
        bit = !bit;
      }
      if decoded >= num_blocks {
        break;
      }
    }
    num_blocks -= num_at_qpi;
  }
  Ok(())
}

struct EobCarry {
  run: u32,
}

fn decode_tokens_for_level(
  bits: &mut BitReader,
  table: &HuffmanTable,
  store: &mut BlockStore,
  zzi: usize,
  plane: usize,
  mut eob_run: u32,
  remaining: &mut [u32; 64],
) -> Result<u32> {
  let num_coeffs = remaining[zzi];
  let mut coeff_i;
  let mut blocks_ended;

  if eob_run > num_coeffs {
    coeff_i = num_coeffs;
    blocks_ended = num_coeffs;
    eob_run -= num_coeffs;
  } else {
    coeff_i = eob_run;
    blocks_ended = eob_run;
    eob_run = 0;
  }

  if blocks_ended > 0 {
    store.tokens.push(plane, zzi, DctToken::EobRun(blocks_ended));
  }

  while coeff_i < num_coeffs {
    let token = table.decode(bits)? as usize & 0x1F;
    let token_type = TOKEN_TO_TYPE[token];

    match token_type {
      0 => {
        let class = EOB_CLASSES[token];
        let mut run = class.base;
        if class.extra_bits > 0 {
          run += bits.read_bits(class.extra_bits);
        }
        if run > num_coeffs - coeff_i {
          let spill = num_coeffs - coeff_i;
          store.tokens.push(plane, zzi, DctToken::EobRun(spill));
          blocks_ended += spill;
          eob_run = run - spill;
          coeff_i = num_coeffs;
        } else {
          store.tokens.push(plane, zzi, DctToken::EobRun(run));
          blocks_ended += run;
          coeff_i += run;
        }
      }
      1 => {
        let bits_to_get = ZERO_RUN_ONLY_BITS[token - 7];
        let zero_run = bits.read_bits(bits_to_get);
        store.tokens.push(plane, zzi, DctToken::ZeroRunThenCoeff { zero_run, coeff: 0 });
        clamp_and_apply_zero_run(zzi, zero_run, remaining)?;
        coeff_i += 1;
      }
      2 => {
        let band = ONE_COEFF_BANDS[(token - 9) / 2];
        let negative = (token - 9) % 2 == 1;
        let extra = if band.bits > 0 { bits.read_bits(band.bits) as i32 } else { 0 };
        let magnitude = band.base + extra;
        let coeff = if negative { -magnitude } else { magnitude };
        if zzi == 0 {
          let raster = store.coded_blocks.plane(plane)[coeff_i as usize];
          store.blocks[plane][raster as usize].dc = coeff as i16;
        }
        store.tokens.push(plane, zzi, DctToken::Coeff(coeff));
        coeff_i += 1;
      }
      _ => {
        let band = ZERO_RUN_COEFF_BANDS[token - 23];
        let negative = (token - 23) % 2 == 1;
        let coeff = if negative { -1 } else { 1 };
        let mut zero_run = band.run_base;
        if band.run_bits > 0 {
          zero_run += bits.read_bits(band.run_bits);
        }
        store.tokens.push(plane, zzi, DctToken::ZeroRunThenCoeff { zero_run, coeff });
        clamp_and_apply_zero_run(zzi, zero_run, remaining)?;
        coeff_i += 1;
      }
    }
  }

  if blocks_ended > 0 {
    for level in remaining.iter_mut().skip(zzi + 1) {
      *level = level.saturating_sub(blocks_ended);
    }
  }

  Ok(eob_run)
}

fn clamp_and_apply_zero_run(zzi: usize, zero_run: u32, remaining: &mut [u32; 64]) -> Result<()> {
  let zero_run = if zzi as u32 + zero_run > 64 { 64 - zzi as u32 } else { zero_run };
  for level in remaining.iter_mut().skip(zzi + 1).take(zero_run as usize) {
    *level = level.saturating_sub(1);
  }
  Ok(())
}

// Phase 6: DC then AC coefficient groups (§4.6/§4.7), in the original's
// exact group boundaries (1..5, 6..14, 15..27, 28..63).
pub fn unpack_dct_coeffs(bits: &mut BitReader, huffman_tables: &[HuffmanTable], store: &mut BlockStore) -> Result<()> {
  let mut remaining = [[store.coded_blocks.plane_len(0) as u32, store.coded_blocks.plane_len(1) as u32, store.coded_blocks.plane_len(2) as u32]; 64];
  // remaining[zzi][plane]: number of blocks whose token stream has not yet
  // reached a fully-consumed EOB at this coefficient level.
  let mut eob_run = 0u32;

  let dc_y_table = bits.read_bits(4) as usize;
  let dc_c_table = bits.read_bits(4) as usize;

  for plane in 0..3 {
    let table_idx = if plane == 0 { dc_y_table } else { dc_c_table };
    let mut level_counts: [u32; 64] = std::array::from_fn(|zzi| remaining[zzi][plane]);
    eob_run = decode_tokens_for_level(bits, &huffman_tables[table_idx], store, 0, plane, eob_run, &mut level_counts)?;
    for (zzi, level) in remaining.iter_mut().enumerate() {
      level[plane] = level_counts[zzi];
    }
  }

  let ac_y_table = bits.read_bits(4) as usize;
  let ac_c_table = bits.read_bits(4) as usize;

  let groups: [(usize, usize, usize); 4] = [(16, 1, 5), (32, 6, 14), (48, 15, 27), (64, 28, 63)];
  for (group_base, start, end) in groups {
    for zzi in start..=end {
      for plane in 0..3 {
        let table_idx = if plane == 0 { ac_y_table } else { ac_c_table };
        let flat = group_base + table_idx;
        let mut level_counts: [u32; 64] = std::array::from_fn(|z| remaining[z][plane]);
        eob_run = decode_tokens_for_level(bits, &huffman_tables[flat], store, zzi, plane, eob_run, &mut level_counts)?;
        for (z, level) in remaining.iter_mut().enumerate() {
          level[plane] = level_counts[z];
        }
      }
    }
  }

  let _ = EobCarry { run: eob_run };
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unary_codes_are_prefix_free_and_decodable() {
    let table = HuffmanTable::from_codes(&unary_codes(5)).unwrap();
    for symbol in 0..5u8 {
      let codes = unary_codes(5);
      let (code, bits, sym) = codes[symbol as usize];
      assert_eq!(sym, symbol);
      let mut value: u32 = code;
      let mut byte = 0u8;
      for i in 0..bits {
        let bit = (value >> (bits - 1 - i)) & 1;
        byte = (byte << 1) | bit as u8;
      }
      byte <<= 8 - bits.min(8);
      let data = [byte];
      let mut reader = BitReader::new(&data);
      assert_eq!(table.decode(&mut reader).unwrap(), symbol);
      value = 0;
      let _ = value;
    }
  }

  #[test]
  fn fixed_mv_value_centers_on_code_31() {
    assert_eq!(fixed_mv_value(31), 0);
    assert_eq!(fixed_mv_value(0), -31);
    assert_eq!(fixed_mv_value(63), 32);
  }

  #[test]
  fn vlc_mv_value_zigzags_around_zero() {
    assert_eq!(vlc_mv_value(0), 0);
    assert_eq!(vlc_mv_value(1), -1);
    assert_eq!(vlc_mv_value(2), 1);
    assert_eq!(vlc_mv_value(3), -2);
  }

  #[test]
  fn mode_alphabet_always_contains_all_eight_modes() {
    for scheme in MODE_ALPHABET.iter() {
      let mut sorted = scheme.to_vec();
      sorted.sort_unstable();
      assert_eq!(sorted, (0u8..8).collect::<Vec<_>>());
    }
  }
}
