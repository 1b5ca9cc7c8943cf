// VP3/Theora dequantization (C8): per-frame quantization matrix build and
// per-block token-to-coefficient dequantize + de-zigzag.
//
// Grounded on `init_dequantizer`/`dequant` in the original decoder, including
// the ramp-interpolated base-matrix blend, the `qmin = 8<<(inter+!i)` clamp
// floor and the qpi-0-DC-invariant overwrite. The scan permutation
// (`s->dsp.idct_permutation`/`scantable.permutated`) ties to the concrete
// IDCT implementation the original selects at init time (plain vs.
// SIMD-friendly butterfly order); since this crate's IDCT is an opaque trait
// contract (`src/transform.rs`, spec §4.11) rather than a ported kernel, the
// identity permutation is used here and the standard JPEG-style zigzag scan
// order stands in for the VP3-specific scan table (also not present in the
// retrieved source).

use crate::block::{BlockStore, DctToken, MacroblockMode};
use crate::util::clamp;
use crate::vp3::headers::SetupTables;

// Row-major index for each zigzag position 0..63 (low frequency first).
pub const ZIGZAG: [usize; 64] = [
  0, 1, 8, 16, 9, 2, 3, 10, //
  17, 24, 32, 25, 18, 11, 4, 5, //
  12, 19, 26, 33, 40, 48, 41, 34, //
  27, 20, 13, 6, 7, 14, 21, 28, //
  35, 42, 49, 56, 57, 50, 43, 36, //
  29, 22, 15, 23, 30, 37, 44, 51, //
  58, 59, 52, 45, 38, 31, 39, 46, //
  53, 60, 61, 54, 47, 55, 62, 63,
];

pub struct QuantMatrices {
  // [inter][plane][qpi] -> 64 coefficients in zigzag order.
  mats: [[Vec<[i16; 64]>; 3]; 2],
}

impl QuantMatrices {
  pub fn build(tables: &SetupTables, qps: &[u32]) -> Self {
    let mut mats: [[Vec<[i16; 64]>; 3]; 2] = Default::default();
    for inter in 0..2 {
      for plane in 0..3 {
        let ramp = &tables.quantizer_ramps[inter][plane];
        let mut per_qpi = Vec::with_capacity(qps.len());
        for &qpi_value in qps {
          let ac_scale = tables.ac_scale_factor[qpi_value as usize % 64];
          let dc_scale = tables.dc_scale_factor[qpi_value as usize % 64];
          per_qpi.push(build_one(tables, ramp, inter, qpi_value, ac_scale, dc_scale));
        }
        mats[inter][plane] = per_qpi;
      }
    }
    for row in mats.iter_mut() {
      for plane_mats in row.iter_mut() {
        if let Some(&dc0) = plane_mats.first().map(|m| &m[0]) {
          for m in plane_mats.iter_mut() {
            m[0] = dc0;
          }
        }
      }
    }
    Self { mats }
  }

  pub fn get(&self, plane: usize, inter: bool, qpi: usize) -> &[i16; 64] {
    &self.mats[inter as usize][plane][qpi]
  }
}

fn build_one(tables: &SetupTables, ramp: &crate::vp3::headers::QuantizerRamp, inter: usize, q: u32, ac_scale_factor: u16, dc_scale_factor: u16) -> [i16; 64] {
  let mut sum = 0u32;
  let mut qri = 0usize;
  for (idx, &size) in ramp.sizes.iter().enumerate() {
    sum += size;
    qri = idx;
    if q <= sum {
      break;
    }
  }
  let qistart = sum - ramp.sizes.get(qri).copied().unwrap_or(0);
  let size = ramp.sizes.get(qri).copied().unwrap_or(1).max(1);
  let bmi = *ramp.bases.get(qri).unwrap_or(&0) as usize;
  let bmj = *ramp.bases.get(qri + 1).unwrap_or(&0) as usize;
  let base_i = tables.base_matrices.get(bmi).copied().unwrap_or([0u8; 64]);
  let base_j = tables.base_matrices.get(bmj).copied().unwrap_or([0u8; 64]);

  let mut out = [0i16; 64];
  for i in 0..64 {
    let coeff = (2 * (sum as i64 - q as i64) * base_i[i] as i64 - 2 * (qistart as i64 - q as i64) * base_j[i] as i64 + size as i64) / (2 * size as i64);
    let qmin = 8i64 << (inter as i64 + if i == 0 { 1 } else { 0 });
    let qscale = if i == 0 { dc_scale_factor as i64 } else { ac_scale_factor as i64 };
    let value = clamp((qscale * coeff) / 100 * 4, qmin, 4096);
    out[i] = value as i16;
  }
  out
}

#[derive(Clone, Copy, Default)]
struct LevelCursor {
  pos: usize,
  eob_remaining: u32,
}

// Per-frame, per-plane cursor state into the token stream - must be walked
// in the same coded-block order `block::CodedBlockLists` was built in.
pub struct DequantCursors {
  cursors: [[LevelCursor; 64]; 3],
}

impl DequantCursors {
  pub fn new() -> Self {
    Self { cursors: [[LevelCursor::default(); 64]; 3] }
  }
}

impl Default for DequantCursors {
  fn default() -> Self {
    Self::new()
  }
}

// Dequantizes one coded block into `out` (64 entries, row-major 8x8), per
// `dequant()`: walk the shared per-(plane, zzi) token stream, writing
// coefficients at their de-zigzagged position, until end-of-block.
pub fn dequant_block(store: &BlockStore, cursors: &mut DequantCursors, qmat: &[i16; 64], plane: usize, coded_index: usize, out: &mut [i32; 64]) {
  out.fill(0);
  let raster = store.coded_blocks.plane(plane)[coded_index];
  let block = &store.blocks[plane][raster as usize];

  let mut i = 0usize;
  'outer: while i < 64 {
    let cursor = &mut cursors.cursors[plane][i];
    if cursor.eob_remaining > 0 {
      cursor.eob_remaining -= 1;
      break;
    }
    let level = store.tokens.level(plane, i);
    if cursor.pos >= level.len() {
      break;
    }
    let token = crate::block::unpack_token(level[cursor.pos]);
    cursor.pos += 1;
    match token {
      DctToken::EobRun(run) => {
        if run > 1 {
          cursor.eob_remaining = run - 1;
        }
        break 'outer;
      }
      DctToken::ZeroRunThenCoeff { zero_run, coeff } => {
        let target = i + zero_run as usize;
        if target < 64 {
          out[ZIGZAG[target]] = coeff * qmat[target] as i32;
        }
        i = target + 1;
      }
      DctToken::Coeff(coeff) => {
        out[ZIGZAG[i]] = coeff * qmat[i] as i32;
        i += 1;
      }
    }
  }

  out[ZIGZAG[0]] = block.dc as i32 * qmat[0] as i32;
}

pub fn qmat_index_is_inter(mode: MacroblockMode) -> bool {
  mode != MacroblockMode::Intra
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn zigzag_is_a_permutation_of_0_to_63() {
    let mut sorted = ZIGZAG.to_vec();
    sorted.sort_unstable();
    assert_eq!(sorted, (0usize..64).collect::<Vec<_>>());
  }
}
