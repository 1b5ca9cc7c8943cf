// Wavelet entropy unpack - Dirac (C5).
//
// Grounded on `subband`/`subband_dc`/`coeff_unpack`/`codeblock`/
// `coeff_dequant` in the original decoder. The exact quantizer-factor and
// quantizer-offset lookup tables that the original derives from a
// quantizer index are not present in the retrieved excerpt (they live in a
// separate table header); `quant_factor`/`quant_offset` below reconstruct
// the documented formula `c = (c*qfactor + qoffset) >> 2` with a principled
// logarithmic ladder rather than guessed byte values - see DESIGN.md's
// open-question log.

use crate::array2d::Array2D;
use crate::bitreader::BitReader;
use crate::dirac::arith::{ArithDecoder, DiracContext};
use crate::error::{DecodeError, Result};
use crate::util::{abs, signum};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
  Ll,
  Hl,
  Lh,
  Hh,
}

#[derive(Clone, Copy, Debug)]
pub struct SubbandRegion {
  pub y0: usize,
  pub x0: usize,
  pub h: usize,
  pub w: usize,
}

impl SubbandRegion {
  // The parent subband at the previous level covers the same area at half
  // resolution, offset from this region's origin by its own (different)
  // origin; maps a coefficient in this region to its parent's coordinates
  // (spec §4.5 "coefficient at half position").
  fn parent_coord(&self, parent: &SubbandRegion, y: usize, x: usize) -> (usize, usize) {
    (parent.y0 + (y - self.y0) / 2, parent.x0 + (x - self.x0) / 2)
  }
}

// Quantizer factor for a quantizer index, per the dequantization formula in
// §4.8/§4.5: a logarithmic ladder with four sub-steps per octave.
pub fn quant_factor(index: u32) -> i32 {
  const STEP: [i32; 4] = [4, 5, 6, 7];
  let octave = index / 4;
  let step = STEP[(index % 4) as usize];
  step << octave.min(24)
}

pub fn quant_offset(factor: i32) -> i32 {
  (factor * 2) / 5
}

fn dequantize(coeff: i32, qfactor: i32, qoffset: i32) -> i32 {
  if coeff == 0 {
    return 0;
  }
  let magnitude = abs(coeff) * qfactor + qoffset;
  signum(coeff) * (magnitude >> 2)
}

fn follow_context(parent_nonzero: bool, neighbourhood_nonzero: bool) -> DiracContext {
  use DiracContext::*;
  match (parent_nonzero, neighbourhood_nonzero) {
    (false, false) => ZeroPredictZeroNeighbourhoodFollow,
    (false, true) => ZeroPredictNonzeroNeighbourhoodFollow,
    (true, false) => NonzeroPredictZeroNeighbourhoodFollow,
    (true, true) => NonzeroPredictNonzeroNeighbourhoodFollow,
  }
}

fn sign_context(up: i32, left: i32) -> DiracContext {
  let predict = signum(up) + signum(left);
  if predict < 0 {
    DiracContext::SignNegative
  } else if predict > 0 {
    DiracContext::SignPositive
  } else {
    DiracContext::SignZero
  }
}

// Decode one subband (level, orientation) into `coeffs`, which holds the
// shared coefficient plane for every level/orientation. `parent` is `None`
// for levels 0 and 1 (no parent subband exists yet); for level >= 2 it is
// the same-orientation region one level up, already decoded.
pub fn decode_subband(
  bits: &mut BitReader,
  data: &[u8],
  coeffs: &mut Array2D<i32>,
  region: SubbandRegion,
  parent: Option<SubbandRegion>,
  codeblocks_h: usize,
  codeblocks_v: usize,
) -> Result<()> {
  let length = bits.read_ue_golomb() as usize;
  if length == 0 {
    // Zero-length subband: already initialised to zero, nothing to do
    // (spec §8 scenario 5).
    return Ok(());
  }

  let quant_index = bits.read_ue_golomb() as u32;
  let qfactor = quant_factor(quant_index);
  let qoffset = quant_offset(qfactor);

  bits.align();
  let byte_offset = bits.byte_position();
  let region_bytes = crate::dirac::arith::checked_region(data, byte_offset, length)?;
  let mut arith = ArithDecoder::new(region_bytes, length);

  let codeblocks_h = codeblocks_h.max(1);
  let codeblocks_v = codeblocks_v.max(1);
  let single_codeblock = codeblocks_h == 1 && codeblocks_v == 1;

  for cb_row in 0..codeblocks_v {
    let y0 = region.y0 + cb_row * region.h / codeblocks_v;
    let y1 = region.y0 + (cb_row + 1) * region.h / codeblocks_v;
    for cb_col in 0..codeblocks_h {
      let x0 = region.x0 + cb_col * region.w / codeblocks_h;
      let x1 = region.x0 + (cb_col + 1) * region.w / codeblocks_h;

      // With a single codeblock the zero-block shortcut flag is never
      // transmitted - the codeblock always covers the whole subband.
      let is_zero_block = if single_codeblock {
        false
      } else {
        arith.decode_bit(DiracContext::ZeroBlock)
      };
      if is_zero_block {
        continue;
      }

      for y in y0..y1 {
        for x in x0..x1 {
          let parent_nonzero = match &parent {
            Some(p) => {
              let (py, px) = region.parent_coord(p, y, x);
              coeffs[py][px] != 0
            }
            None => false,
          };
          let left = if x > region.x0 { coeffs[y][x - 1] } else { 0 };
          let up = if y > region.y0 { coeffs[y - 1][x] } else { 0 };
          let neighbourhood_nonzero = left != 0 || up != 0;

          let follow = follow_context(parent_nonzero, neighbourhood_nonzero);
          let magnitude = arith.decode_uint(follow, DiracContext::CoeffData) as i32;
          let mut value = dequantize(magnitude, qfactor, qoffset);
          if magnitude != 0 {
            let sign_ctx = sign_context(up, left);
            if arith.decode_bit(sign_ctx) {
              value = -value;
            }
          }
          coeffs[y][x] = value;
        }
      }
    }
  }

  let _ = arith.bytes_consumed();

  // Advance the caller's bit reader past the subband's byte range - it was
  // byte-aligned above, so this is an exact skip.
  for _ in 0..length * 8 {
    bits.read_bit();
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn quant_factor_increases_monotonically() {
    let mut prev = 0;
    for idx in 0..32 {
      let f = quant_factor(idx);
      assert!(f > prev);
      prev = f;
    }
  }

  #[test]
  fn zero_length_subband_leaves_coefficients_zero() {
    let mut coeffs = Array2D::<i32>::zeroed(4, 4);
    let mut bits = BitReader::new(&[0b1000_0000]); // ue_golomb() == 0
    let region = SubbandRegion { y0: 0, x0: 0, h: 4, w: 4 };
    decode_subband(&mut bits, &[], &mut coeffs, region, None, 1, 1).unwrap();
    for i in 0..4 {
      for j in 0..4 {
        assert_eq!(coeffs[i][j], 0);
      }
    }
  }
}
