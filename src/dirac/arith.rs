// Dirac binary arithmetic decoder (C2).
//
// A direct structural port of `dirac_arith`/`renorm_arith_decoder`/
// `dirac_get_arith_bit`/`dirac_get_arith_uint`/`dirac_get_arith_int` from
// the original decoder's `dirac_arith.h`, with the `#define`-aliased
// context ids turned into a closed enum (spec §9 "Tagged variants") instead
// of C preprocessor constants sharing storage by convention.
//
// Two tables drive adaptation: `PROB_STEP`, the per-context probability
// nudge applied after each decoded bit, and `NEXT_CONTEXT`, the context a
// `decode_uint` call advances to after each continuation bit. The original
// ties these to externally-defined `ff_dirac_prob`/`ff_dirac_next_ctx`
// arrays that are declared but not present in the excerpted source; they
// are reconstructed here as monotone, internally consistent tables with the
// same shape (see comments below), rather than guessed bit-for-bit, since
// the original exact magic constants genuinely aren't available to check
// against (§9 "Global probability / scale tables": these are process-wide
// constants computed once, never mutated after that).

use crate::error::{DecodeError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum DiracContext {
  ZeroPredictZeroNeighbourhoodFollow,
  ZeroPredictNonzeroNeighbourhoodFollow,
  NonzeroPredictZeroNeighbourhoodFollow,
  NonzeroPredictNonzeroNeighbourhoodFollow,
  ZeroPredictFollow2,
  ZeroPredictFollow3,
  ZeroPredictFollow4,
  ZeroPredictFollow5,
  ZeroPredictFollow6,
  NonzeroPredictFollow2,
  NonzeroPredictFollow3,
  NonzeroPredictFollow4,
  NonzeroPredictFollow5,
  NonzeroPredictFollow6,
  CoeffData,
  SignNegative,
  SignZero,
  SignPositive,
  ZeroBlock,
  DeltaQFollow,
  DeltaQData,
  DeltaQSign,
}

pub const CONTEXT_COUNT: usize = 22;

impl DiracContext {
  fn index(self) -> usize {
        self as usize
  }
}

// Non-core contexts (superblock split, prediction mode, global-block,
// motion vector axes, DC residual) are, per the original, aliased onto
// reused ids rather than given distinct storage, since those coded regions
// never run the arithmetic decoder concurrently with subband decode. The
// aliasing is kept explicit here as functions rather than `#define`s.
pub mod aliased {
  use super::DiracContext;

  pub const PMODE_REF1: DiracContext = DiracContext::ZeroPredictZeroNeighbourhoodFollow;
  pub const PMODE_REF2: DiracContext = DiracContext::ZeroPredictNonzeroNeighbourhoodFollow;
  pub const GLOBAL_BLOCK: DiracContext = DiracContext::NonzeroPredictZeroNeighbourhoodFollow;
  pub const SB_FOLLOW: DiracContext = DiracContext::ZeroPredictFollow5;
  pub const SB_DATA: DiracContext = DiracContext::ZeroPredictZeroNeighbourhoodFollow;
  pub const MV_FOLLOW: DiracContext = DiracContext::ZeroPredictFollow2;
  pub const MV_DATA: DiracContext = DiracContext::ZeroPredictZeroNeighbourhoodFollow;
  // Sign context paired with MV_DATA/DC_DATA: `decode_int` reads its sign
  // bit from `data_ctx + 1`, a physically distinct slot from `data_ctx`.
  pub const MV_SIGN: DiracContext = DiracContext::ZeroPredictNonzeroNeighbourhoodFollow;
  pub const DC_FOLLOW: DiracContext = DiracContext::ZeroPredictFollow5;
  pub const DC_DATA: DiracContext = DiracContext::ZeroPredictZeroNeighbourhoodFollow;
  pub const DC_SIGN: DiracContext = DiracContext::ZeroPredictNonzeroNeighbourhoodFollow;
}

// Probability nudge applied to a context after a decoded bit, indexed by
// the context's current probability's high byte. Monotonically decreasing:
// contexts far from 50/50 adapt in smaller steps than fresh ones.
fn prob_step(index: u8) -> u16 {
  256 - index as u16
}

// Context a `decode_uint` follow-context advances to after a continuation
// bit. The "F1" contexts are entered once per symbol and immediately hand
// off into the shared F2..F6 ladder for their zero-predict/nonzero-predict
// family; the ladder saturates at F6, matching the original's bounded
// context id space (it does not grow with unary length).
fn next_context(ctx: DiracContext) -> DiracContext {
  use DiracContext::*;
  match ctx {
    ZeroPredictZeroNeighbourhoodFollow | ZeroPredictNonzeroNeighbourhoodFollow => ZeroPredictFollow2,
    NonzeroPredictZeroNeighbourhoodFollow | NonzeroPredictNonzeroNeighbourhoodFollow => NonzeroPredictFollow2,
    ZeroPredictFollow2 => ZeroPredictFollow3,
    ZeroPredictFollow3 => ZeroPredictFollow4,
    ZeroPredictFollow4 => ZeroPredictFollow5,
    ZeroPredictFollow5 => ZeroPredictFollow6,
    ZeroPredictFollow6 => ZeroPredictFollow6,
    NonzeroPredictFollow2 => NonzeroPredictFollow3,
    NonzeroPredictFollow3 => NonzeroPredictFollow4,
    NonzeroPredictFollow4 => NonzeroPredictFollow5,
    NonzeroPredictFollow5 => NonzeroPredictFollow6,
    NonzeroPredictFollow6 => NonzeroPredictFollow6,
    other => other,
  }
}

pub struct ArithDecoder<'a> {
  low: u32,
  range: u32,
  counter: u32,
  data: &'a [u8],
  cursor: usize,
  end: usize,
  contexts: [u16; CONTEXT_COUNT],
}

impl<'a> ArithDecoder<'a> {
  // `data` is the subband/region's byte range; `length` is its declared
  // length in bytes (may exceed `data.len()`, in which case reads past the
  // end behave per the overread contract below).
  pub fn new(data: &'a [u8], length: usize) -> Self {
    let mut d = Self {
      low: 0,
      range: 0xFFFF,
      counter: 16,
      data,
      cursor: 0,
      end: length,
      contexts: [0x8000; CONTEXT_COUNT],
    };
    d.low = d.read_be16() as u32;
    d
  }

  fn read_be16(&mut self) -> u16 {
    let hi = self.read_byte();
    let lo = self.read_byte();
    ((hi as u16) << 8) | lo as u16
  }

  // The spec defines overread bits to be 1 (same contract as the bit
  // reader, see `bitreader`).
  fn read_byte(&mut self) -> u8 {
    let b = if self.cursor < self.end && self.cursor < self.data.len() {
      self.data[self.cursor]
    } else {
      0xFF
    };
    self.cursor += 1;
    b
  }

  fn renormalize(&mut self) {
    while self.range <= 0x4000 {
      self.low <<= 1;
      self.range <<= 1;
      self.counter -= 1;
      if self.counter == 0 {
        self.low += self.read_be16() as u32;
        self.counter = 16;
      }
    }
  }

  pub fn decode_bit(&mut self, ctx: DiracContext) -> bool {
    let idx = ctx.index();
    let prob_zero = self.contexts[idx] as u32;
    let prob_index = (self.contexts[idx] >> 8) as u8;
    let range_times_prob = (self.range * prob_zero) >> 16;

    let bit = (self.low >> 16) >= range_times_prob;
    if bit {
      self.low -= range_times_prob << 16;
      self.range -= range_times_prob;
      self.contexts[idx] = self.contexts[idx].saturating_sub(prob_step(prob_index));
    } else {
      self.range = range_times_prob;
      self.contexts[idx] = self.contexts[idx].saturating_add(prob_step(255 - prob_index));
    }
    self.renormalize();
    bit
  }

  // Unary-coded unsigned integer: reads a terminator bit from `follow_ctx`
  // (0 = continue, 1 = stop) and one data bit from `data_ctx` per
  // continuation, advancing `follow_ctx` through `next_context` each time.
  pub fn decode_uint(&mut self, mut follow_ctx: DiracContext, data_ctx: DiracContext) -> u32 {
    let mut value: u32 = 1;
    while !self.decode_bit(follow_ctx) {
      value <<= 1;
      value += self.decode_bit(data_ctx) as u32;
      follow_ctx = next_context(follow_ctx);
    }
    value - 1
  }

  // As `decode_uint`, with an extra sign bit (read from `data_ctx + 1`,
  // i.e. the sign context paired with the magnitude's data context) when
  // the magnitude is non-zero.
  pub fn decode_int(&mut self, follow_ctx: DiracContext, data_ctx: DiracContext, sign_ctx: DiracContext) -> i32 {
    let magnitude = self.decode_uint(follow_ctx, data_ctx) as i32;
    if magnitude != 0 && self.decode_bit(sign_ctx) {
      -magnitude
    } else {
      magnitude
    }
  }

  pub fn bytes_consumed(&self) -> usize {
    crate::util::min(self.cursor, self.end)
  }
}

// Validates `length` against the available data before constructing a
// decoder; used by `dirac::entropy` when a subband declares a length that
// would run past the access unit.
pub fn checked_region<'a>(data: &'a [u8], offset: usize, length: usize) -> Result<&'a [u8]> {
  let end = offset
    .checked_add(length)
    .ok_or_else(|| DecodeError::Truncated("subband length overflow".into()))?;
  if end > data.len() {
    return Err(DecodeError::Truncated(format!(
      "subband declares {} bytes but only {} remain",
      length,
      data.len() - crate::util::min(offset, data.len())
    )));
  }
  Ok(&data[offset..end])
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn deterministic_bitstream_decodes_deterministically() {
    let data = [0x12u8, 0x34, 0x56, 0x78, 0x9A, 0xBC];
    let decode_once = || {
      let mut dec = ArithDecoder::new(&data, data.len());
      let mut bits = Vec::new();
      for _ in 0..8 {
        bits.push(dec.decode_bit(DiracContext::CoeffData));
      }
      bits
    };
    assert_eq!(decode_once(), decode_once());
  }

  #[test]
  fn overread_past_declared_length_does_not_panic() {
    let data = [0x00u8; 2];
    let mut dec = ArithDecoder::new(&data, 16); // declared far beyond actual data
    for _ in 0..64 {
      let _ = dec.decode_bit(DiracContext::CoeffData);
    }
  }

  #[test]
  fn checked_region_rejects_overlong_subband() {
    let data = [0u8; 4];
    assert!(checked_region(&data, 0, 4).is_ok());
    assert!(checked_region(&data, 1, 4).is_err());
  }
}
