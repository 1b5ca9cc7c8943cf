// Coefficient/Block store (C4): per-plane raster grids of 8x8 blocks,
// coded-order lists and the packed DCT token stream.
//
// Grounded on `vp3_block` and the `coded_blocks`/`all_blocks`/`dct_tokens`
// fields of `Vp3DecodeContext` in the original VP3/Theora decoder. That
// source aliases `coded_blocks[plane+1]` onto `coded_blocks[plane] + n` via
// raw pointer arithmetic; `CodedBlockLists` below keeps the same contiguous
// layout but as one owned buffer with disjoint per-plane slices, per the
// "Ownership of contiguous per-plane arrays" design note.

use bytemuck::Zeroable;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodedState {
  NotCoded,
  PartiallyCoded,
  FullyCoded,
}

impl CodedState {
  pub fn is_coded(self) -> bool {
    !matches!(self, CodedState::NotCoded)
  }
}

// A VP3/Theora macroblock coding mode (spec §9 "Tagged variants": replaces
// the original's MODE_* preprocessor constants with a closed sum type).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MacroblockMode {
  InterNoMv,
  Intra,
  InterPlusMv,
  InterLastMv,
  InterPriorLastMv,
  UsingGolden,
  InterGoldenMv,
  InterFourMv,
}

impl MacroblockMode {
  pub const ALL: [MacroblockMode; 8] = [
    MacroblockMode::InterNoMv,
    MacroblockMode::Intra,
    MacroblockMode::InterPlusMv,
    MacroblockMode::InterLastMv,
    MacroblockMode::InterPriorLastMv,
    MacroblockMode::UsingGolden,
    MacroblockMode::InterGoldenMv,
    MacroblockMode::InterFourMv,
  ];

  pub fn from_code(code: u8) -> Self {
    Self::ALL[(code & 7) as usize]
  }

  pub fn code(self) -> u8 {
    Self::ALL.iter().position(|m| *m == self).unwrap() as u8
  }

  // Which DC-prediction bin (§4.7) this mode belongs to: intra / inter /
  // golden. Grounded on `mode_bin` in the original source.
  pub fn dc_bin(self) -> usize {
    match self {
      MacroblockMode::Intra => 0,
      MacroblockMode::UsingGolden | MacroblockMode::InterGoldenMv => 2,
      _ => 1,
    }
  }
}

// One 8x8 transform block's persistent state (spec §3 "Block (VP3)").
#[derive(Clone, Copy, Debug, Zeroable)]
pub struct Block {
  pub dc: i16,
  mb_mode: u8,
  pub qpi: u8,
  coded: u8,
}

impl Block {
  pub fn mb_mode(&self) -> MacroblockMode {
    MacroblockMode::from_code(self.mb_mode)
  }

  pub fn set_mb_mode(&mut self, mode: MacroblockMode) {
    self.mb_mode = mode.code();
  }

  pub fn coded(&self) -> CodedState {
    match self.coded {
      0 => CodedState::NotCoded,
      1 => CodedState::PartiallyCoded,
      _ => CodedState::FullyCoded,
    }
  }

  pub fn set_coded(&mut self, state: CodedState) {
    self.coded = match state {
      CodedState::NotCoded => 0,
      CodedState::PartiallyCoded => 1,
      CodedState::FullyCoded => 2,
    };
  }
}

// Per-plane, in-coding-order lists of raster indices of blocks that carry
// coefficients, backed by one contiguous buffer (spec §9).
#[derive(Clone, Debug, Default)]
pub struct CodedBlockLists {
  indices: Vec<u32>,
  // plane_start[p] .. plane_start[p+1] is plane p's slice of `indices`.
  plane_start: [usize; 4],
}

impl CodedBlockLists {
  pub fn new() -> Self {
    Self {
      indices: Vec::new(),
      plane_start: [0; 4],
    }
  }

  pub fn reset(&mut self) {
    self.indices.clear();
    self.plane_start = [0; 4];
  }

  pub fn push(&mut self, raster_index: u32) {
    self.indices.push(raster_index);
  }

  // Call once all of `plane`'s coded blocks have been pushed, advancing the
  // split point so plane `plane + 1` starts where `plane` ends.
  pub fn finish_plane(&mut self, plane: usize) {
    self.plane_start[plane + 1] = self.indices.len();
  }

  pub fn plane(&self, plane: usize) -> &[u32] {
    &self.indices[self.plane_start[plane]..self.plane_start[plane + 1]]
  }

  pub fn plane_len(&self, plane: usize) -> usize {
    self.plane_start[plane + 1] - self.plane_start[plane]
  }

  pub fn total_coded_blocks(&self) -> usize {
    self.indices.len()
  }

  // The full cross-plane sequence, in plane order - mirrors the original's
  // `coded_blocks[0]` base pointer spanning all three planes contiguously.
  pub fn flat(&self) -> &[u32] {
    &self.indices
  }

  pub fn plane_for_flat_index(&self, idx: usize) -> usize {
    for plane in 0..3 {
      if idx < self.plane_start[plane + 1] {
        return plane;
      }
    }
    2
  }
}

// One packed DCT token (spec §3 "Token stream (VP3)"). Kept as a 16-bit
// packed representation rather than an enum-per-element Vec, per the
// "Token packing" design note - the reordering step in the dequantizer
// reads these many times per stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DctToken {
  EobRun(u32),
  ZeroRunThenCoeff { zero_run: u32, coeff: i32 },
  Coeff(i32),
}

pub fn pack_token(token: DctToken) -> u16 {
  match token {
    DctToken::EobRun(run) => {
      let run = run.min(0x3FFF) as u16;
      run << 2
    }
    DctToken::ZeroRunThenCoeff { zero_run, coeff } => {
      let zero_run = (zero_run & 0x3F) as u16;
      let coeff = (coeff as i16 as u16) & 0x7F;
      (coeff << 9) | (zero_run << 2) | 1
    }
    DctToken::Coeff(coeff) => {
      let coeff = (coeff as i16 as u16) & 0x3FFF;
      (coeff << 2) | 2
    }
  }
}

pub fn unpack_token(raw: u16) -> DctToken {
  match raw & 3 {
    0 => DctToken::EobRun((raw >> 2) as u32),
    1 => {
      let zero_run = ((raw >> 2) & 0x3F) as u32;
      let coeff = sign_extend(raw >> 9, 7);
      DctToken::ZeroRunThenCoeff { zero_run, coeff }
    }
    _ => {
      let coeff = sign_extend(raw >> 2, 14);
      DctToken::Coeff(coeff)
    }
  }
}

fn sign_extend(value: u16, bits: u32) -> i32 {
  let shift = 16 - bits;
  ((value << shift) as i16 >> shift) as i32
}

// Flat per-plane, per-coefficient-level token lists (spec §3). Index 0 is
// unused: DC tokens are resolved directly into `Block::dc` during phase 6
// (matching the original, which special-cases zzi == 0 the same way).
#[derive(Clone, Debug)]
pub struct TokenStream {
  tokens: [Vec<Vec<u16>>; 3],
}

impl TokenStream {
  pub fn new() -> Self {
    Self {
      tokens: [vec![Vec::new(); 64], vec![Vec::new(); 64], vec![Vec::new(); 64]],
    }
  }

  pub fn clear(&mut self) {
    for plane in &mut self.tokens {
      for level in plane.iter_mut() {
        level.clear();
      }
    }
  }

  pub fn push(&mut self, plane: usize, zzi: usize, token: DctToken) {
    self.tokens[plane][zzi].push(pack_token(token));
  }

  pub fn level(&self, plane: usize, zzi: usize) -> &[u16] {
    &self.tokens[plane][zzi]
  }
}

impl Default for TokenStream {
  fn default() -> Self {
    Self::new()
  }
}

// The full per-plane raster block grid, coded-order lists and token stream
// for one frame (C4).
pub struct BlockStore {
  pub blocks: [Vec<Block>; 3],
  // hilbert traversal index -> raster index, or None outside the real grid.
  pub all_blocks: [Vec<Option<u32>>; 3],
  pub coded_blocks: CodedBlockLists,
  pub tokens: TokenStream,
}

impl BlockStore {
  pub fn new(block_counts: [usize; 3]) -> Self {
    Self {
      blocks: [
        vec![Block::zeroed(); block_counts[0]],
        vec![Block::zeroed(); block_counts[1]],
        vec![Block::zeroed(); block_counts[2]],
      ],
      all_blocks: [Vec::new(), Vec::new(), Vec::new()],
      coded_blocks: CodedBlockLists::new(),
      tokens: TokenStream::new(),
    }
  }

  pub fn reset_for_keyframe(&mut self) {
    for plane in &mut self.blocks {
      for b in plane.iter_mut() {
        *b = Block::zeroed();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_round_trips_through_packing() {
    for raw in [
      DctToken::EobRun(12),
      DctToken::ZeroRunThenCoeff { zero_run: 5, coeff: -3 },
      DctToken::Coeff(-1000),
      DctToken::Coeff(1000),
    ] {
      let packed = pack_token(raw);
      assert_eq!(unpack_token(packed), raw);
    }
  }

  #[test]
  fn coded_block_lists_keep_contiguous_planes() {
    let mut lists = CodedBlockLists::new();
    lists.push(0);
    lists.push(2);
    lists.finish_plane(0);
    lists.push(1);
    lists.finish_plane(1);
    lists.finish_plane(2);
    assert_eq!(lists.plane(0), &[0, 2]);
    assert_eq!(lists.plane(1), &[1]);
    assert_eq!(lists.plane(2), &[] as &[u32]);
    assert_eq!(lists.total_coded_blocks(), 3);
  }

  #[test]
  fn mode_bin_matches_original_mode_bin_table() {
    assert_eq!(MacroblockMode::InterNoMv.dc_bin(), 1);
    assert_eq!(MacroblockMode::Intra.dc_bin(), 0);
    assert_eq!(MacroblockMode::InterPlusMv.dc_bin(), 1);
    assert_eq!(MacroblockMode::InterLastMv.dc_bin(), 1);
    assert_eq!(MacroblockMode::InterPriorLastMv.dc_bin(), 1);
    assert_eq!(MacroblockMode::UsingGolden.dc_bin(), 2);
    assert_eq!(MacroblockMode::InterGoldenMv.dc_bin(), 2);
    assert_eq!(MacroblockMode::InterFourMv.dc_bin(), 1);
  }
}
