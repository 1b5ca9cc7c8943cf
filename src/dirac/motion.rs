// Dirac motion grid (spec §3 "Motion grid") and block motion data unpack
// (spec §6 "Dirac frame syntax": SB splits, prediction modes, per-ref MVs,
// per-component DC).
//
// Grounded on `dirac_unpack_block_motion_data`, `blockmode_prediction`,
// `blockglob_prediction`, `propagate_block_data`, `unpack_block_dc` and
// `dirac_unpack_motion_vector` in the original decoder.

use crate::array2d::Array2D;
use crate::dirac::arith::{aliased, ArithDecoder};
use crate::dirac::predict::{predict_majority_bit, predict_median, predict_split_level};

#[derive(Clone, Copy, Debug, Default)]
pub struct MotionBlock {
  pub use_ref1: bool,
  pub use_ref2: bool,
  pub use_global: bool,
  pub mv1: (i32, i32),
  pub mv2: (i32, i32),
  // Per-component (Y, U, V) DC residual, used only when no reference is
  // used (intra block within an inter picture).
  pub dc: [i32; 3],
}

pub struct MotionGrid {
  pub sb_width: usize,
  pub sb_height: usize,
  pub split_levels: Array2D<u8>,
  pub blocks: Vec<Vec<MotionBlock>>,
  block_rows: usize,
  block_cols: usize,
}

impl MotionGrid {
  pub fn new(sb_width: usize, sb_height: usize) -> Self {
    let block_rows = sb_height * 4;
    let block_cols = sb_width * 4;
    Self {
      sb_width,
      sb_height,
      split_levels: Array2D::<u8>::zeroed(sb_height, sb_width),
      blocks: vec![vec![MotionBlock::default(); block_cols]; block_rows],
      block_rows,
      block_cols,
    }
  }

  pub fn block_rows(&self) -> usize {
    self.block_rows
  }

  pub fn block_cols(&self) -> usize {
    self.block_cols
  }

  fn neighbour_split(&self, sb_row: usize, sb_col: usize) -> (u8, u8, u8) {
    let top_left = if sb_row > 0 && sb_col > 0 {
      self.split_levels[sb_row - 1][sb_col - 1]
    } else {
      0
    };
    let top = if sb_row > 0 { self.split_levels[sb_row - 1][sb_col] } else { 0 };
    let left = if sb_col > 0 { self.split_levels[sb_row][sb_col - 1] } else { 0 };
    (top_left, top, left)
  }

  // Phase 1 of §6's block motion data: per-superblock split levels.
  pub fn decode_splits(&mut self, arith: &mut ArithDecoder) {
    for sb_row in 0..self.sb_height {
      for sb_col in 0..self.sb_width {
        let residual = arith.decode_uint(aliased::SB_FOLLOW, aliased::SB_DATA) as u8;
        let (tl, t, l) = self.neighbour_split(sb_row, sb_col);
        self.split_levels[sb_row][sb_col] = predict_split_level(residual, tl, t, l);
      }
    }
  }

  fn block_neighbours(&self, row: usize, col: usize) -> ((bool, bool, bool), (bool, bool, bool)) {
    let get = |r: isize, c: isize, want_ref1: bool| -> bool {
      if r < 0 || c < 0 {
        return false;
      }
      let (r, c) = (r as usize, c as usize);
      if r >= self.block_rows || c >= self.block_cols {
        return false;
      }
      if want_ref1 {
        self.blocks[r][c].use_ref1
      } else {
        self.blocks[r][c].use_ref2
      }
    };
    let row = row as isize;
    let col = col as isize;
    let ref1 = (
      get(row - 1, col - 1, true),
      get(row - 1, col, true),
      get(row, col - 1, true),
    );
    let ref2 = (
      get(row - 1, col - 1, false),
      get(row - 1, col, false),
      get(row, col - 1, false),
    );
    (ref1, ref2)
  }

  // Phase 2: prediction mode (ref1/ref2 use flags) per superblock split
  // region, majority-predicted from causal neighbours at the region's
  // corner, then propagated across the rest of the region.
  pub fn decode_modes(&mut self, arith: &mut ArithDecoder, num_refs: usize) {
    for sb_row in 0..self.sb_height {
      for sb_col in 0..self.sb_width {
        let split_level = self.split_levels[sb_row][sb_col];
        let blkcnt = 1usize << split_level;
        let step = 4usize >> split_level;
        for by in 0..blkcnt {
          for bx in 0..blkcnt {
            let row = sb_row * 4 + by * step;
            let col = sb_col * 4 + bx * step;
            let (ref1_votes, ref2_votes) = self.block_neighbours(row, col);
            let decoded_ref1 = arith.decode_bit(aliased::PMODE_REF1);
            let use_ref1 = num_refs >= 1
              && predict_majority_bit(decoded_ref1, ref1_votes.0, ref1_votes.1, ref1_votes.2);
            let use_ref2 = if num_refs >= 2 {
              let decoded_ref2 = arith.decode_bit(aliased::PMODE_REF2);
              predict_majority_bit(decoded_ref2, ref2_votes.0, ref2_votes.1, ref2_votes.2)
            } else {
              false
            };
            self.blocks[row][col].use_ref1 = use_ref1;
            self.blocks[row][col].use_ref2 = use_ref2;
            for dy in 0..step {
              for dx in 0..step {
                if dy == 0 && dx == 0 {
                  continue;
                }
                self.blocks[row + dy][col + dx].use_ref1 = use_ref1;
                self.blocks[row + dy][col + dx].use_ref2 = use_ref2;
              }
            }
          }
        }
      }
    }
  }

  pub fn decode_global(&mut self, arith: &mut ArithDecoder) {
    for sb_row in 0..self.sb_height {
      for sb_col in 0..self.sb_width {
        let split_level = self.split_levels[sb_row][sb_col];
        let blkcnt = 1usize << split_level;
        let step = 4usize >> split_level;
        for by in 0..blkcnt {
          for bx in 0..blkcnt {
            let row = sb_row * 4 + by * step;
            let col = sb_col * 4 + bx * step;
            let use_global = if self.blocks[row][col].use_ref1 || self.blocks[row][col].use_ref2 {
              arith.decode_bit(aliased::GLOBAL_BLOCK)
            } else {
              false
            };
            for dy in 0..step {
              for dx in 0..step {
                self.blocks[row + dy][col + dx].use_global = use_global;
              }
            }
          }
        }
      }
    }
  }

  // Phase 3: one independent coded region per (reference, axis) pair -
  // median-predicted from causal same-reference neighbours, decoded once
  // per superblock split region and propagated across the rest of the
  // region. `axis` 0 is horizontal, 1 is vertical.
  pub fn decode_vectors(&mut self, arith: &mut ArithDecoder, which_ref: usize, axis: usize) {
    for sb_row in 0..self.sb_height {
      for sb_col in 0..self.sb_width {
        let split_level = self.split_levels[sb_row][sb_col];
        let blkcnt = 1usize << split_level;
        let step = 4usize >> split_level;
        for by in 0..blkcnt {
          for bx in 0..blkcnt {
            let row = sb_row * 4 + by * step;
            let col = sb_col * 4 + bx * step;
            let uses_this_ref = if which_ref == 0 {
              self.blocks[row][col].use_ref1
            } else {
              self.blocks[row][col].use_ref2
            };
            if uses_this_ref && !self.blocks[row][col].use_global {
              let (tl, t, l) = self.mv_neighbours(row, col, which_ref, axis);
              let pred = predict_median(tl, t, l);
              let residual = arith.decode_int(aliased::MV_FOLLOW, aliased::MV_DATA, aliased::MV_SIGN);
              let value = pred + residual;
              if which_ref == 0 {
                if axis == 0 {
                  self.blocks[row][col].mv1.0 = value;
                } else {
                  self.blocks[row][col].mv1.1 = value;
                }
              } else if axis == 0 {
                self.blocks[row][col].mv2.0 = value;
              } else {
                self.blocks[row][col].mv2.1 = value;
              }
            }
            let corner = self.blocks[row][col];
            for dy in 0..step {
              for dx in 0..step {
                if dy == 0 && dx == 0 {
                  continue;
                }
                if which_ref == 0 {
                  self.blocks[row + dy][col + dx].mv1 = corner.mv1;
                } else {
                  self.blocks[row + dy][col + dx].mv2 = corner.mv2;
                }
              }
            }
          }
        }
      }
    }
  }

  fn mv_neighbours(&self, row: usize, col: usize, which_ref: usize, axis: usize) -> (i32, i32, i32) {
    let get = |r: isize, c: isize| -> i32 {
      if r < 0 || c < 0 {
        return 0;
      }
      let (r, c) = (r as usize, c as usize);
      if r >= self.block_rows || c >= self.block_cols {
        return 0;
      }
      let b = &self.blocks[r][c];
      let mv = if which_ref == 0 { b.mv1 } else { b.mv2 };
      if axis == 0 {
        mv.0
      } else {
        mv.1
      }
    };
    let row = row as isize;
    let col = col as isize;
    (get(row - 1, col - 1), get(row - 1, col), get(row, col - 1))
  }

  // Phase 4: per-component DC residual for blocks that use no reference
  // (intra blocks inside an inter picture), decoded once per superblock
  // split region and propagated across the rest of the region.
  pub fn decode_dc(&mut self, arith: &mut ArithDecoder, component: usize) {
    for sb_row in 0..self.sb_height {
      for sb_col in 0..self.sb_width {
        let split_level = self.split_levels[sb_row][sb_col];
        let blkcnt = 1usize << split_level;
        let step = 4usize >> split_level;
        for by in 0..blkcnt {
          for bx in 0..blkcnt {
            let row = sb_row * 4 + by * step;
            let col = sb_col * 4 + bx * step;
            if !self.blocks[row][col].use_ref1 && !self.blocks[row][col].use_ref2 {
              let tl = self.dc_neighbour(row as isize - 1, col as isize - 1, component);
              let t = self.dc_neighbour(row as isize - 1, col as isize, component);
              let l = self.dc_neighbour(row as isize, col as isize - 1, component);
              let pred = predict_median(tl, t, l);
              let residual = arith.decode_int(aliased::DC_FOLLOW, aliased::DC_DATA, aliased::DC_SIGN);
              self.blocks[row][col].dc[component] = pred + residual;
            }
            let value = self.blocks[row][col].dc[component];
            for dy in 0..step {
              for dx in 0..step {
                if dy == 0 && dx == 0 {
                  continue;
                }
                self.blocks[row + dy][col + dx].dc[component] = value;
              }
            }
          }
        }
      }
    }
  }

  fn dc_neighbour(&self, r: isize, c: isize, component: usize) -> i32 {
    if r < 0 || c < 0 {
      return 0;
    }
    let (r, c) = (r as usize, c as usize);
    if r >= self.block_rows || c >= self.block_cols {
      return 0;
    }
    self.blocks[r][c].dc[component]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn new_grid_has_expected_dimensions() {
    let grid = MotionGrid::new(3, 2);
    assert_eq!(grid.block_rows(), 8);
    assert_eq!(grid.block_cols(), 12);
  }
}
