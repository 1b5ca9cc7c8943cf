// VP3/Theora DC prediction reversal (C7 VP3 half, spec §4.7).
//
// Grounded on `reverse_dc_prediction` in the original decoder, including the
// exact `predictor_transform`/`mode_bin` tables and the transform==13/15
// outranging clamp.

use crate::block::{BlockStore, MacroblockMode};

const PUL: u8 = 8;
const PU: u8 = 4;
const PUR: u8 = 2;
const PL: u8 = 1;

// [up-left, up, up-right, left] multipliers, 1/128 fixed point, indexed by
// the 4-bit neighbour-availability mask above.
const PREDICTOR_TRANSFORM: [[i32; 4]; 16] = [
  [0, 0, 0, 0],
  [0, 0, 0, 128],
  [0, 0, 128, 0],
  [0, 0, 53, 75],
  [0, 128, 0, 0],
  [0, 64, 0, 64],
  [0, 128, 0, 0],
  [0, 0, 53, 75],
  [128, 0, 0, 0],
  [0, 0, 0, 128],
  [64, 0, 64, 0],
  [0, 0, 53, 75],
  [0, 128, 0, 0],
  [-104, 116, 0, 116],
  [24, 80, 24, 0],
  [-104, 116, 0, 116],
];

fn mode_bin(mode: MacroblockMode) -> usize {
  mode.dc_bin()
}

// Reverses DC prediction in place for one plane's block grid (raster
// `block_width` x `block_height`), given each block's coded state.
// `is_keyframe` mirrors `BLOCK_CODED`'s `s->keyframe ||` short-circuit: on a
// keyframe every block counts as "coded" for prediction purposes regardless
// of its actual coded flag.
pub fn reverse_dc_prediction(store: &mut BlockStore, plane: usize, block_width: usize, block_height: usize, is_keyframe: bool) {
  let mut last_dc = [0i32; 3];

  let coded_at = |store: &BlockStore, x: usize, y: usize| -> bool {
    is_keyframe || store.blocks[plane][y * block_width + x].coded().is_coded()
  };
  let dc_at = |store: &BlockStore, x: usize, y: usize| -> i32 { store.blocks[plane][y * block_width + x].dc as i32 };
  let mode_at = |store: &BlockStore, x: usize, y: usize| -> usize { mode_bin(store.blocks[plane][y * block_width + x].mb_mode()) };

  for y in 0..block_height {
    for x in 0..block_width {
      if !coded_at(store, x, y) {
        continue;
      }
      let current_bin = mode_at(store, x, y);

      let mut transform = 0u8;
      let (mut vl, mut vu, mut vul, mut vur) = (0i32, 0i32, 0i32, 0i32);

      if x > 0 {
        vl = dc_at(store, x - 1, y);
        if coded_at(store, x - 1, y) && mode_at(store, x - 1, y) == current_bin {
          transform |= PL;
        }
      }
      if y > 0 {
        vu = dc_at(store, x, y - 1);
        if coded_at(store, x, y - 1) && mode_at(store, x, y - 1) == current_bin {
          transform |= PU;
        }
        if x > 0 {
          vul = dc_at(store, x - 1, y - 1);
          if coded_at(store, x - 1, y - 1) && mode_at(store, x - 1, y - 1) == current_bin {
            transform |= PUL;
          }
        }
        if x + 1 < block_width {
          vur = dc_at(store, x + 1, y - 1);
          if coded_at(store, x + 1, y - 1) && mode_at(store, x + 1, y - 1) == current_bin {
            transform |= PUR;
          }
        }
      }

      let predicted_dc = if transform == 0 {
        last_dc[current_bin]
      } else {
        let w = PREDICTOR_TRANSFORM[transform as usize];
        let mut predicted = (w[0] * vul + w[1] * vu + w[2] * vur + w[3] * vl) / 128;
        if transform == 13 || transform == 15 {
          if (predicted - vu).abs() > 128 {
            predicted = vu;
          } else if (predicted - vl).abs() > 128 {
            predicted = vl;
          } else if (predicted - vul).abs() > 128 {
            predicted = vul;
          }
        }
        predicted
      };

      let block = &mut store.blocks[plane][y * block_width + x];
      block.dc = (block.dc as i32 + predicted_dc) as i16;
      last_dc[current_bin] = block.dc as i32;
    }
  }
}

// Binds a macroblock's decoded mode onto its four luma blocks plus the
// co-located 4:2:0 chroma block in each of the U/V planes, per DESIGN.md's
// "VP3 chroma mb_mode inheritance" decision.
pub fn set_macroblock_mode(store: &mut BlockStore, mb_i: usize, mode: MacroblockMode, chroma_block_width: usize) {
  for j in 0..4 {
    if let Some(raster) = store.all_blocks[0][4 * mb_i + j] {
      store.blocks[0][raster as usize].set_mb_mode(mode);
    }
  }
  let mb_cols = chroma_block_width;
  if mb_cols == 0 {
    return;
  }
  let mb_row = mb_i / mb_cols;
  let mb_col = mb_i % mb_cols;
  for plane in 1..3 {
    let idx = mb_row * chroma_block_width + mb_col;
    if let Some(block) = store.blocks[plane].get_mut(idx) {
      block.set_mb_mode(mode);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{CodedState, MacroblockMode};

  #[test]
  fn predicts_from_last_dc_when_no_neighbours_coded() {
    let mut store = BlockStore::new([4, 0, 0]);
    store.blocks[0][0].dc = 10;
    store.blocks[0][0].set_coded(CodedState::FullyCoded);
    reverse_dc_prediction(&mut store, 0, 2, 2, false);
    assert_eq!(store.blocks[0][0].dc, 10);
  }

  #[test]
  fn left_neighbour_with_matching_mode_bin_predicts_via_pl() {
    let mut store = BlockStore::new([4, 0, 0]);
    store.blocks[0][0].set_coded(CodedState::FullyCoded);
    store.blocks[0][0].set_mb_mode(MacroblockMode::InterNoMv);
    store.blocks[0][0].dc = 100;
    store.blocks[0][1].set_coded(CodedState::FullyCoded);
    store.blocks[0][1].set_mb_mode(MacroblockMode::InterNoMv);
    store.blocks[0][1].dc = 5; // residual
    reverse_dc_prediction(&mut store, 0, 2, 1, false);
    assert_eq!(store.blocks[0][1].dc, 105);
  }
}
