// VP3/Theora reconstruction scheduler and loop filter (C9 VP3 half).
//
// Grounded on `render_slice`/`init_hilbert_walk`/`apply_loop_filter` in the
// original decoder: per-superblock-row luma traversal through 4 fixed-order
// macroblocks (`mb_offset`) each split into 4 Hilbert sub-blocks, and a
// once-per-two-luma-rows chroma pass over 16 Hilbert positions directly. The
// motion vector "last"/"prior last" memory that `InterLastMv`/
// `InterPriorLastMv` reuse is applied during this same pass, since that
// bookkeeping is driven by render order rather than bitstream order; the
// original's own implementation of that step lives in a function not present
// in the retrieved source, so the swap/reuse rule below is a principled
// reconstruction of VP3's documented "last motion vector dominates" schemes
// (see `ModeAlphabet`'s scheme comments) rather than a ported algorithm.

use crate::array2d::Array2D;
use crate::block::{BlockStore, MacroblockMode};
use crate::frame::Frame;
use crate::transform::{apply_residual, put_residual, InverseDct8, MotionCompensator};
use crate::vp3::dequant::{dequant_block, qmat_index_is_inter, DequantCursors, QuantMatrices};
use crate::vp3::hilbert::HILBERT_OFFSET;

const MB_OFFSET: [(usize, usize); 4] = [(0, 0), (0, 1), (1, 1), (1, 0)];

enum Reference {
  Last,
  Golden,
}

fn reference_for(mode: MacroblockMode) -> Option<Reference> {
  match mode {
    MacroblockMode::Intra => None,
    MacroblockMode::UsingGolden | MacroblockMode::InterGoldenMv => Some(Reference::Golden),
    _ => Some(Reference::Last),
  }
}

struct MvMemory {
  last: (i32, i32),
  prior: (i32, i32),
}

impl MvMemory {
  fn new() -> Self {
    Self { last: (0, 0), prior: (0, 0) }
  }

  fn resolve(&mut self, mode: MacroblockMode, explicit: Option<(i32, i32)>) -> (i32, i32) {
    match mode {
      MacroblockMode::InterPlusMv | MacroblockMode::InterGoldenMv | MacroblockMode::InterFourMv => {
        let mv = explicit.unwrap_or((0, 0));
        self.prior = self.last;
        self.last = mv;
        mv
      }
      MacroblockMode::InterLastMv => self.last,
      MacroblockMode::InterPriorLastMv => {
        std::mem::swap(&mut self.last, &mut self.prior);
        self.last
      }
      _ => (0, 0),
    }
  }
}

// Renders every coded block in `store` into `dst`, motion-compensating
// inter blocks from `last_ref`/`golden_ref` (ignored for keyframes, where
// every block is intra). `modes` is one entry per macroblock in the same
// Hilbert macroblock order `vp3::entropy::unpack_modes` produced; `mvs` is
// the flat per-macroblock motion vector list from `unpack_vectors`.
#[allow(clippy::too_many_arguments)]
pub fn render_frame(
  store: &BlockStore,
  qmat: &QuantMatrices,
  idct: &dyn InverseDct8,
  mc: &dyn MotionCompensator,
  modes: &[MacroblockMode],
  mvs: &[(i32, i32)],
  dst: &mut Frame,
  last_ref: Option<&Frame>,
  golden_ref: Option<&Frame>,
) {
  let mut cursors = [DequantCursors::new(), DequantCursors::new(), DequantCursors::new()];
  let mut mv_memory = MvMemory::new();
  let mut mv_cursor = 0usize;

  let y_block_width = dst.y().block_width();
  let y_block_height = dst.y().block_height();
  let sb_width = dst.y().superblock_width();
  let sb_height = dst.y().superblock_height();

  let mut block_i = 0usize;
  for sb_y in 0..sb_height {
    for sb_x in 0..sb_width {
      for (mb_i, &(mb_ox, mb_oy)) in MB_OFFSET.iter().enumerate() {
        if 4 * sb_x + 2 * mb_ox >= y_block_width || 4 * sb_y + 2 * mb_oy >= y_block_height {
          continue;
        }
        let mb_row = 2 * sb_y + mb_oy;
        let mb_col = 2 * sb_x + mb_ox;
        let macroblocks_per_row = y_block_width / 2;
        let flat_mb = mb_row * macroblocks_per_row + mb_col;
        let mode = modes.get(flat_mb).copied().unwrap_or(MacroblockMode::InterNoMv);

        let explicit_mv = match mode {
          MacroblockMode::InterPlusMv | MacroblockMode::InterGoldenMv => {
            let mv = mvs.get(mv_cursor).copied();
            mv_cursor += 1;
            mv
          }
          _ => None,
        };
        let mv = if mode == MacroblockMode::InterFourMv {
          (0, 0) // resolved per sub-block below
        } else {
          mv_memory.resolve(mode, explicit_mv)
        };

        for i in 0..4 {
          let (ox, oy) = HILBERT_OFFSET[4 * mb_i + i];
          let block_x = 4 * sb_x + ox;
          let block_y = 4 * sb_y + oy;
          if block_x >= y_block_width || block_y >= y_block_height {
            continue;
          }
          let block_mv = if mode == MacroblockMode::InterFourMv {
            let mv = mvs.get(mv_cursor).copied().unwrap_or((0, 0));
            mv_cursor += 1;
            mv
          } else {
            mv
          };
          render_one_block(store, &mut cursors[0], qmat, idct, mc, 0, block_i, block_x, block_y, mode, block_mv, dst, last_ref, golden_ref);
          block_i += 1;
        }
      }
    }
  }

  for plane in 1..3 {
    let block_width = dst.plane(plane).block_width();
    let block_height = dst.plane(plane).block_height();
    let sb_width = dst.plane(plane).superblock_width();
    let sb_height = dst.plane(plane).superblock_height();
    let mut block_i = 0usize;
    for sb_y in 0..sb_height {
      for sb_x in 0..sb_width {
        for hilbert_i in 0..16 {
          let (ox, oy) = HILBERT_OFFSET[hilbert_i];
          let block_x = 4 * sb_x + ox;
          let block_y = 4 * sb_y + oy;
          if block_x >= block_width || block_y >= block_height {
            continue;
          }
          let mb_row = (2 * sb_y + oy / 2).min(block_height.saturating_sub(1));
          let mb_col = (2 * sb_x + ox / 2).min(block_width.saturating_sub(1));
          let mode = modes.get(mb_row * block_width.max(1) + mb_col).copied().unwrap_or(MacroblockMode::InterNoMv);
          let mv = if mode == MacroblockMode::Intra { (0, 0) } else { mv_memory.last };
          render_one_block(store, &mut cursors[plane], qmat, idct, mc, plane, block_i, block_x, block_y, mode, mv, dst, last_ref, golden_ref);
          block_i += 1;
        }
      }
    }
  }
}

#[allow(clippy::too_many_arguments)]
fn render_one_block(
  store: &BlockStore,
  cursors: &mut DequantCursors,
  qmat: &QuantMatrices,
  idct: &dyn InverseDct8,
  mc: &dyn MotionCompensator,
  plane: usize,
  coded_index_hint: usize,
  block_x: usize,
  block_y: usize,
  mode: MacroblockMode,
  mv: (i32, i32),
  dst: &mut Frame,
  last_ref: Option<&Frame>,
  golden_ref: Option<&Frame>,
) {
  let block_width = dst.plane(plane).block_width();
  let raster = (block_y * block_width + block_x) as u32;
  let block = &store.blocks[plane][raster as usize];
  if !block.coded().is_coded() && mode != MacroblockMode::Intra {
    // Uncoded inter block: pure motion-compensated copy, no residual.
    copy_prediction(mc, plane, block_x, block_y, mv, dst, last_ref, golden_ref, reference_for(mode));
    return;
  }

  let coded_index = store.coded_blocks.plane(plane).iter().position(|&r| r == raster).unwrap_or(coded_index_hint.min(store.coded_blocks.plane_len(plane).saturating_sub(1)));
  let inter = qmat_index_is_inter(mode);
  let qm = qmat.get(plane, inter, block.qpi as usize);

  let mut coeffs = [0i32; 64];
  dequant_block(store, cursors, qm, plane, coded_index, &mut coeffs);

  let mut residual = Array2D::<i32>::zeroed(8, 8);
  for (i, &v) in coeffs.iter().enumerate() {
    residual[i / 8][i % 8] = v;
  }
  idct.inverse(&mut residual);

  let y0 = block_y * 8;
  let x0 = block_x * 8;

  if mode == MacroblockMode::Intra {
    put_residual(&mut dst.plane_mut(plane).pixels, &residual, y0, x0, 8, 8);
  } else {
    copy_prediction(mc, plane, block_x, block_y, mv, dst, last_ref, golden_ref, reference_for(mode));
    apply_residual(&mut dst.plane_mut(plane).pixels, &residual, y0, x0, 8, 8);
  }
}

fn copy_prediction(mc: &dyn MotionCompensator, plane: usize, block_x: usize, block_y: usize, mv: (i32, i32), dst: &mut Frame, last_ref: Option<&Frame>, golden_ref: Option<&Frame>, reference: Option<Reference>) {
  let reference_frame = match reference {
    Some(Reference::Last) => last_ref,
    Some(Reference::Golden) => golden_ref,
    None => None,
  };
  let Some(reference_frame) = reference_frame else {
    return;
  };
  let y0 = block_y * 8;
  let x0 = block_x * 8;
  mc.predict(&reference_frame.plane(plane).pixels, mv.0, mv.1, &mut dst.plane_mut(plane).pixels, x0, y0, 8, 8);
}

// Applies the in-loop deblocking filter to every coded block's left/top edge
// unconditionally, and right/bottom edge only when the neighbour on that
// side is not itself coded this frame (it will filter that shared edge
// later when it is visited). Grounded on `apply_loop_filter`'s
// coded-neighbour rule; the filter itself is the opaque contract in
// `src/transform.rs` is not used here since loop filtering operates on
// reconstructed pixels directly rather than transform coefficients - this
// reimplements the original's simple clipped-difference ramp directly.
pub fn apply_loop_filter(store: &BlockStore, dst: &mut Frame, limit: u8) {
  for plane in 0..3 {
    let block_width = dst.plane(plane).block_width();
    let block_height = dst.plane(plane).block_height();
    for by in 0..block_height {
      for bx in 0..block_width {
        let raster = by * block_width + bx;
        let block = &store.blocks[plane][raster];
        if !block.coded().is_coded() {
          continue;
        }
        let coded_at = |x: isize, y: isize| -> bool {
          if x < 0 || y < 0 || x as usize >= block_width || y as usize >= block_height {
            return false;
          }
          store.blocks[plane][y as usize * block_width + x as usize].coded().is_coded()
        };

        let x0 = bx * 8;
        let y0 = by * 8;
        if bx > 0 {
          filter_vertical_edge(dst.plane_mut(plane), x0, y0, limit);
        }
        if by > 0 {
          filter_horizontal_edge(dst.plane_mut(plane), x0, y0, limit);
        }
        if !coded_at(bx as isize + 1, by as isize) && bx + 1 < block_width {
          filter_vertical_edge(dst.plane_mut(plane), x0 + 8, y0, limit);
        }
        if !coded_at(bx as isize, by as isize + 1) && by + 1 < block_height {
          filter_horizontal_edge(dst.plane_mut(plane), x0, y0 + 8, limit);
        }
      }
    }
  }
}

fn clip_diff(v: i32, limit: i32) -> i32 {
  v.clamp(-limit, limit)
}

fn filter_vertical_edge(plane: &mut crate::frame::Plane, x0: usize, y0: usize, limit: u8) {
  if x0 == 0 {
    return;
  }
  for row in 0..8.min(plane.padded_height - y0) {
    let y = y0 + row;
    let a = plane.pixels[y][x0 - 1] as i32;
    let b = plane.pixels[y][x0] as i32;
    let diff = clip_diff((b - a) / 2, limit as i32);
    plane.pixels[y][x0 - 1] = (a + diff).clamp(0, 255) as u8;
    plane.pixels[y][x0] = (b - diff).clamp(0, 255) as u8;
  }
}

fn filter_horizontal_edge(plane: &mut crate::frame::Plane, x0: usize, y0: usize, limit: u8) {
  if y0 == 0 {
    return;
  }
  for col in 0..8.min(plane.padded_width - x0) {
    let x = x0 + col;
    let a = plane.pixels[y0 - 1][x] as i32;
    let b = plane.pixels[y0][x] as i32;
    let diff = clip_diff((b - a) / 2, limit as i32);
    plane.pixels[y0 - 1][x] = (a + diff).clamp(0, 255) as u8;
    plane.pixels[y0][x] = (b - diff).clamp(0, 255) as u8;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mv_memory_prior_last_swaps_the_two_slots() {
    let mut mem = MvMemory::new();
    assert_eq!(mem.resolve(MacroblockMode::InterPlusMv, Some((3, -2))), (3, -2));
    assert_eq!(mem.resolve(MacroblockMode::InterPlusMv, Some((5, 1))), (5, 1));
    // prior is now (3,-2), last is (5,1); PriorLastMv swaps them.
    assert_eq!(mem.resolve(MacroblockMode::InterPriorLastMv, None), (3, -2));
  }

  #[test]
  fn reference_for_picks_golden_only_for_golden_modes() {
    assert!(matches!(reference_for(MacroblockMode::UsingGolden), Some(Reference::Golden)));
    assert!(matches!(reference_for(MacroblockMode::InterLastMv), Some(Reference::Last)));
    assert!(reference_for(MacroblockMode::Intra).is_none());
  }
}
