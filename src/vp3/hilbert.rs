// Hilbert-order block traversal shared between block-store initialisation
// and the VP3 reconstruction scheduler (C9).
//
// `HILBERT_OFFSET` is the exact 16-entry table from the original decoder's
// `hilbert_offset`; every 4 consecutive entries are one macroblock's four
// luma blocks (verified against `render_slice`'s `8*hilbert_offset[4*mb_i+i]`
// indexing and `init_block_mapping`'s `all_blocks` construction).

pub const HILBERT_OFFSET: [(usize, usize); 16] = [
  (0, 0),
  (1, 0),
  (1, 1),
  (0, 1),
  (0, 2),
  (0, 3),
  (1, 3),
  (1, 2),
  (2, 2),
  (2, 3),
  (3, 3),
  (3, 2),
  (3, 1),
  (2, 1),
  (2, 0),
  (3, 0),
];

// Builds one plane's raster-index traversal order, matching
// `init_block_mapping`: iterate superblock rows, then superblock columns,
// then the 16 Hilbert-ordered block offsets within each superblock; `None`
// where the offset falls outside the real (pre-padding) block grid.
pub fn build_all_blocks(sb_width: usize, sb_height: usize, block_width: usize, block_height: usize) -> Vec<Option<u32>> {
  let mut out = Vec::with_capacity(sb_width * sb_height * 16);
  for sb_y in 0..sb_height {
    for sb_x in 0..sb_width {
      for &(ox, oy) in HILBERT_OFFSET.iter() {
        let x = 4 * sb_x + ox;
        let y = 4 * sb_y + oy;
        if x < block_width && y < block_height {
          out.push(Some((y * block_width + x) as u32));
        } else {
          out.push(None);
        }
      }
    }
  }
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn single_superblock_covers_its_16_blocks_when_unpadded() {
    let all = build_all_blocks(1, 1, 4, 4);
    assert_eq!(all.len(), 16);
    assert!(all.iter().all(|b| b.is_some()));
    let mut seen: Vec<u32> = all.into_iter().flatten().collect();
    seen.sort_unstable();
    assert_eq!(seen, (0u32..16).collect::<Vec<_>>());
  }

  #[test]
  fn padding_blocks_outside_the_real_grid_are_none() {
    // 1 superblock but only a 2x2 real grid: half the Hilbert slots fall
    // outside the grid.
    let all = build_all_blocks(1, 1, 2, 2);
    assert_eq!(all.iter().filter(|b| b.is_some()).count(), 4);
  }
}
