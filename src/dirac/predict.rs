// Dirac prediction (C7): DC/MV neighbour-median prediction and
// mode/global/split-level majority-vote prediction.
//
// Grounded on `block_dc_prediction`, `motion_vector_prediction`,
// `mode_prediction` and `split_prediction` in the original decoder.

// Median of three values, with missing neighbours already substituted with
// 0 by the caller (spec §4.7 "missing ones replaced by 0").
pub fn median3(a: i32, b: i32, c: i32) -> i32 {
  a.max(b).min(a.min(b).max(c))
}

// DC / MV predictor: median of the top-left, top and left causal
// neighbours (each 0 if outside the grid).
pub fn predict_median(top_left: i32, top: i32, left: i32) -> i32 {
  median3(top_left, top, left)
}

// Prediction-mode / global-motion-use bit: the decoded bit is XORed with
// the majority of the three causal neighbours' bits at the same index.
pub fn predict_majority_bit(decoded: bool, top_left: bool, top: bool, left: bool) -> bool {
  let votes = top_left as u8 + top as u8 + left as u8;
  let majority = votes >= 2;
  decoded ^ majority
}

// Superblock split level (0..2) predictor: the decoded residual is added,
// modulo 3, to the majority split level of the causal neighbours.
pub fn predict_split_level(decoded_residual: u8, top_left: u8, top: u8, left: u8) -> u8 {
  let mut counts = [0u8; 3];
  for v in [top_left, top, left] {
    if (v as usize) < 3 {
      counts[v as usize] += 1;
    }
  }
  let majority = counts
    .iter()
    .enumerate()
    .max_by_key(|&(_, count)| *count)
    .map(|(level, _)| level as u8)
    .unwrap_or(0);
  (decoded_residual + majority) % 3
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn median_of_three_picks_the_middle_value() {
    assert_eq!(median3(1, 5, 3), 3);
    assert_eq!(median3(0, 0, 0), 0);
    assert_eq!(median3(-4, 2, -1), -1);
  }

  #[test]
  fn majority_bit_flips_only_when_majority_is_set() {
    assert_eq!(predict_majority_bit(false, true, true, false), true);
    assert_eq!(predict_majority_bit(false, false, false, true), false);
    assert_eq!(predict_majority_bit(true, false, false, false), true);
  }

  #[test]
  fn split_level_wraps_modulo_three() {
    assert_eq!(predict_split_level(2, 2, 2, 2), (2 + 2) % 3);
    assert_eq!(predict_split_level(0, 0, 0, 0), 0);
  }
}
