// Dirac codec pipeline (spec §2 "Dirac"): arithmetic entropy coding, subband
// entropy decode, sequence/picture headers, block motion data, intra/inter
// prediction helpers and the wavelet reconstruction scheduler.

pub mod arith;
pub mod entropy;
pub mod headers;
pub mod motion;
pub mod predict;
pub mod recon;
