// VP3/Theora codec pipeline (spec §2 "VP3/Theora"): header/extradata parsing,
// VLC token entropy decode, macroblock mode/DC prediction, dequantization and
// the DCT reconstruction scheduler.

pub mod dequant;
pub mod entropy;
pub mod headers;
pub mod hilbert;
pub mod predict;
pub mod recon;
