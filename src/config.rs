// Decoder configuration surface (spec C11/C12: init(config)).

use crate::error::{DecodeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaFormat {
  Yuv420,
  Yuv422,
  Yuv444,
}

impl ChromaFormat {
  // Only 4:2:0 geometry is implemented by the reconstruction scheduler
  // (see DESIGN.md's "VP3 chroma mb_mode inheritance" decision).
  pub fn is_supported(self) -> bool {
    matches!(self, ChromaFormat::Yuv420)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecVariant {
  Dirac,
  Vp3Theora,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
  pub width: usize,
  pub height: usize,
  pub chroma: ChromaFormat,
  pub codec: CodecVariant,
  // Theora's three-packet Xiph extradata blob, or empty for Dirac / raw VP3
  // where geometry comes from the frame header itself.
  pub extradata: Box<[u8]>,
  // Bound on the reference-frame table (C10); 0 selects a codec-appropriate
  // default (2 for Dirac, 2 for VP3/Theora's golden + last).
  pub max_reference_frames: usize,
}

impl DecoderConfig {
  pub fn new(width: usize, height: usize, chroma: ChromaFormat, codec: CodecVariant) -> Self {
    Self {
      width,
      height,
      chroma,
      codec,
      extradata: Box::new([]),
      max_reference_frames: 0,
    }
  }

  pub fn with_extradata(mut self, extradata: Box<[u8]>) -> Self {
    self.extradata = extradata;
    self
  }

  pub fn with_max_reference_frames(mut self, n: usize) -> Self {
    self.max_reference_frames = n;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.width == 0 || self.height == 0 {
      return Err(DecodeError::DimensionError(format!(
        "zero dimension {}x{}",
        self.width, self.height
      )));
    }
    // A generous ceiling; real streams never approach it but a corrupt
    // header claiming e.g. u32::MAX x u32::MAX must not be allowed to drive
    // an allocation.
    const MAX_DIM: usize = 1 << 16;
    if self.width > MAX_DIM || self.height > MAX_DIM {
      return Err(DecodeError::DimensionError(format!(
        "implausible dimension {}x{}",
        self.width, self.height
      )));
    }
    if !self.chroma.is_supported() {
      return Err(DecodeError::UnsupportedFeature(format!(
        "chroma format {:?} (only 4:2:0 is implemented)",
        self.chroma
      )));
    }
    Ok(())
  }

  pub fn resolved_max_reference_frames(&self) -> usize {
    if self.max_reference_frames != 0 {
      return self.max_reference_frames;
    }
    match self.codec {
      CodecVariant::Dirac => 2,
      CodecVariant::Vp3Theora => 2, // golden + last
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_zero_dimensions() {
    let cfg = DecoderConfig::new(0, 16, ChromaFormat::Yuv420, CodecVariant::Vp3Theora);
    assert!(matches!(cfg.validate(), Err(DecodeError::DimensionError(_))));
  }

  #[test]
  fn rejects_unsupported_chroma() {
    let cfg = DecoderConfig::new(16, 16, ChromaFormat::Yuv444, CodecVariant::Dirac);
    assert!(matches!(cfg.validate(), Err(DecodeError::UnsupportedFeature(_))));
  }
}
