// Crate-wide error type.
//
// All six kinds come directly from the error surface of both codecs: the bit
// reader and arithmetic decoder never fail on their own (overread is defined
// behaviour, not an error - see `bitreader`), so every variant here is raised
// by a higher-level component that notices the *consequence* of a malformed
// stream.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("truncated bitstream: {0}")]
  Truncated(String),

  #[error("invalid syntax: {0}")]
  InvalidSyntax(String),

  #[error("malformed table: {0}")]
  MalformedTable(String),

  #[error("invalid dimensions: {0}")]
  DimensionError(String),

  #[error("reference frame table overflow: {0}")]
  BufferOverrun(String),

  #[error("unsupported feature: {0}")]
  UnsupportedFeature(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
