// YUV4MPEG2 output (spec §7 "Output"): writes decoded frames in display
// order as planar 4:2:0 Y4M, cropping each plane's padded storage down to
// its visible width/height.
//
// Grounded on the teacher's `Y4MWriter`; adapted from the flat `Plane.data`
// buffer to the `Array2D`-backed `Plane` this crate's reconstruction writes
// into. The encoder-facing `Y4MReader` is dropped since this crate never
// reads Y4M.

use std::io::prelude::*;

use byteorder::WriteBytesExt;

use crate::frame::Frame;

const Y4M_FILE_MAGIC: &str = "YUV4MPEG2 ";
const Y4M_FRAME_MAGIC: &str = "FRAME";

pub struct Y4MWriter<W> {
  inner: W,
  width: usize,
  height: usize,
}

impl<W: Write> Y4MWriter<W> {
  pub fn new(mut inner: W, width: usize, height: usize) -> std::io::Result<Self> {
    inner.write_all(Y4M_FILE_MAGIC.as_bytes())?;
    write!(inner, "W{} H{} F25:1 Ip A1:1 C420jpeg\n", width, height)?;
    Ok(Self { inner, width, height })
  }

  pub fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
    self.inner.write_all(Y4M_FRAME_MAGIC.as_bytes())?;
    self.inner.write_u8(b'\n')?;

    write_plane(&mut self.inner, frame.y(), self.width, self.height)?;
    let uv_width = (self.width + 1) / 2;
    let uv_height = (self.height + 1) / 2;
    write_plane(&mut self.inner, frame.u(), uv_width, uv_height)?;
    write_plane(&mut self.inner, frame.v(), uv_width, uv_height)?;
    Ok(())
  }
}

fn write_plane<W: Write>(w: &mut W, plane: &crate::frame::Plane, width: usize, height: usize) -> std::io::Result<()> {
  let mut row = vec![0u8; width];
  for y in 0..height {
    for (x, slot) in row.iter_mut().enumerate() {
      *slot = plane.pixels[y][x];
    }
    w.write_all(&row)?;
  }
  Ok(())
}
