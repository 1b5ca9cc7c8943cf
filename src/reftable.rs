// Reference-frame table (C10): a bounded FIFO of decoded frames, looked up
// by display number, released only once unreferenced and displayed.
//
// Grounded on the `refframes[]` array management in `dirac_decode_frame`
// (insert/retire/BufferOverrun) and on the golden/last/current frame
// aliasing of `Vp3DecodeContext` in the original VP3 decoder - reworked per
// the "Cyclic frame references" design note as integer-indexed slots
// instead of raw pointer aliasing, so "golden == last == current" becomes
// three `Option<usize>` slot indices into one arena rather than three
// pointers to the same allocation.

use crate::error::{DecodeError, Result};
use crate::frame::Frame;

pub struct ReferenceFrameTable {
  capacity: usize,
  slots: Vec<Option<Entry>>,
  next_expected_display: u32,
}

struct Entry {
  frame: Frame,
  displayed: bool,
}

impl ReferenceFrameTable {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity,
      slots: Vec::new(),
      next_expected_display: 0,
    }
  }

  pub fn insert(&mut self, frame: Frame) -> Result<usize> {
    if let Some(idx) = self.slots.iter().position(|s| s.is_none()) {
      self.slots[idx] = Some(Entry { frame, displayed: false });
      return Ok(idx);
    }
    if self.slots.len() >= self.capacity {
      return Err(DecodeError::BufferOverrun(format!(
        "reference frame table capacity {} exceeded",
        self.capacity
      )));
    }
    self.slots.push(Some(Entry { frame, displayed: false }));
    Ok(self.slots.len() - 1)
  }

  pub fn find(&self, display_number: u32) -> Option<&Frame> {
    self
      .slots
      .iter()
      .flatten()
      .map(|e| &e.frame)
      .find(|f| f.display_number == display_number)
  }

  pub fn find_slot(&self, display_number: u32) -> Option<usize> {
    self
      .slots
      .iter()
      .position(|s| matches!(s, Some(e) if e.frame.display_number == display_number))
  }

  pub fn mark_displayed(&mut self, display_number: u32) {
    if let Some(entry) = self
      .slots
      .iter_mut()
      .flatten()
      .find(|e| e.frame.display_number == display_number)
    {
      entry.displayed = true;
    }
  }

  // Releases the frame iff it is both non-reference and already displayed.
  pub fn retire(&mut self, display_number: u32) {
    if let Some(idx) = self.find_slot(display_number) {
      let releasable = matches!(
        &self.slots[idx],
        Some(e) if !e.frame.is_reference() && e.displayed
      );
      if releasable {
        self.slots[idx] = None;
      }
    }
  }

  // Display-reorder replay (zero-byte `decode_frame` calls, spec §6/§4.10):
  // return the frame matching the next expected display number, if present,
  // and advance the expected counter.
  pub fn replay_next_display(&mut self) -> Option<Frame> {
    let want = self.next_expected_display;
    let frame = self.find(want).cloned();
    if frame.is_some() {
      self.mark_displayed(want);
      self.next_expected_display += 1;
    }
    frame
  }

  pub fn len(&self) -> usize {
    self.slots.iter().filter(|s| s.is_some()).count()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::ReferenceClass;

  fn dummy_frame(display_number: u32, reference: bool) -> Frame {
    let mut f = Frame::new(16, 16, 16, 16, 8, 8);
    f.display_number = display_number;
    f.reference_class = if reference {
      ReferenceClass::Reference
    } else {
      ReferenceClass::NotAReference
    };
    f
  }

  #[test]
  fn insert_fails_past_capacity() {
    let mut table = ReferenceFrameTable::new(1);
    table.insert(dummy_frame(0, true)).unwrap();
    assert!(matches!(
      table.insert(dummy_frame(1, true)),
      Err(DecodeError::BufferOverrun(_))
    ));
  }

  #[test]
  fn retire_only_releases_displayed_non_reference_frames() {
    let mut table = ReferenceFrameTable::new(2);
    table.insert(dummy_frame(0, false)).unwrap();
    table.retire(0);
    assert!(table.find(0).is_some(), "not displayed yet, must survive retire");

    table.mark_displayed(0);
    table.retire(0);
    assert!(table.find(0).is_none());
  }

  #[test]
  fn replay_returns_frames_in_display_order() {
    let mut table = ReferenceFrameTable::new(2);
    table.insert(dummy_frame(1, false)).unwrap();
    table.insert(dummy_frame(0, false)).unwrap();
    let first = table.replay_next_display().unwrap();
    assert_eq!(first.display_number, 0);
    let second = table.replay_next_display().unwrap();
    assert_eq!(second.display_number, 1);
    assert!(table.replay_next_display().is_none());
  }
}
