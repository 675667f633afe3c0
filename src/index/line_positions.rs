// logcore - index/line_positions.rs
//
// C1: LinePositionArray — append-only ordered sequence of absolute byte
// offsets, one per line terminator, plus a synthetic trailing-LF flag.

/// For line `i`, `array[i]` is the byte offset of the first byte after that
/// line's terminator. Line `i`'s start is `array[i-1]` (or 0 for `i == 0`);
/// its payload ends at `array[i] - line_terminator_width`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinePositionArray {
    offsets: Vec<u64>,
    /// True when the last entry in `offsets` is synthetic — the file does
    /// not end in a line terminator, so a fake final entry was recorded to
    /// make the last line addressable.
    fake_final_lf: bool,
}

impl LinePositionArray {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one line-terminator offset. If a fake final LF is currently
    /// recorded, it is dropped first — a real terminator always supersedes
    /// the synthetic one (spec §4.1).
    pub fn append(&mut self, offset: u64) {
        if self.fake_final_lf {
            self.offsets.pop();
            self.fake_final_lf = false;
        }
        debug_assert!(
            self.offsets.last().map(|&last| offset > last).unwrap_or(true),
            "offsets must be strictly increasing"
        );
        self.offsets.push(offset);
    }

    /// Concatenate `other` onto the end of `self`, honoring the fake-LF
    /// rule on the receiver: if `self` currently ends in a fake entry it is
    /// dropped before `other`'s entries are appended, since `other` was
    /// indexed starting from the byte immediately after `self`'s last real
    /// terminator (spec §4.1 `appendBatch`).
    pub fn append_batch(&mut self, other: &LinePositionArray) {
        if other.offsets.is_empty() {
            return;
        }
        if self.fake_final_lf {
            self.offsets.pop();
        }
        self.offsets.extend_from_slice(&other.offsets);
        self.fake_final_lf = other.fake_final_lf;
    }

    pub fn at(&self, i: usize) -> Option<u64> {
        self.offsets.get(i).copied()
    }

    pub fn size(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn set_fake_final_lf(&mut self, value: bool) {
        self.fake_final_lf = value;
    }

    pub fn fake_final_lf(&self) -> bool {
        self.fake_final_lf
    }

    /// Byte offset where line `i` starts: 0 for the first line, else the
    /// prior line's recorded terminator-end offset.
    pub fn line_start(&self, i: usize) -> u64 {
        if i == 0 {
            0
        } else {
            self.offsets.get(i - 1).copied().unwrap_or(0)
        }
    }

    pub fn clear(&mut self) {
        self.offsets.clear();
        self.fake_final_lf = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.offsets.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_keeps_strictly_increasing_offsets() {
        let mut arr = LinePositionArray::new();
        arr.append(10);
        arr.append(25);
        arr.append(40);
        assert_eq!(arr.size(), 3);
        assert_eq!(arr.at(0), Some(10));
        assert_eq!(arr.line_start(0), 0);
        assert_eq!(arr.line_start(1), 10);
        assert_eq!(arr.line_start(2), 25);
    }

    #[test]
    fn fake_final_lf_is_replaced_by_real_append() {
        let mut arr = LinePositionArray::new();
        arr.append(10);
        arr.append(20);
        arr.set_fake_final_lf(true);
        assert_eq!(arr.size(), 2);
        // A real terminator arrives (more data was appended to the file).
        arr.append(25);
        assert!(!arr.fake_final_lf());
        assert_eq!(arr.size(), 2);
        assert_eq!(arr.at(1), Some(25));
    }

    #[test]
    fn append_batch_drops_receiver_fake_lf_before_merging() {
        let mut a = LinePositionArray::new();
        a.append(10);
        a.set_fake_final_lf(true);

        let mut b = LinePositionArray::new();
        b.append(20);
        b.append(30);

        a.append_batch(&b);
        assert_eq!(a.size(), 2);
        assert_eq!(a.at(0), Some(20));
        assert_eq!(a.at(1), Some(30));
        assert!(!a.fake_final_lf());
    }

    #[test]
    fn append_batch_onto_empty_receiver() {
        let mut a = LinePositionArray::new();
        let mut b = LinePositionArray::new();
        b.append(5);
        b.set_fake_final_lf(true);
        a.append_batch(&b);
        assert_eq!(a.size(), 1);
        assert!(a.fake_final_lf());
    }
}
