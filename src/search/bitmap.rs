// logcore - search/bitmap.rs
//
// C7: SearchResultBitmap — an ordered, sparse set of matching line numbers.
// Kept as a sorted `Vec` rather than a true bitmap: matches are sparse
// relative to file size, and a sorted vector gives O(log n) membership and
// cheap ordered iteration without the bit-twiddling a dense bitmap would
// need for multi-GiB files.
//
// Always stays sorted after every mutation, including `or_with` merges from
// the parallel combiner — this resolves the open question in the source
// about `SearchData::deleteMatch`'s order-dependent backward scan (see
// DESIGN.md).

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResultBitmap {
    lines: Vec<u64>,
}

impl SearchResultBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    fn position_of(&self, line: u64) -> Result<usize, usize> {
        self.lines.binary_search(&line)
    }

    /// Insert `line`, keeping the set sorted. No-op if already present.
    pub fn add(&mut self, line: u64) {
        if let Err(i) = self.position_of(line) {
            self.lines.insert(i, line);
        }
    }

    pub fn contains(&self, line: u64) -> bool {
        self.position_of(line).is_ok()
    }

    pub fn remove(&mut self, line: u64) -> bool {
        match self.position_of(line) {
            Ok(i) => {
                self.lines.remove(i);
                true
            }
            Err(_) => false,
        }
    }

    /// Remove every entry with `line >= from_line_inclusive`. Used when
    /// resuming an incremental search to discard a stale match on the line
    /// that is about to be rescanned.
    pub fn remove_from(&mut self, from_line_inclusive: u64) {
        let cut = self.position_of(from_line_inclusive).unwrap_or_else(|i| i);
        self.lines.truncate(cut);
    }

    /// Merge `other` in, keeping the result sorted and deduplicated. Used by
    /// the combiner stage to fold a matcher's partial results in, regardless
    /// of the order partials arrive in.
    pub fn or_with(&mut self, other: &SearchResultBitmap) {
        if other.lines.is_empty() {
            return;
        }
        let mut merged = Vec::with_capacity(self.lines.len() + other.lines.len());
        let (mut i, mut j) = (0, 0);
        while i < self.lines.len() && j < other.lines.len() {
            match self.lines[i].cmp(&other.lines[j]) {
                std::cmp::Ordering::Less => {
                    merged.push(self.lines[i]);
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(other.lines[j]);
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    merged.push(self.lines[i]);
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend_from_slice(&self.lines[i..]);
        merged.extend_from_slice(&other.lines[j..]);
        self.lines = merged;
    }

    pub fn cardinality(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// The `i`-th matching line in ascending order, used to translate a
    /// filtered index into an absolute line number.
    pub fn nth(&self, i: usize) -> Option<u64> {
        self.lines.get(i).copied()
    }

    /// Rank of `line` among matches, i.e. how many filtered indices precede
    /// it, if `line` itself is a match.
    pub fn index_of(&self, line: u64) -> Option<usize> {
        self.position_of(line).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.lines.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_keeps_sorted_and_deduplicated() {
        let mut b = SearchResultBitmap::new();
        for l in [5, 1, 3, 1] {
            b.add(l);
        }
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 3, 5]);
        assert_eq!(b.cardinality(), 3);
    }

    #[test]
    fn or_with_merges_out_of_order_partials() {
        let mut a = SearchResultBitmap::new();
        a.add(10);
        a.add(30);
        let mut b = SearchResultBitmap::new();
        b.add(20);
        b.add(5);
        a.or_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![5, 10, 20, 30]);
    }

    #[test]
    fn remove_from_truncates_tail() {
        let mut b = SearchResultBitmap::new();
        for l in [1, 2, 3, 4, 5] {
            b.add(l);
        }
        b.remove_from(3);
        assert_eq!(b.iter().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn nth_and_index_of_round_trip() {
        let mut b = SearchResultBitmap::new();
        for l in [4, 14, 24, 34] {
            b.add(l);
        }
        assert_eq!(b.nth(2), Some(24));
        assert_eq!(b.index_of(24), Some(2));
        assert_eq!(b.index_of(99), None);
    }
}
