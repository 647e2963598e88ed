//! Record detection over the count batches the kernel produces.
//!
//! The kernel only reports counts for odd values, so records at even values
//! have to be inferred on the host. Two facts make that cheap:
//!
//! * if `m` holds the current record, `2m` reaches it in one extra halving
//!   step, `4m` in two, `8m` in three;
//! * if `m % 6 == 1` held a record, then `n = (4m - 1) / 3` is odd and its
//!   trajectory collapses onto `m` after two steps (`3n + 1 = 4m`), adding
//!   three to the count.
//!
//! A record can raise the count by more than one, so the last three record
//! values are kept per lookback level. Anything the lookback window cannot
//! catch is at most three counts above the current record and therefore still
//! odd, which the kernel covers directly.

/// Resumable cursor of the search, exactly the state the progress file holds.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Position {
    /// First value of the next unconsumed batch. Always 3 mod 8.
    pub cur_value: u128,
    /// Step count of the current record holder.
    pub cur_count: u16,
    /// Record values at count `cur_count - k` for doubling checks, zero when
    /// no record sits at that level.
    pub val0mod1off: [u128; 3],
    /// Same levels restricted to values that are 1 mod 6, zero otherwise.
    pub val1mod6off: [u128; 3],
}

impl Position {
    /// Start of a fresh search: the first batch begins at 3 and any positive
    /// count is a record.
    pub fn fresh() -> Self {
        Self {
            cur_value: 3,
            cur_count: 0,
            val0mod1off: [0; 3],
            val1mod6off: [0; 3],
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::fresh()
    }
}

/// A value whose total stopping time exceeded every smaller value's.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Record {
    pub value: u128,
    pub count: u16,
}

/// Walks consumed batches in value order and collects records.
pub struct RecordTracker {
    position: Position,
    records: Vec<Record>,
}

impl RecordTracker {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            records: Vec::new(),
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    /// Records found since construction, in ascending value order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Consumes one out-region. Entry `t` holds the count of the odd value
    /// `cur_value + 2t`; the even value below each odd one is checked against
    /// the lookback tables first, so detections stay in ascending value order.
    /// Returns the number of records appended.
    pub fn consume(&mut self, counts: &[u16]) -> usize {
        debug_assert_eq!(counts.len() % 4, 0);
        let first = self.position.cur_value;
        let before = self.records.len();

        for (t, &count) in counts.iter().enumerate() {
            let odd = first + 2 * t as u128;
            self.check_tables(odd - 1);
            if !self.check_tables(odd) && count > self.position.cur_count {
                self.new_high(odd, count);
            }
        }

        self.position.cur_value = first + 2 * counts.len() as u128;
        self.records.len() - before
    }

    /// Tests `n` against the lookback tables and claims the record if one
    /// matches. The two table kinds are disjoint by parity of `n`.
    fn check_tables(&mut self, n: u128) -> bool {
        if n & 1 == 0 {
            for k in 0..3u32 {
                let m = self.position.val0mod1off[k as usize];
                let shift = k + 1;
                if m != 0 && n >> shift == m && n & ((1 << shift) - 1) == 0 {
                    let count = self.position.cur_count.saturating_add(1);
                    if count > self.position.cur_count {
                        self.new_high(n, count);
                    }
                    return true;
                }
            }
        } else if n & 3 == 1 {
            for k in 0..3u16 {
                let m = self.position.val1mod6off[k as usize];
                if m != 0 && (n - 1) / 4 == (m - 1) / 3 {
                    let count = self.position.cur_count.saturating_add(3 - k);
                    if count > self.position.cur_count {
                        self.new_high(n, count);
                    }
                    return true;
                }
            }
        }
        false
    }

    fn new_high(&mut self, value: u128, count: u16) {
        let position = &mut self.position;
        let shift = usize::min((count - position.cur_count) as usize, 3);
        for k in (shift..3).rev() {
            position.val0mod1off[k] = position.val0mod1off[k - shift];
            position.val1mod6off[k] = position.val1mod6off[k - shift];
        }
        for k in 1..shift {
            position.val0mod1off[k] = 0;
            position.val1mod6off[k] = 0;
        }
        position.val0mod1off[0] = value;
        position.val1mod6off[0] = if value % 6 == 1 { value } else { 0 };
        position.cur_count = count;
        self.records.push(Record { value, count });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Total stopping time of `n`, the count the kernel reports.
    fn stopping_time(mut n: u128) -> u16 {
        let mut steps = 0u16;
        while n != 1 {
            n = if n & 1 == 0 { n / 2 } else { 3 * n + 1 };
            steps += 1;
        }
        steps
    }

    /// Counts for the batch `[first, first + 4 * width)` as the kernel would
    /// report them.
    fn kernel_batch(first: u128, width: usize) -> Vec<u16> {
        assert_eq!(first % 8, 3);
        (0..2 * width as u128)
            .map(|t| stopping_time(first + 2 * t))
            .collect()
    }

    #[test]
    fn zero_counts_only_advance_the_cursor() {
        let mut tracker = RecordTracker::new(Position::fresh());
        let appended = tracker.consume(&[0u16; 256]);
        assert_eq!(appended, 0);
        assert!(tracker.records().is_empty());
        assert_eq!(tracker.position().cur_value, 3 + 128 * 4);
        assert_eq!(tracker.position().cur_count, 0);
    }

    #[test]
    fn doubling_of_the_record_is_detected() {
        let position = Position {
            cur_value: 11,
            cur_count: 5,
            val0mod1off: [11, 0, 0],
            val1mod6off: [0, 0, 0],
        };
        let mut tracker = RecordTracker::new(position);
        // 22 is even, so the kernel reports nothing for it; the doubling
        // table has to find it.
        tracker.consume(&[0u16; 8]);

        assert_eq!(tracker.records(), &[Record { value: 22, count: 6 }]);
        let position = tracker.position();
        assert_eq!(position.cur_count, 6);
        assert_eq!(position.val0mod1off, [22, 11, 0]);
        assert_eq!(position.val1mod6off, [0, 0, 0]);
        assert_eq!(position.cur_value, 11 + 16);
    }

    #[test]
    fn mod_six_ancestor_is_detected() {
        // 7 holds the record with count 16; 9 = (4 * 7 - 1) / 3 reaches 7 in
        // three steps. 7 % 6 == 1, so the mod-6 table carries it.
        let mut tracker = RecordTracker::new(Position::fresh());
        tracker.consume(&kernel_batch(3, 2));
        assert_eq!(
            tracker.records(),
            &[
                Record { value: 3, count: 7 },
                Record { value: 6, count: 8 },
                Record { value: 7, count: 16 },
                Record { value: 9, count: 19 },
            ]
        );
        assert_eq!(tracker.position().val1mod6off[0], 0);
        assert_eq!(tracker.position().val0mod1off, [9, 0, 0]);
    }

    #[test]
    fn count_jump_of_two_shifts_tables_by_two() {
        // A mod-6 entry at level 1 infers a count two above the record, so
        // the old level-0 entries land on level 2 instead of falling off.
        let position = Position {
            cur_value: 3,
            cur_count: 17,
            val0mod1off: [11, 7, 0],
            val1mod6off: [0, 7, 0],
        };
        let mut tracker = RecordTracker::new(position);
        tracker.consume(&[0u16; 4]);

        assert_eq!(tracker.records(), &[Record { value: 9, count: 19 }]);
        let position = tracker.position();
        assert_eq!(position.cur_count, 19);
        assert_eq!(position.val0mod1off, [9, 0, 11]);
        assert_eq!(position.val1mod6off, [0, 0, 0]);
    }

    #[test]
    fn lookback_levels_shift_by_count_jump() {
        let mut tracker = RecordTracker::new(Position::fresh());
        // At 27 the count jumps from 23 to 111, which flushes every lookback
        // level except the newest.
        tracker.consume(&kernel_batch(3, 8));
        let position = tracker.position();
        assert_eq!(position.cur_count, 111);
        assert_eq!(position.val0mod1off, [27, 0, 0]);
        assert_eq!(position.val1mod6off, [0, 0, 0]);
        assert_eq!(
            tracker.records().last(),
            Some(&Record { value: 27, count: 111 })
        );
    }

    #[test]
    fn matches_exhaustive_search() {
        // Walk everything in [2, 4098) and compare against a brute-force
        // record scan of the same range. The only undetectable record is 2
        // itself: it is even and no table entry exists yet when it passes.
        let width = 128usize;
        let batches = 8u128;
        let mut tracker = RecordTracker::new(Position::fresh());
        for batch in 0..batches {
            tracker.consume(&kernel_batch(3 + batch * 4 * width as u128, width));
        }

        let end = 2 + batches * 4 * width as u128;
        let mut expected = Vec::new();
        let mut best = 0u16;
        for n in 3..end {
            let count = stopping_time(n);
            if count > best {
                expected.push(Record { value: n, count });
                best = count;
            }
        }

        assert_eq!(tracker.records(), expected.as_slice());
        assert_eq!(tracker.position().cur_value, end + 1);
        assert_eq!(tracker.position().cur_count, best);
    }

    #[test]
    fn resuming_from_a_position_matches_a_straight_run() {
        let width = 64usize;
        let mut straight = RecordTracker::new(Position::fresh());
        for batch in 0..8u128 {
            straight.consume(&kernel_batch(3 + batch * 4 * width as u128, width));
        }

        let mut front = RecordTracker::new(Position::fresh());
        for batch in 0..4u128 {
            front.consume(&kernel_batch(3 + batch * 4 * width as u128, width));
        }
        let mut back = RecordTracker::new(*front.position());
        for batch in 4..8u128 {
            back.consume(&kernel_batch(3 + batch * 4 * width as u128, width));
        }

        assert_eq!(back.position(), straight.position());
        let boundary = front.position().cur_value;
        let tail: Vec<Record> = straight
            .records()
            .iter()
            .copied()
            .filter(|record| record.value >= boundary)
            .collect();
        assert_eq!(back.records(), tail.as_slice());
    }
}
