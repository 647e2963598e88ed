/// Splits a 128-bit value into the four little-endian u32 limbs the compute
/// kernel consumes.
pub fn limbs(value: u128) -> [u32; 4] {
    [
        value as u32,
        (value >> 32) as u32,
        (value >> 64) as u32,
        (value >> 96) as u32,
    ]
}

/// Emits candidate batches for one streaming slot.
///
/// The global candidate sequence starts at the resume point and advances in
/// steps of 4; each kernel lane also checks its value + 2, so two consecutive
/// batches cover every odd integer in their range. Slot `s` of `S` owns batch
/// indices `s, s + S, s + 2S, ...`, which keeps the slots on disjoint ranges
/// while the union stays gapless.
pub struct ValueSequencer {
    next_value: u128,
    batch_width: usize,
    heap_stride: u128,
}

impl ValueSequencer {
    pub fn for_slot(first_value: u128, slot: u32, slot_count: u32, values_per_inout: u32) -> Self {
        debug_assert_eq!(first_value % 8, 3);
        debug_assert!(slot < slot_count);
        let batch_stride = values_per_inout as u128 * 4;
        Self {
            next_value: first_value + slot as u128 * batch_stride,
            batch_width: values_per_inout as usize,
            heap_stride: slot_count as u128 * batch_stride,
        }
    }

    /// First value of the batch the next `fill` will emit.
    pub fn next_value(&self) -> u128 {
        self.next_value
    }

    /// Writes one batch into a mapped in-region and advances the cursor past
    /// the batches owned by the other slots.
    pub fn fill(&mut self, dst: &mut [[u32; 4]]) {
        debug_assert_eq!(dst.len(), self.batch_width);
        debug_assert_eq!(self.next_value % 8, 3);
        let mut value = self.next_value;
        for lane in dst.iter_mut() {
            *lane = limbs(value);
            value += 4;
        }
        self.next_value += self.heap_stride;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(lane: [u32; 4]) -> u128 {
        lane[0] as u128 | (lane[1] as u128) << 32 | (lane[2] as u128) << 64 | (lane[3] as u128) << 96
    }

    #[test]
    fn limbs_are_little_endian() {
        let value = 0x0123_4567_89ab_cdef_1122_3344_5566_7788_u128;
        assert_eq!(limbs(value), [0x5566_7788, 0x1122_3344, 0x89ab_cdef, 0x0123_4567]);
        assert_eq!(decode(limbs(value)), value);
        assert_eq!(limbs(3), [3, 0, 0, 0]);
    }

    #[test]
    fn single_slot_emits_stride_four() {
        let mut sequencer = ValueSequencer::for_slot(3, 0, 1, 8);
        let mut batch = [[0u32; 4]; 8];
        sequencer.fill(&mut batch);
        let values: Vec<u128> = batch.iter().map(|lane| decode(*lane)).collect();
        assert_eq!(values, vec![3, 7, 11, 15, 19, 23, 27, 31]);
        assert_eq!(sequencer.next_value(), 35);
    }

    #[test]
    fn slots_interleave_without_gaps() {
        let slots = 3;
        let width = 4;
        let mut sequencers: Vec<ValueSequencer> = (0..slots)
            .map(|slot| ValueSequencer::for_slot(11, slot, slots, width))
            .collect();

        let mut seen = Vec::new();
        for _round in 0..2 {
            for sequencer in sequencers.iter_mut() {
                let mut batch = [[0u32; 4]; 4];
                sequencer.fill(&mut batch);
                seen.extend(batch.iter().map(|lane| decode(*lane)));
            }
        }

        let expected: Vec<u128> = (0..24).map(|i| 11 + 4 * i).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn emitted_values_keep_residue() {
        let mut sequencer = ValueSequencer::for_slot(0x7fff_fffb, 1, 2, 128);
        let mut batch = [[0u32; 4]; 128];
        for _ in 0..4 {
            sequencer.fill(&mut batch);
            for lane in batch.iter() {
                assert_eq!(decode(*lane) % 4, 3);
            }
            assert_eq!(decode(batch[0]) % 8, 3);
        }
    }
}
