//! Filtered traces pulled from a committed frame.

use std::ops::Range;

use serde::Serialize;

use super::CompositionId;
use crate::composition::SignalComposition;

/// Filtered on-screen samples of one composition
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Trace {
    pub composition: CompositionId,
    /// Screen position of `values[0]`
    pub first_position: usize,
    pub values: Vec<f64>,
}

impl Trace {
    /// Filtered value at a screen position, if that position holds data
    pub fn get(&self, position: usize) -> Option<f64> {
        position
            .checked_sub(self.first_position)
            .and_then(|i| self.values.get(i))
            .copied()
    }

    /// Screen positions covered by the trace
    pub fn positions(&self) -> Range<usize> {
        self.first_position..self.first_position + self.values.len()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Filter the visible samples of `composition` held in `buffer`.
///
/// The chain is rewound to its warm-up checkpoint first, so extracting the
/// same frame twice gives identical values.
pub fn extract(composition: &mut SignalComposition, buffer: &[u8]) -> Trace {
    let frame = composition.frame().clone();
    composition.chain.restore_state();

    let mut values = Vec::with_capacity(frame.visible_samples());
    if frame.visible_samples() > 0 {
        let region = &buffer[frame.buffer_offset..];
        for index in frame.sample_timeoffset..frame.sample_timeoffset + frame.visible_samples() {
            let x = composition.sample_value(region, index);
            values.push(composition.chain.apply(x));
        }
    }

    Trace {
        composition: composition.id(),
        first_position: frame.sample_start,
        values,
    }
}
