/// Tunables for the handful of thresholds the design notes (SPEC_FULL.md §9)
/// call out as empirical rather than load-bearing for correctness.
///
/// A `Table` carries one of these; queries never need to see it directly.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Selector-overlay index-translation heuristic: below
    /// `|tokens| < |selector| / selector_threshold_divisor`, translate each
    /// token with a rank/select call; otherwise materialise a forward
    /// lookup vector once. See §4.5.
    pub selector_threshold_divisor: u32,

    /// `RowMap` index-vector-vs-bitvector threshold used when the index path
    /// (§4.6 step 2) emits a surviving row set. See §4.6.
    pub rowmap_index_vector_threshold: usize,

    /// Multiplier used by the executor's linear-vs-index heuristic: a range
    /// `RowMap` is filtered linearly only if `last < multiplier * range_size`.
    /// See §4.7.
    pub linear_scan_span_multiplier: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            selector_threshold_divisor: 32,
            rowmap_index_vector_threshold: 1024,
            linear_scan_span_multiplier: 100,
        }
    }
}
