//! Rally segmentation and match statistics.
//!
//! Everything in this crate is a pure, synchronous function of closed shot,
//! rally and position collections. Malformed but well-typed input never
//! produces an error; it produces the best-effort statistics for that input.

pub mod aggregator;
pub mod highlights;
pub mod segmenter;

pub use aggregator::{
    AggregationInput, AggregatorConfig, AnalyticsAggregator, HeatmapConfig, MatchReport,
};
pub use highlights::{build_highlights, merge_windows, select_candidates, ClipPadding, HighlightConfig};
pub use segmenter::{RallySegmenter, SegmenterConfig};
