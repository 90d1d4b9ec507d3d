//! Bounded "top N by metric" ranking support.

mod metric;
mod topk;

pub use metric::{top_k, RankMetric, UnknownMetric};
pub use topk::TopK;
