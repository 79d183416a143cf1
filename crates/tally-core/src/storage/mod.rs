pub mod schema;
pub mod store;

pub use store::Store;

use crate::model::EvaluationResult;

/// Destination for finished evaluations. Implementations must be append-only:
/// a re-evaluation adds a record and never replaces an earlier one.
pub trait ResultSink: Send + Sync {
    fn append(&self, result: &EvaluationResult) -> anyhow::Result<()>;
}
