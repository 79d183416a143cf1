//! Pipeline orchestration: stage sequencing, verdict aggregation and batches.

pub mod batch;
pub mod pipeline;
pub mod scoring;
pub mod state;

pub use batch::run_batch;
pub use pipeline::{Pipeline, PipelineBuilder};
pub use state::PipelineState;
