//! Converting finalized answers into social posts.

mod cache;
mod error;
pub mod models;
mod pipeline;

pub use cache::SharePreviewCache;
pub use error::{ShareError, ShareResult};
pub use pipeline::SharePipeline;
