//! Serialized clone, checkout and build of preview commits.

mod base_url;
mod generator;
mod queue;
mod types;

pub use base_url::{BaseUrlError, base_url};
pub use queue::{QUEUE_CAPACITY, RenderQueue, RenderQueueConfig, RenderWorker};
pub use types::{RenderError, RenderJob, RenderResult};
