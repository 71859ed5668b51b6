//! Pull/push loading strategies and the outer loop that drives whichever
//! one is configured.

mod loader;
mod pull;
mod push;
mod strategy;

pub use ingest_types::Shutdown;
pub use loader::Loader;
pub use pull::PullStrategy;
pub use push::PushStrategy;
pub use strategy::LoadingStrategy;
