pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::{detached_metrics_handle, init_metrics};
