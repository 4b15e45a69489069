pub mod config;
pub mod error;
pub mod model_download;
pub mod pipeline;
pub mod relay;
pub mod sender;
pub mod transform;
pub mod types;
pub mod wire;

pub use config::Config;
pub use error::RelayError;
pub use relay::{Relay, RelaySummary, RetryPolicy, StopReason};
pub use types::{Detection, Frame, Landmark, TrackingMode};
