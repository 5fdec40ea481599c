pub mod audio;
pub mod config;
pub mod events;
mod lock;
pub mod pipeline;
pub mod store;
pub mod telemetry;

pub(crate) use lock::lock_or_recover;
