mod airzone;
mod callbacks;
mod climate;
mod client;
mod commands;
mod config;
mod error;
mod logger;
mod protocol;
mod reconciler;
mod store;
mod types;

pub use airzone::{Airzone, AirzoneBuilder};
pub use climate::{ClimateEntity, SystemEntity};
pub use client::{AirzoneClient, AirzoneClientBuilder, DeviceClient, DEFAULT_REQUEST_TIMEOUT};
pub use config::AirzoneConfig;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::{ModeReading, RawZoneReading};
pub use reconciler::PollOutcome;
pub use store::{MergeOutcome, ZoneEntry, ZoneStateStore};
pub use types::*;
