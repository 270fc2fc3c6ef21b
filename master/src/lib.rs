pub mod accumulator;
pub mod archive;
pub mod atomic;
pub mod config;
pub mod error;
pub mod interval;
pub mod master;
mod modes;
pub mod net;
pub mod registry;
pub mod selector;
pub mod sizer;
pub mod stats;
pub mod sync;
pub mod telemetry;
pub mod worker_map;

pub use config::{MasterConfig, Mode};
pub use error::{MasterErr, Result};
pub use master::Master;
pub use net::{RelayTransport, Transport};
