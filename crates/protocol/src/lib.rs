mod request;
mod response;
mod types;
mod version;

pub use request::DaemonRequest;
pub use response::DaemonResponse;
pub use types::{
    ComponentKind, ComponentReading, DaemonStatus, DataSnapshot, EnergyTotals, ErrorKind,
    PowerSample, Session, MAX_SUBSCRIBERS,
};
pub use version::{MIN_SUPPORTED_VERSION, PROTOCOL_VERSION};
