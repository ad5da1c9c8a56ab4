//! Room membership and fan-out

mod registry;
mod room;
mod stats;
mod types;

pub use registry::{
    BroadcastConfig, BroadcastReport, JoinOutcome, LeaveOutcome, RegistryError, RoomRegistry,
};
pub use room::Room;
pub use stats::RegistrySnapshot;
pub use types::{ConnectionHandle, DeliveryError};
