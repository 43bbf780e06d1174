pub mod registry;

pub use registry::{CreateError, JoinError, LeaveError, RoomRegistry};
