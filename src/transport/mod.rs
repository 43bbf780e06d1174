pub mod ports;
pub mod supervisor;

pub use ports::{PortAllocator, PortError};
pub use supervisor::{SpawnError, TransportHandle, TransportSupervisor};
