pub mod dest_trait;
pub mod file_dest;
pub mod host;
pub mod log_dest;
pub mod registry;

pub use dest_trait::Destination;
pub use file_dest::{FileDestination, FileFormat};
pub use host::DestinationHost;
pub use log_dest::LogDestination;
pub use registry::DestinationRegistry;
