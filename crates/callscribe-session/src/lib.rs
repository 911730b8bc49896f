pub mod dispatcher;
pub mod session;
pub mod transport;

pub use dispatcher::{Dispatcher, FrameStats};
pub use session::{shutdown_requested, Session, SessionReport};
pub use transport::{Frame, Transport};
