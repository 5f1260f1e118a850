//! Debug Adapter Protocol plumbing: framing, typed messages, per-connection
//! sessions and the TCP listener.

pub mod chan;
pub mod handlers;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;
pub mod types;

pub use server::{DEFAULT_PORT, DapServer};
pub use session::{Handlers, RequestError, Session, SessionError, SessionOutput};
