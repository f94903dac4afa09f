//! Resilient duplex channel: connection management and inbound fan-out.

mod bus;
mod inbound;
mod manager;
mod policy;
mod state;

pub use bus::{MessageBus, MessageStream};
pub use inbound::Inbound;
pub use manager::ConnectionManager;
pub use policy::ReconnectPolicy;
pub use state::ConnectionState;
