//! Seams to the external collaborators: identity endpoint, request
//! transport, duplex channel transport and the credential slot.

mod channel;
mod identity;
mod key_value;
mod transport;

pub use channel::{ChannelConnection, ChannelEvent, ChannelEvents, ChannelSender, ChannelTransport};
pub use identity::IdentityApi;
pub use key_value::KeyValueStore;
pub use transport::RequestTransport;
