//! Validated value types.
//!
//! These types enforce their invariants at construction time.

mod api_url;
mod resource_id;

pub use api_url::{ApiUrl, ChannelEndpoint};
pub use resource_id::ResourceId;
