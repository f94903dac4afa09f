//! Credential lifecycle: storage, login/refresh and authenticated requests.

mod credential_store;
mod gateway;
mod memory_store;
mod middleware;

pub use credential_store::{ACCESS_KEY, CredentialChanges, CredentialStore, REFRESH_KEY};
pub use gateway::AuthGateway;
pub use memory_store::MemoryStore;
pub use middleware::RequestMiddleware;
