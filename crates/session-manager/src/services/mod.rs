//! Service layer for the session manager.

pub mod registry_client;
pub mod relay_client;
pub mod relay_selection;
pub mod session_service;

pub use registry_client::{HttpRegistryClient, RegistryClient};
pub use relay_client::{HttpRelayClient, RelayClient};
pub use session_service::SessionService;
