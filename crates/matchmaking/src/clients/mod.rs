//! Clients for services the matchmaking core depends on

pub mod provisioning;

pub use provisioning::{
    Collaboration, MockProvisioner, ProvisioningError, WorkspaceProvisioner,
};
#[cfg(feature = "client")]
pub use provisioning::http::HttpProvisioner;
