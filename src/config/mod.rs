pub mod credentials;
pub mod settings;

pub use credentials::{
    OrganizationCredentials, TargetConfig, TargetCredentials, load_organizations,
    load_target_config,
};
pub use settings::{Environment, SyncConfig};
