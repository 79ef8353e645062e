//! Warden
//!
//! Service layer and command-line front end for the Warden authorization
//! engine. Wires a policy repository, the system-policy guard, and the
//! snapshot cache into one [`AuthorizationService`], configured from TOML.

pub mod check;
pub mod config;
pub mod error;
pub mod service;

pub use check::{check_policies, PolicyIssue};
pub use config::{CacheConfig, CatalogConfig, EvaluationConfig, WardenConfig};
pub use error::{WardenError, WardenResult};
pub use service::AuthorizationService;
