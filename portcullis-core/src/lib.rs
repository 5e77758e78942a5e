//! Portcullis Core - credentials, sessions and access policy
//!
//! Everything here is independent of the HTTP layer: the web crate maps
//! requests onto [`RegistrationService`], [`SessionAuthority`] and
//! [`AccessPolicy`] and turns their results into responses.

pub mod config;
pub mod error;
pub mod logging;
pub mod password;
pub mod policy;
pub mod registration;
pub mod session;
pub mod store;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use password::*;
pub use policy::*;
pub use registration::*;
pub use session::*;
pub use store::*;
pub use traits::*;
pub use types::*;

// Re-export commonly used external types
pub use async_trait::async_trait;
pub use tracing;
