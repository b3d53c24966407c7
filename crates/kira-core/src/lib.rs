//! kira-core: shared configuration, errors and the verification recorder
//!
//! The WhatsApp connector, the control API and the gateway binary all build on
//! the types exported here.

pub mod config;
pub mod error;
pub mod verify;

pub use config::{ApiConfig, Config, FirebaseConfig, PairingConfig, WhatsAppConfig};
pub use error::{Error, Result};
pub use verify::{FirebaseStore, VerificationRecorder, VerificationStore, VerifiedUser};
