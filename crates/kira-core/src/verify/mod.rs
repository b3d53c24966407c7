//! Verification recorder
//!
//! Writes verified phone numbers to the external key-value store.

mod recorder;
mod store;
mod types;

pub use recorder::VerificationRecorder;
pub use store::{FirebaseStore, VerificationStore};
pub use types::VerifiedUser;
