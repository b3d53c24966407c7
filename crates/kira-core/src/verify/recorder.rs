use std::sync::Arc;

use tracing::{error, info};

use crate::verify::{VerificationStore, VerifiedUser};

/// Records verified phone numbers, reporting success as a plain bool
#[derive(Clone)]
pub struct VerificationRecorder {
    store: Arc<dyn VerificationStore>,
}

impl VerificationRecorder {
    pub fn new(store: Arc<dyn VerificationStore>) -> Self {
        Self { store }
    }

    /// Store `{phoneNumber, verified: true, verifiedAt: now}`.
    ///
    /// Failures are logged and reported as `false`; nothing propagates.
    pub async fn record(&self, phone_number: &str) -> bool {
        let record = VerifiedUser::new(phone_number);

        match self.store.put_user(&record).await {
            Ok(()) => {
                info!("User {} stored in verification store", phone_number);
                true
            }
            Err(e) => {
                error!("Error storing user {}: {}", phone_number, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, Result};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockStore {
        fail: bool,
        writes: Mutex<Vec<VerifiedUser>>,
    }

    #[async_trait]
    impl VerificationStore for MockStore {
        async fn put_user(&self, record: &VerifiedUser) -> Result<()> {
            if self.fail {
                return Err(Error::Store("unavailable".to_string()));
            }
            self.writes.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_record_success() {
        let store = Arc::new(MockStore::default());
        let recorder = VerificationRecorder::new(store.clone());

        assert!(recorder.record("1234567890").await);

        let writes = store.writes.lock().unwrap();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].phone_number, "1234567890");
        assert!(writes[0].verified);
    }

    #[tokio::test]
    async fn test_record_failure_is_false() {
        let store = Arc::new(MockStore {
            fail: true,
            ..Default::default()
        });
        let recorder = VerificationRecorder::new(store.clone());

        assert!(!recorder.record("1234567890").await);
        assert!(store.writes.lock().unwrap().is_empty());
    }
}
