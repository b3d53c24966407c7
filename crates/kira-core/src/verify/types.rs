//! Verified user record

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Record stored under `users/<phoneNumber>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedUser {
    pub phone_number: String,
    pub verified: bool,
    /// ISO-8601, UTC, millisecond precision
    pub verified_at: String,
}

impl VerifiedUser {
    /// A freshly verified record stamped with the current time
    pub fn new(phone_number: impl Into<String>) -> Self {
        Self::verified_at(phone_number, Utc::now())
    }

    pub fn verified_at(phone_number: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            phone_number: phone_number.into(),
            verified: true,
            verified_at: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_record_shape() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let record = VerifiedUser::verified_at("1234567890", at);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "phoneNumber": "1234567890",
                "verified": true,
                "verifiedAt": "2024-05-01T12:30:00.000Z"
            })
        );
    }

    #[test]
    fn test_new_is_verified() {
        let record = VerifiedUser::new("15550001111");
        assert!(record.verified);
        assert!(record.verified_at.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(&record.verified_at).is_ok());
    }
}
