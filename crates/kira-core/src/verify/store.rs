//! Verification datastore
//!
//! Firebase Realtime Database REST client.

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::debug;

use crate::config::FirebaseConfig;
use crate::verify::VerifiedUser;
use crate::{Error, Result};

/// Key-value store holding verified users
#[async_trait]
pub trait VerificationStore: Send + Sync {
    /// Write the record under its phone number, replacing any previous one
    async fn put_user(&self, record: &VerifiedUser) -> Result<()>;
}

/// Realtime Database over REST (`PUT <db>/users/<phone>.json`)
#[derive(Debug, Clone)]
pub struct FirebaseStore {
    client: Client,
    database_url: Url,
    auth_token: Option<String>,
}

impl FirebaseStore {
    pub fn new(config: &FirebaseConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        let database_url = Url::parse(&config.database_url)
            .map_err(|e| Error::Config(format!("Invalid database URL: {}", e)))?;
        if database_url.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Invalid database URL: {}",
                config.database_url
            )));
        }

        Ok(Self {
            client,
            database_url,
            auth_token: config.auth_token.clone(),
        })
    }

    fn user_url(&self, phone_number: &str) -> Result<Url> {
        let mut url = self.database_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config("Database URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("users")
            .push(&format!("{}.json", phone_number));

        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }

        Ok(url)
    }
}

#[async_trait]
impl VerificationStore for FirebaseStore {
    async fn put_user(&self, record: &VerifiedUser) -> Result<()> {
        let url = self.user_url(&record.phone_number)?;
        debug!("Writing users/{}", record.phone_number);

        let response = self.client.put(url).json(record).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!("{}: {}", status, error_text)));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, auth_token: Option<&str>) -> FirebaseStore {
        FirebaseStore::new(&FirebaseConfig {
            database_url: server.uri(),
            auth_token: auth_token.map(str::to_string),
        })
        .unwrap()
    }

    #[test]
    fn test_rejects_invalid_url() {
        let config = FirebaseConfig {
            database_url: "not a url".to_string(),
            auth_token: None,
        };
        assert!(matches!(FirebaseStore::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_put_user_writes_record() {
        let server = MockServer::start().await;
        let record = VerifiedUser::new("1234567890");

        Mock::given(method("PUT"))
            .and(path("/users/1234567890.json"))
            .and(body_json(&record))
            .respond_with(ResponseTemplate::new(200).set_body_json(&record))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, None).put_user(&record).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_user_sends_auth_token() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/users/42.json"))
            .and(query_param("auth", "secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server, Some("secret"))
            .put_user(&VerifiedUser::new("42"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_user_surfaces_rejection() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Permission denied"))
            .mount(&server)
            .await;

        let err = store_for(&server, None)
            .put_user(&VerifiedUser::new("42"))
            .await
            .unwrap_err();
        match err {
            Error::Store(msg) => assert!(msg.contains("Permission denied")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
