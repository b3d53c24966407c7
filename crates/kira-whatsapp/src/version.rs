//! Protocol version negotiation

use std::fmt;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// WhatsApp Web version triple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolVersion(pub [u32; 3]);

/// Used when the published version cannot be fetched
pub const DEFAULT_VERSION: ProtocolVersion = ProtocolVersion([2, 3000, 1_015_901_307]);

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, patch] = self.0;
        write!(f, "{}.{}.{}", major, minor, patch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionInfo {
    pub version: ProtocolVersion,
    /// `false` when falling back to [`DEFAULT_VERSION`]
    pub is_latest: bool,
}

impl VersionInfo {
    fn fallback() -> Self {
        Self {
            version: DEFAULT_VERSION,
            is_latest: false,
        }
    }
}

#[derive(Deserialize)]
struct VersionDocument {
    version: ProtocolVersion,
}

/// Fetch the latest published version, falling back to the bundled one
pub async fn fetch_latest_version(client: &Client, url: &str) -> VersionInfo {
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("Failed to fetch latest protocol version: {}", e);
            return VersionInfo::fallback();
        }
    };

    if !response.status().is_success() {
        warn!(
            "Failed to fetch latest protocol version: {}",
            response.status()
        );
        return VersionInfo::fallback();
    }

    // the document is served as text/plain, so parse the body ourselves
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            warn!("Failed to read protocol version document: {}", e);
            return VersionInfo::fallback();
        }
    };

    match serde_json::from_str::<VersionDocument>(&body) {
        Ok(doc) => {
            debug!("Latest protocol version: {}", doc.version);
            VersionInfo {
                version: doc.version,
                is_latest: true,
            }
        }
        Err(e) => {
            warn!("Invalid protocol version document: {}", e);
            VersionInfo::fallback()
        }
    }
}
