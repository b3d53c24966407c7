//! Credential storage
//!
//! Multi-file auth state: `creds.json` plus one JSON file per signal key,
//! named `<type>-<id>.json`. The file name mangles `/` and `:`, so each key
//! file stores `{"id", "value"}` and the id is read back from the content.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, WhatsAppError};
use crate::types::CredentialUpdate;

const CREDS_FILE: &str = "creds.json";

/// Key types the socket library persists, longest first so prefixes resolve
/// to the most specific type.
const KEY_TYPES: &[&str] = &[
    "app-state-sync-version",
    "sender-key-memory",
    "app-state-sync-key",
    "lid-mapping",
    "sender-key",
    "device-list",
    "pre-key",
    "session",
];

/// Stored signal keys: `type -> id -> value`
pub type KeyStore = HashMap<String, HashMap<String, Value>>;

/// Contents of a key file
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredKey<T> {
    id: String,
    value: T,
}

/// Credential material handed to the socket on connect
#[derive(Debug, Clone, Default)]
pub struct AuthState {
    /// `None` until the first pairing; the library initialises fresh creds
    pub creds: Option<Value>,
    pub keys: KeyStore,
}

/// Credential directory on local disk
#[derive(Debug, Clone)]
pub struct AuthStore {
    dir: PathBuf,
}

impl AuthStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load creds and keys, creating the directory when absent
    pub async fn load(&self) -> Result<AuthState> {
        fs::create_dir_all(&self.dir).await?;

        let creds = match fs::read(self.dir.join(CREDS_FILE)).await {
            Ok(bytes) => Some(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mut keys = KeyStore::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name == CREDS_FILE {
                continue;
            }
            let Some((key_type, file_id)) = parse_key_file_name(name) else {
                debug!("Skipping unrecognised auth file: {}", name);
                continue;
            };

            let bytes = match fs::read(entry.path()).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Failed to read key file {}: {}", name, e);
                    continue;
                }
            };

            let (id, value) = match serde_json::from_slice::<StoredKey<Value>>(&bytes) {
                Ok(stored) => (stored.id, stored.value),
                // bare value without an id, only the file name to go on
                Err(_) => match serde_json::from_slice::<Value>(&bytes) {
                    Ok(value) => (file_id, value),
                    Err(e) => {
                        warn!("Ignoring corrupt key file {}: {}", name, e);
                        continue;
                    }
                },
            };
            keys.entry(key_type.to_string())
                .or_default()
                .insert(id, value);
        }

        debug!(
            "Loaded auth state from {} (registered creds: {}, key types: {})",
            self.dir.display(),
            creds.is_some(),
            keys.len()
        );

        Ok(AuthState { creds, keys })
    }

    /// Persist a credential update. Key entries set to `None` are removed.
    pub async fn save(&self, update: &CredentialUpdate) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        if let Some(creds) = &update.creds {
            write_json(&self.dir.join(CREDS_FILE), creds).await?;
        }

        for (key_type, entries) in &update.keys {
            for (id, value) in entries {
                let path = self.dir.join(key_file_name(key_type, id));
                match value {
                    Some(value) => write_json(&path, &StoredKey { id: id.clone(), value }).await?,
                    None => match fs::remove_file(&path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    },
                }
            }
        }

        Ok(())
    }

    /// Remove the whole directory. Returns whether there was one to remove.
    pub async fn delete(&self) -> Result<bool> {
        match fs::metadata(&self.dir).await {
            Ok(_) => {
                fs::remove_dir_all(&self.dir).await?;
                info!("Deleted auth folder: {}", self.dir.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    fs::write(path, bytes)
        .await
        .map_err(|e| WhatsAppError::AuthState(format!("{}: {}", path.display(), e)))
}

/// `<type>-<id>.json` with `/` -> `__` and `:` -> `-` (lossy)
fn key_file_name(key_type: &str, id: &str) -> String {
    format!("{}-{}.json", key_type, id)
        .replace('/', "__")
        .replace(':', "-")
}

fn parse_key_file_name(name: &str) -> Option<(&'static str, String)> {
    let stem = name.strip_suffix(".json")?;
    KEY_TYPES.iter().find_map(|key_type| {
        stem.strip_prefix(key_type)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|id| !id.is_empty())
            .map(|id| (*key_type, id.replace("__", "/")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_key_file_names() {
        assert_eq!(key_file_name("pre-key", "12"), "pre-key-12.json");
        assert_eq!(
            key_file_name("session", "1234:5@s.whatsapp.net"),
            "session-1234-5@s.whatsapp.net.json"
        );
        assert_eq!(key_file_name("sender-key", "a/b"), "sender-key-a__b.json");

        assert_eq!(
            parse_key_file_name("pre-key-12.json"),
            Some(("pre-key", "12".to_string()))
        );
        assert_eq!(
            parse_key_file_name("sender-key-memory-group@g.us.json"),
            Some(("sender-key-memory", "group@g.us".to_string()))
        );
        assert_eq!(
            parse_key_file_name("app-state-sync-key-AAAA.json"),
            Some(("app-state-sync-key", "AAAA".to_string()))
        );
        assert_eq!(parse_key_file_name("notes.txt"), None);
        assert_eq!(parse_key_file_name("pre-key-.json"), None);
    }

    #[tokio::test]
    async fn test_load_creates_directory() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));

        let state = store.load().await.unwrap();
        assert!(state.creds.is_none());
        assert!(state.keys.is_empty());
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));

        let mut update = CredentialUpdate {
            creds: Some(json!({"registered": true, "me": {"id": "1234:1@s.whatsapp.net"}})),
            ..Default::default()
        };
        update.keys.insert(
            "pre-key".to_string(),
            HashMap::from([
                ("1".to_string(), Some(json!({"public": "a"}))),
                ("2".to_string(), Some(json!({"public": "b"}))),
            ]),
        );
        store.save(&update).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.creds.unwrap()["registered"], json!(true));
        assert_eq!(state.keys["pre-key"].len(), 2);
        assert_eq!(state.keys["pre-key"]["2"], json!({"public": "b"}));
    }

    #[tokio::test]
    async fn test_save_removes_deleted_keys() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));

        let mut update = CredentialUpdate::default();
        update.keys.insert(
            "pre-key".to_string(),
            HashMap::from([("7".to_string(), Some(json!({"public": "x"})))]),
        );
        store.save(&update).await.unwrap();

        let mut removal = CredentialUpdate::default();
        removal.keys.insert(
            "pre-key".to_string(),
            HashMap::from([
                ("7".to_string(), None),
                ("8".to_string(), None),
            ]),
        );
        store.save(&removal).await.unwrap();

        let state = store.load().await.unwrap();
        assert!(state.keys.get("pre-key").is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));
        store.load().await.unwrap();

        assert!(store.delete().await.unwrap());
        assert!(!store.dir().exists());
        assert!(!store.delete().await.unwrap());
    }

    #[tokio::test]
    async fn test_key_ids_survive_reload() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));

        let sender_key = "120363@g.us::1234567890::0";
        let session = "1234567890:12@s.whatsapp.net";
        let sync_key = "AAAA/bb+c=";

        let mut update = CredentialUpdate::default();
        update.keys.insert(
            "sender-key".to_string(),
            HashMap::from([(sender_key.to_string(), Some(json!({"chain": 1})))]),
        );
        update.keys.insert(
            "session".to_string(),
            HashMap::from([(session.to_string(), Some(json!("opaque")))]),
        );
        update.keys.insert(
            "app-state-sync-key".to_string(),
            HashMap::from([(sync_key.to_string(), Some(json!({"keyData": "x"})))]),
        );
        store.save(&update).await.unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.keys["sender-key"][sender_key], json!({"chain": 1}));
        assert_eq!(state.keys["session"][session], json!("opaque"));
        assert_eq!(state.keys["app-state-sync-key"][sync_key], json!({"keyData": "x"}));

        // removal finds the same file again
        let mut removal = CredentialUpdate::default();
        removal.keys.insert(
            "sender-key".to_string(),
            HashMap::from([(sender_key.to_string(), None)]),
        );
        store.save(&removal).await.unwrap();
        let state = store.load().await.unwrap();
        assert!(state.keys.get("sender-key").is_none());
    }

    #[tokio::test]
    async fn test_loads_bare_key_files() {
        let temp = TempDir::new().unwrap();
        let store = AuthStore::new(temp.path().join("auth_info"));
        store.load().await.unwrap();
        fs::write(store.dir().join("pre-key-5.json"), br#"{"public":"p"}"#)
            .await
            .unwrap();

        let state = store.load().await.unwrap();
        assert_eq!(state.keys["pre-key"]["5"], json!({"public": "p"}));
    }
}
