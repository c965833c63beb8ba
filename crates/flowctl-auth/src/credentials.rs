//! Credential storage for the CLI's OAuth session
//!
//! A single JSON file under the user's home directory holds the one
//! credential record this installation knows about. Writes take an exclusive
//! lock on a sibling `.lock` file and go through temp-file + rename, so
//! concurrent CLI invocations never observe a torn file. Reads are lock-free
//! because rename replaces the file atomically.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{CONFIG_DIR_NAME, REFRESH_SKEW_MILLIS, TOKEN_FILE_NAME};
use crate::error::{Error, Result};
use crate::token::TokenResponse;

/// The persisted OAuth session.
///
/// Field names are the on-disk format and must stay stable across releases.
/// `expires_at` is a unix timestamp in milliseconds computed locally from the
/// server's `expires_in` delta, never taken from the server as an absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: u64,
    pub client_id: String,
    /// Canonical service root (no trailing slash) this session belongs to
    pub base_url: String,
    /// Cached so refresh never has to re-run discovery
    pub token_endpoint: String,
}

impl CredentialRecord {
    /// Build a fresh record from a successful authorization code exchange.
    pub fn issue(
        response: TokenResponse,
        client_id: String,
        base_url: String,
        token_endpoint: String,
        now_millis: u64,
    ) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: expiry_from(now_millis, response.expires_in),
            client_id,
            base_url,
            token_endpoint,
        }
    }

    /// Apply a refresh response.
    ///
    /// Only `access_token` and `expires_at` always change. The refresh token
    /// is replaced when the server rotated it and kept otherwise.
    pub fn refreshed(self, response: TokenResponse, now_millis: u64) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(self.refresh_token),
            expires_at: expiry_from(now_millis, response.expires_in),
            ..self
        }
    }

    /// Whether the access token is expired or inside the refresh skew window.
    pub fn needs_refresh(&self, now_millis: u64) -> bool {
        now_millis > self.expires_at.saturating_sub(REFRESH_SKEW_MILLIS)
    }

    /// Milliseconds until the access token expires, zero if already expired.
    pub fn remaining_millis(&self, now_millis: u64) -> u64 {
        self.expires_at.saturating_sub(now_millis)
    }
}

fn expiry_from(now_millis: u64, expires_in_secs: u64) -> u64 {
    now_millis.saturating_add(expires_in_secs.saturating_mul(1000))
}

/// Current wall-clock time as unix milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// File-backed store for the single credential record.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Store backed by an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store at the fixed per-user location (`~/.spaceflows/cli-token.json`).
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    /// The fixed per-user credential path.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::Io("unable to determine home directory".into()))?;
        Ok(home.join(CONFIG_DIR_NAME).join(TOKEN_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the stored record.
    ///
    /// Absence is the normal unauthenticated state and returns `Ok(None)`.
    /// A file that exists but does not parse is reported, not ignored.
    pub async fn read(&self) -> Result<Option<CredentialRecord>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored credential");
                return Ok(None);
            }
            Err(e) => return Err(Error::Io(format!("reading credential file: {e}"))),
        };

        let record = serde_json::from_str(&contents)
            .map_err(|e| Error::CredentialParse(format!("parsing credential file: {e}")))?;
        Ok(Some(record))
    }

    /// Persist `record`, replacing whatever was stored before.
    pub async fn write(&self, record: &CredentialRecord) -> Result<()> {
        let dir = self.parent_dir()?;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::Io(format!("creating credential directory: {e}")))?;

        let _lock = StoreLock::acquire(self.lock_path()).await?;
        write_atomic(&self.path, record).await?;
        info!(path = %self.path.display(), base_url = %record.base_url, "stored credential");
        Ok(())
    }

    /// Remove the stored record.
    ///
    /// Returns `Ok(false)` when there was nothing to remove. Any other I/O
    /// failure propagates.
    pub async fn delete(&self) -> Result<bool> {
        let _lock = match tokio::fs::metadata(self.parent_dir()?).await {
            Ok(_) => StoreLock::acquire(self.lock_path()).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(Error::Io(format!("reading credential directory: {e}"))),
        };

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "removed credential");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(format!("removing credential file: {e}"))),
        }
    }

    fn parent_dir(&self) -> Result<&Path> {
        self.path
            .parent()
            .ok_or_else(|| Error::Io("credential path has no parent directory".into()))
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }
}

/// Exclusive advisory lock on the store's lock file, released on drop.
struct StoreLock {
    _file: std::fs::File,
}

impl StoreLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        tokio::task::spawn_blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&path)
                .map_err(|e| Error::Io(format!("opening credential lock file: {e}")))?;
            FileExt::lock_exclusive(&file)
                .map_err(|e| Error::Io(format!("locking credential file: {e}")))?;
            Ok(Self { _file: file })
        })
        .await
        .map_err(|e| Error::Io(format!("credential lock task failed: {e}")))?
    }
}

/// Write the record to a temp file in the same directory, then rename it over
/// the target. Sets 0600 permissions since the file holds bearer tokens.
async fn write_atomic(path: &Path, record: &CredentialRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::CredentialParse(format!("serializing credential: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("credential path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".{TOKEN_FILE_NAME}.tmp.{}", std::process::id()));

    if let Err(e) = persist_via(&tmp_path, path, json.as_bytes()).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }

    debug!(path = %path.display(), "persisted credential");
    Ok(())
}

async fn persist_via(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    tokio::fs::write(tmp_path, contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp credential file: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(suffix: &str) -> CredentialRecord {
        CredentialRecord {
            access_token: format!("at_{suffix}"),
            refresh_token: Some(format!("rt_{suffix}")),
            expires_at: 1_735_500_000_000,
            client_id: "abc123".into(),
            base_url: "https://api.example.com".into(),
            token_endpoint: "https://auth.example.com/token".into(),
        }
    }

    fn response(access: &str, refresh: Option<&str>, expires_in: u64) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(Into::into),
            expires_in,
        }
    }

    #[tokio::test]
    async fn roundtrip_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));

        store.write(&test_record("1")).await.unwrap();

        let loaded = TokenStore::new(store.path().to_path_buf())
            .read()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, test_record("1"));
    }

    #[tokio::test]
    async fn read_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("missing").join("cli-token.json"));
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn read_corrupt_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli-token.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let err = TokenStore::new(path).read().await.unwrap_err();
        assert!(matches!(err, Error::CredentialParse(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn write_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".spaceflows").join("cli-token.json");
        let store = TokenStore::new(path.clone());

        store.write(&test_record("1")).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn write_overwrites_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));

        store.write(&test_record("old")).await.unwrap();
        let mut newer = test_record("new");
        newer.base_url = "https://other.example.com".into();
        store.write(&newer).await.unwrap();

        assert_eq!(store.read().await.unwrap().unwrap(), newer);
    }

    #[tokio::test]
    async fn write_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));
        store.write(&test_record("1")).await.unwrap();

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            let name = entry.file_name().to_string_lossy().into_owned();
            assert!(!name.contains(".tmp."), "leftover temp file: {name}");
        }
    }

    #[tokio::test]
    async fn failed_rename_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join(TOKEN_FILE_NAME);
        // A non-empty directory at the target makes the rename fail
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), "x").unwrap();

        let err = write_atomic(&target, &test_record("a")).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_refresh_token_is_omitted_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));
        let mut record = test_record("1");
        record.refresh_token = None;
        store.write(&record).await.unwrap();

        let raw = tokio::fs::read_to_string(store.path()).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(json.get("refresh_token").is_none());
        assert_eq!(json["client_id"], "abc123");
        assert_eq!(json["token_endpoint"], "https://auth.example.com/token");
    }

    #[tokio::test]
    async fn delete_reports_nothing_to_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));
        assert!(!store.delete().await.unwrap());

        let nested = TokenStore::new(dir.path().join("never-created").join("cli-token.json"));
        assert!(!nested.delete().await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));
        store.write(&test_record("1")).await.unwrap();

        assert!(store.delete().await.unwrap());
        assert!(store.read().await.unwrap().is_none());
        assert!(!store.delete().await.unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));
        store.write(&test_record("1")).await.unwrap();

        let metadata = tokio::fs::metadata(store.path()).await.unwrap();
        let mode = metadata.permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "credential file must be 0600, got {mode:o}");
    }

    #[tokio::test]
    async fn concurrent_writes_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("cli-token.json"));

        let mut handles = vec![];
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.write(&test_record(&i.to_string())).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Last writer wins, but the file is always one complete record
        let record = store.read().await.unwrap().unwrap();
        assert!(record.access_token.starts_with("at_"));
        assert_eq!(record.client_id, "abc123");
    }

    #[test]
    fn issue_computes_expiry_from_ttl() {
        let now = 1_700_000_000_000;
        let record = CredentialRecord::issue(
            response("at", Some("rt"), 3600),
            "abc123".into(),
            "https://api.example.com".into(),
            "https://auth.example.com/token".into(),
            now,
        );
        assert_eq!(record.expires_at, now + 3_600_000);
        assert_eq!(record.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn refresh_keeps_identity_fields() {
        let now = 1_700_000_000_000;
        let old = test_record("1");
        let new = old.clone().refreshed(response("at_new", None, 600), now);

        assert_eq!(new.access_token, "at_new");
        assert_eq!(new.expires_at, now + 600_000);
        assert_eq!(new.refresh_token, old.refresh_token, "refresh token retained");
        assert_eq!(new.client_id, old.client_id);
        assert_eq!(new.base_url, old.base_url);
        assert_eq!(new.token_endpoint, old.token_endpoint);
    }

    #[test]
    fn refresh_replaces_rotated_refresh_token() {
        let new = test_record("1").refreshed(response("at_new", Some("rt_new"), 600), 0);
        assert_eq!(new.refresh_token.as_deref(), Some("rt_new"));
    }

    #[test]
    fn skew_window_triggers_refresh() {
        let now = 1_700_000_000_000;
        let mut record = test_record("1");

        record.expires_at = now + 30_000;
        assert!(record.needs_refresh(now), "30s left is inside the 60s skew");

        record.expires_at = now + 600_000;
        assert!(!record.needs_refresh(now), "10 minutes left needs no refresh");

        record.expires_at = now - 1;
        assert!(record.needs_refresh(now));
        assert_eq!(record.remaining_millis(now), 0);
    }
}
