use std::fs;
use std::path::{Path, PathBuf};

use notify::{EventKind, RecursiveMode, Watcher};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{AccountId, Listener, RemoteError, RemoteEvent, RemoteStore, Subscription};

/// Keeps one JSON document per account in a directory and watches it for
/// changes made by other processes.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, RemoteError> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding the account's document. The name is the hex encoding
    /// of the account id, so distinct ids never share a file, even on
    /// case-insensitive filesystems.
    pub fn document_path(&self, account: &AccountId) -> PathBuf {
        self.root.join(format!("{}.json", hex::encode(account.as_str())))
    }
}

fn read_document(path: &Path) -> Result<Option<Value>, RemoteError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&raw)?))
}

impl RemoteStore for FileStore {
    fn read(&self, account: &AccountId) -> Result<Option<Value>, RemoteError> {
        read_document(&self.document_path(account))
    }

    fn write(&self, account: &AccountId, document: &Value) -> Result<(), RemoteError> {
        let path = self.document_path(account);
        let staging = path.with_extension("json.tmp");
        let raw = serde_json::to_string_pretty(document)?;
        fs::write(&staging, raw)?;
        fs::rename(&staging, &path)?;
        debug!(path = %path.display(), "wrote habit document");
        Ok(())
    }

    fn subscribe(
        &self,
        account: &AccountId,
        listener: Listener,
    ) -> Result<Subscription, RemoteError> {
        let path = self.document_path(account);
        let target = path.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    let relevant = matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
                        && event.paths.iter().any(|changed| changed == &target);
                    if !relevant {
                        return;
                    }
                    match read_document(&target) {
                        Ok(Some(document)) => listener(RemoteEvent::Changed(document)),
                        Ok(None) => {}
                        Err(err) => listener(RemoteEvent::Failed(err.to_string())),
                    }
                }
                Err(err) => {
                    warn!(%err, "habit document watch failed");
                    listener(RemoteEvent::Failed(err.to_string()));
                }
            }
        })?;
        watcher.watch(&self.root, RecursiveMode::NonRecursive)?;
        debug!(path = %path.display(), "watching habit document");
        Ok(Subscription::new(move || drop(watcher)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn missing_document_reads_as_none() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let account = AccountId::new("alice").expect("account");
        assert!(store.read(&account).expect("read").is_none());
    }

    #[test]
    fn write_then_read_returns_document() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path().join("habits")).expect("open store");
        let account = AccountId::new("user@example.com").expect("account");
        let document = json!({ "templates": [], "snapshots": {} });
        store.write(&account, &document).expect("write");

        assert_eq!(
            store.document_path(&account).file_name().and_then(|n| n.to_str()),
            Some("75736572406578616d706c652e636f6d.json")
        );
        assert_eq!(store.read(&account).expect("read"), Some(document));
    }

    #[test]
    fn corrupt_document_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let store = FileStore::open(temp.path()).expect("open store");
        let account = AccountId::new("alice").expect("account");
        fs::write(store.document_path(&account), "{ not json").expect("write fixture");
        assert!(matches!(store.read(&account), Err(RemoteError::Encode(_))));
    }
}
