//! Best-effort archive of device payloads that could not be processed.
//!
//! Files land in `{root}/{topic}/{timestamp}_{id}.json` so firmware problems
//! can be inspected later. Each topic directory keeps at most `max_files`
//! entries; the oldest are pruned after every write. Failures are logged and
//! swallowed.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};

pub const DEFAULT_MAX_FILES: usize = 1000;

#[derive(Debug, Clone)]
pub struct PayloadArchive {
    root: PathBuf,
    max_files: usize,
}

impl PayloadArchive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), max_files: DEFAULT_MAX_FILES }
    }

    pub fn with_max_files(mut self, max_files: usize) -> Self {
        self.max_files = max_files.max(1);
        self
    }

    /// Store `bytes` received on `topic`. Returns the written path, if any.
    pub async fn save(&self, topic: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.root.join(topic_dir(topic));
        let ts = chrono::Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let path = dir.join(format!("{ts}_{}.json", uuid::Uuid::new_v4().simple()));

        if let Err(e) = fs::create_dir_all(&dir).await {
            warn!(path = %path.display(), error = %e, "payload_archive: failed to create directory");
            return None;
        }

        // Pretty-print valid JSON; anything else is kept byte for byte.
        let content = serde_json::from_slice::<serde_json::Value>(bytes)
            .ok()
            .and_then(|v| serde_json::to_vec_pretty(&v).ok())
            .unwrap_or_else(|| bytes.to_vec());

        match fs::write(&path, &content).await {
            Ok(()) => {
                debug!(path = %path.display(), bytes = content.len(), "payload_archive: saved");
                self.prune(&dir).await;
                Some(path)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "payload_archive: failed to write payload");
                None
            }
        }
    }

    /// Delete the oldest files in `dir` beyond `max_files`. File names start
    /// with the save time, so name order is age order.
    async fn prune(&self, dir: &Path) {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "payload_archive: failed to list directory");
                return;
            }
        };

        let mut files = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        files.push(path);
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "payload_archive: failed to list directory");
                    return;
                }
            }
        }

        if files.len() <= self.max_files {
            return;
        }
        files.sort();
        let excess = files.len() - self.max_files;
        for old in &files[..excess] {
            if let Err(e) = fs::remove_file(old).await {
                warn!(path = %old.display(), error = %e, "payload_archive: failed to prune");
            }
        }
        debug!(dir = %dir.display(), removed = excess, "payload_archive: pruned");
    }
}

/// Topic levels become nested directories; anything that could escape the
/// archive root is replaced.
fn topic_dir(topic: &str) -> PathBuf {
    let mut dir = PathBuf::new();
    for level in topic.split('/') {
        let clean: String = level
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        if !clean.is_empty() && clean.chars().any(|c| c != '_') {
            dir.push(clean);
        }
    }
    if dir.as_os_str().is_empty() {
        dir.push("unknown");
    }
    dir
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("payload-archive-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn topic_levels_become_directories() {
        assert_eq!(topic_dir("esp32/sensors"), PathBuf::from("esp32").join("sensors"));
    }

    #[test]
    fn traversal_is_neutralized() {
        assert_eq!(topic_dir("../../etc"), PathBuf::from("etc"));
        assert_eq!(topic_dir(""), PathBuf::from("unknown"));
        assert_eq!(topic_dir("a/+/#"), PathBuf::from("a"));
    }

    #[tokio::test]
    async fn saves_pretty_json_under_topic() {
        let root = temp_root();
        let archive = PayloadArchive::new(&root);

        let path = archive.save("esp32/sensors", br#"{"gas":"lots"}"#).await.unwrap();
        assert!(path.starts_with(root.join("esp32").join("sensors")));

        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(written.contains("\n"));
        assert!(written.contains("\"gas\": \"lots\""));

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn oldest_files_are_pruned_past_the_cap() {
        let root = temp_root();
        let archive = PayloadArchive::new(&root).with_max_files(2);

        for i in 0..3 {
            archive.save("esp32/sensors", format!("bad {i}").as_bytes()).await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let dir = root.join("esp32").join("sensors");
        let mut entries = tokio::fs::read_dir(&dir).await.unwrap();
        let mut kept = Vec::new();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            kept.push(tokio::fs::read(entry.path()).await.unwrap());
        }
        kept.sort();
        assert_eq!(kept, vec![b"bad 1".to_vec(), b"bad 2".to_vec()]);

        let _ = tokio::fs::remove_dir_all(&root).await;
    }

    #[tokio::test]
    async fn keeps_non_json_bytes_verbatim() {
        let root = temp_root();
        let archive = PayloadArchive::new(&root);

        let path = archive.save("esp32/sensors", b"gas=610").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"gas=610");

        let _ = tokio::fs::remove_dir_all(&root).await;
    }
}
