//! Two-layer resolution cache mapping track identities to media IDs.
//!
//! The bundled layer is a read-only snapshot loaded once at session start; the
//! local layer is durable across sessions and shadows the bundled layer on key
//! collisions. Snapshots are flat JSON objects of identity → media ID.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::{error, info, warn};

use crate::error::AppError;

pub struct ResolutionCache {
    bundled: HashMap<String, String>,
    local: HashMap<String, String>,
    local_path: PathBuf,
}

impl ResolutionCache {
    /// Loads both layers. A missing or unreadable bundled snapshot yields an
    /// empty bundled layer; a malformed local snapshot is treated as empty
    /// with a warning. Neither is fatal.
    pub fn load(bundled_path: Option<&Path>, local_path: PathBuf) -> Self {
        let bundled = bundled_path
            .map(|path| read_snapshot_file(path, "bundled"))
            .unwrap_or_default();
        let local = read_snapshot_file(&local_path, "local");
        if !bundled.is_empty() || !local.is_empty() {
            info!(
                "Resolution cache loaded: {} bundled, {} local entries",
                bundled.len(),
                local.len()
            );
        }
        Self {
            bundled,
            local,
            local_path,
        }
    }

    /// Creates an empty cache that will persist its local layer to
    /// `local_path` once entries are stored.
    pub fn empty(local_path: PathBuf) -> Self {
        Self {
            bundled: HashMap::new(),
            local: HashMap::new(),
            local_path,
        }
    }

    /// Looks up a previously resolved media ID. Local entries shadow bundled
    /// entries sharing a key.
    pub fn resolve(&self, identity: &str) -> Option<&str> {
        self.local
            .get(identity)
            .or_else(|| self.bundled.get(identity))
            .map(String::as_str)
    }

    /// Records a resolution in the local layer and persists it.
    pub fn store(&mut self, identity: &str, media_id: &str) {
        self.local
            .insert(identity.to_string(), media_id.to_string());
        self.persist_local();
    }

    /// Merges a snapshot into the local layer, overwriting on key collision.
    /// A snapshot that is not a flat string→string object is rejected and the
    /// local layer is left untouched. Returns the number of imported entries.
    pub fn import(&mut self, snapshot: &str) -> Result<usize, AppError> {
        let imported: HashMap<String, String> = serde_json::from_str(snapshot)
            .map_err(|err| AppError::Parse(format!("invalid cache snapshot: {err}")))?;
        let count = imported.len();
        self.local.extend(imported);
        self.persist_local();
        Ok(count)
    }

    /// The full merged view, local entries winning on collision. Sorted for
    /// stable snapshot output.
    pub fn merged(&self) -> BTreeMap<String, String> {
        let mut view: BTreeMap<String, String> = self
            .bundled
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, value) in &self.local {
            view.insert(key.clone(), value.clone());
        }
        view
    }

    /// Writes the full merged view to a snapshot file. Returns the number of
    /// exported entries.
    pub fn export_to(&self, path: &Path) -> Result<usize, AppError> {
        let view = self.merged();
        let text = serde_json::to_string_pretty(&view)
            .map_err(|err| AppError::Parse(format!("failed to serialize cache: {err}")))?;
        fs::write(path, text)?;
        Ok(view.len())
    }

    fn persist_local(&self) {
        if let Some(parent) = self.local_path.parent() {
            if let Err(err) = fs::create_dir_all(parent) {
                error!("Could not create cache directory {}: {}", parent.display(), err);
                return;
            }
        }
        let text = match serde_json::to_string(&self.local) {
            Ok(text) => text,
            Err(err) => {
                error!("Failed to serialize local cache: {}", err);
                return;
            }
        };
        if let Err(err) = fs::write(&self.local_path, text) {
            error!(
                "Failed to persist local cache to {}: {}",
                self.local_path.display(),
                err
            );
        }
    }
}

fn read_snapshot_file(path: &Path, layer: &str) -> HashMap<String, String> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => return HashMap::new(),
    };
    match serde_json::from_str(&text) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                "Ignoring malformed {} cache snapshot {}: {}",
                layer,
                path.display(),
                err
            );
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ResolutionCache;
    use crate::error::AppError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

    fn temp_local_path() -> PathBuf {
        let unique = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!(
            "shufflefm-cache-test-{}-{}.json",
            std::process::id(),
            unique
        ))
    }

    fn cache_with(bundled: &[(&str, &str)], local: &[(&str, &str)]) -> ResolutionCache {
        let mut cache = ResolutionCache::empty(temp_local_path());
        for (key, value) in bundled {
            cache.bundled.insert(key.to_string(), value.to_string());
        }
        for (key, value) in local {
            cache.store(key, value);
        }
        cache
    }

    #[test]
    fn test_resolve_prefers_local_over_bundled() {
        let cache = cache_with(&[("X - Y", "bundled-id")], &[("X - Y", "local-id")]);

        assert_eq!(cache.resolve("X - Y"), Some("local-id"));
    }

    #[test]
    fn test_resolve_falls_back_to_bundled() {
        let cache = cache_with(&[("X - Y", "vid123")], &[]);

        assert_eq!(cache.resolve("X - Y"), Some("vid123"));
        assert_eq!(cache.resolve("A - B"), None);
    }

    #[test]
    fn test_import_merge_is_idempotent() {
        let mut cache = cache_with(&[("X - Y", "bundled-id")], &[]);
        let snapshot = r#"{"X - Y": "imported-id", "A - B": "other-id"}"#;

        let first = cache.import(snapshot).unwrap();
        let view_after_first = cache.merged();
        let second = cache.import(snapshot).unwrap();

        assert_eq!(first, 2);
        assert_eq!(second, 2);
        assert_eq!(cache.merged(), view_after_first);
        assert_eq!(cache.resolve("X - Y"), Some("imported-id"));
        assert_eq!(cache.resolve("A - B"), Some("other-id"));
    }

    #[test]
    fn test_import_rejects_non_object_snapshot() {
        let mut cache = cache_with(&[], &[("X - Y", "vid123")]);

        let result = cache.import(r#"["not", "a", "map"]"#);

        assert!(matches!(result, Err(AppError::Parse(_))));
        assert_eq!(cache.resolve("X - Y"), Some("vid123"));
    }

    #[test]
    fn test_export_emits_full_merged_view() {
        let cache = cache_with(&[("B - b", "2"), ("A - a", "1")], &[("B - b", "9")]);
        let path = temp_local_path();

        let count = cache.export_to(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(count, 2);
        let parsed: std::collections::BTreeMap<String, String> =
            serde_json::from_str(&text).unwrap();
        assert_eq!(parsed.get("A - a").map(String::as_str), Some("1"));
        assert_eq!(parsed.get("B - b").map(String::as_str), Some("9"));
    }

    #[test]
    fn test_store_survives_reload() {
        let path = temp_local_path();
        {
            let mut cache = ResolutionCache::empty(path.clone());
            cache.store("X - Y", "vid123");
        }
        let reloaded = ResolutionCache::load(None, path.clone());
        let _ = std::fs::remove_file(&path);

        assert_eq!(reloaded.resolve("X - Y"), Some("vid123"));
    }
}
