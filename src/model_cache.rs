use std::path::PathBuf;

/// Narrow interface over the local model artifact store
///
/// Service adapters use this for pre-flight checks so a missing model fails
/// fast instead of costing a daemon round trip.
#[cfg_attr(test, mockall::automock)]
pub trait ModelStore: Send + Sync {
    /// Whether the given HuggingFace repo has a local snapshot on disk.
    fn contains(&self, repo: &str) -> bool;
}

/// Probe over the HuggingFace hub cache layout
///
/// Repos are cached under `models--{org}--{name}/snapshots/<revision>`;
/// a repo counts as present when at least one snapshot directory exists.
pub struct HubCache {
    root: PathBuf,
}

impl HubCache {
    /// Create a probe rooted at the given hub cache directory.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl ModelStore for HubCache {
    fn contains(&self, repo: &str) -> bool {
        let snapshots = self.root.join(cache_dir_name(repo)).join("snapshots");
        let Ok(entries) = std::fs::read_dir(&snapshots) else {
            return false;
        };
        entries
            .filter_map(std::result::Result::ok)
            .any(|entry| entry.path().is_dir())
    }
}

fn cache_dir_name(repo: &str) -> String {
    format!("models--{}", repo.replace('/', "--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cache_dir_name() {
        assert_eq!(
            cache_dir_name("mlx-community/parakeet-tdt-0.6b-v3"),
            "models--mlx-community--parakeet-tdt-0.6b-v3"
        );
    }

    #[test]
    fn test_contains_false_for_missing_repo() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HubCache::new(dir.path().to_path_buf());
        assert!(!cache.contains("mlx-community/some-model"));
    }

    #[test]
    fn test_contains_false_without_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("models--org--model")).unwrap();

        let cache = HubCache::new(dir.path().to_path_buf());
        assert!(!cache.contains("org/model"));
    }

    #[test]
    fn test_contains_true_with_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(
            dir.path()
                .join("models--org--model")
                .join("snapshots")
                .join("abc123"),
        )
        .unwrap();

        let cache = HubCache::new(dir.path().to_path_buf());
        assert!(cache.contains("org/model"));
    }

    #[test]
    fn test_contains_ignores_stray_files() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir.path().join("models--org--model").join("snapshots");
        fs::create_dir_all(&snapshots).unwrap();
        fs::write(snapshots.join("incomplete.lock"), "").unwrap();

        let cache = HubCache::new(dir.path().to_path_buf());
        assert!(!cache.contains("org/model"));
    }
}
