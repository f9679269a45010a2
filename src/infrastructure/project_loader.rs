use crate::ports::{SourceDiscovery, SourceFile};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::warn;

/// Discovers `.rs` source files under a root directory (or a single file).
pub struct FsDiscovery {
    root: PathBuf,
    package: String,
}

impl FsDiscovery {
    /// `package` prefixes every import path; defaults to the root's name.
    pub fn new(root: impl Into<PathBuf>, package: Option<String>) -> Self {
        let root = root.into();
        let package = package.unwrap_or_else(|| Self::default_package(&root));
        Self { root, package }
    }

    fn default_package(root: &Path) -> String {
        let named = if root.is_file() { root.file_stem() } else { root.file_name() };
        named
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "crate".to_string())
    }

    /// Dotted import path for `path` relative to the root.
    pub fn import_path(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let mut segments = vec![self.package.clone()];
        if let Some(parent) = relative.parent() {
            segments.extend(
                parent
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .filter(|s| !s.is_empty() && s != "."),
            );
        }
        if let Some(stem) = relative.file_stem() {
            segments.push(stem.to_string_lossy().to_string());
        }
        segments.join(".")
    }

    fn collect_rs_recursive(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        if dir.ends_with("target") || dir.ends_with(".git") {
            return Ok(());
        }

        let mut entries: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory {}", dir.display()))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!("skipping unreadable entry in {}: {}", dir.display(), e);
                    None
                }
            })
            .collect();
        entries.sort();

        for path in entries {
            if path.is_dir() {
                if let Err(e) = Self::collect_rs_recursive(&path, out) {
                    warn!("{:#}", e);
                }
            } else if path.extension().is_some_and(|ext| ext == "rs") {
                out.push(path);
            }
        }
        Ok(())
    }

    fn mod_time(path: &Path) -> u64 {
        fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

impl SourceDiscovery for FsDiscovery {
    fn discover(&self) -> Result<Vec<SourceFile>> {
        if !self.root.exists() {
            anyhow::bail!("Source path not found: {}", self.root.display());
        }

        let mut paths = Vec::new();
        if self.root.is_file() {
            paths.push(self.root.clone());
        } else {
            Self::collect_rs_recursive(&self.root, &mut paths)?;
        }

        let mut seen: HashMap<String, PathBuf> = HashMap::new();
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let import_path = if self.root.is_file() {
                self.package.clone()
            } else {
                self.import_path(&path)
            };
            if let Some(first) = seen.get(&import_path) {
                warn!(
                    "skipping {}: import path {} already taken by {}",
                    path.display(),
                    import_path,
                    first.display()
                );
                continue;
            }
            seen.insert(import_path.clone(), path.clone());
            sources.push(SourceFile {
                full_path: path.display().to_string(),
                import_path,
                mod_time: Self::mod_time(&path),
            });
        }
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_import_paths_are_dotted_and_sorted() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("shapes");
        fs::create_dir_all(root.join("geometry")).unwrap();
        fs::create_dir_all(root.join("target")).unwrap();
        fs::write(root.join("lib.rs"), "fn a() {}").unwrap();
        fs::write(root.join("geometry/circle.rs"), "fn b() {}").unwrap();
        fs::write(root.join("notes.txt"), "skip me").unwrap();
        fs::write(root.join("target/generated.rs"), "fn c() {}").unwrap();

        let files = FsDiscovery::new(&root, None).discover().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.import_path.as_str()).collect();
        assert_eq!(paths, vec!["shapes.geometry.circle", "shapes.lib"]);
        assert!(files.iter().all(|f| f.mod_time > 0));
    }

    #[test]
    fn test_colliding_import_paths_keep_first_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("pkg");
        fs::create_dir_all(root.join("a")).unwrap();
        fs::write(root.join("a.b.rs"), "fn dotted() {}").unwrap();
        fs::write(root.join("a/b.rs"), "fn nested() {}").unwrap();

        let files = FsDiscovery::new(&root, None).discover().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].import_path, "pkg.a.b");
        // `a/` sorts before `a.b.rs`
        assert!(files[0].full_path.ends_with("b.rs") && !files[0].full_path.ends_with("a.b.rs"));
    }

    #[test]
    fn test_package_override() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();

        let files = FsDiscovery::new(dir.path(), Some("app".to_string())).discover().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].import_path, "app.main");
    }

    #[test]
    fn test_single_file_root() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("tool.rs");
        fs::write(&file, "fn run() {}").unwrap();

        let files = FsDiscovery::new(&file, None).discover().unwrap();
        assert_eq!(files[0].import_path, "tool");
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(FsDiscovery::new(dir.path().join("nope"), None).discover().is_err());
    }
}
