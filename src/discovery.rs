//! Stage A: walk the source root, apply extension/ignore filters, emit
//! canonical relative paths.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// A file found under the source root, in both canonical (relative,
/// forward-slash) and absolute form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub canonical: String,
    pub absolute: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub extensions: HashSet<String>,
    pub ignored_dirs: HashSet<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            extensions: [".c", ".h"].iter().map(|s| s.to_string()).collect(),
            ignored_dirs: [
                ".git",
                "__pycache__",
                "out",
                "build",
                "dist",
                "node_modules",
                ".venv",
                "venv",
                ".pytest_cache",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl DiscoveryConfig {
    pub fn with_extensions(extensions: HashSet<String>) -> Self {
        Self {
            extensions,
            ..Default::default()
        }
    }

    fn is_ignored_dir(&self, name: &str) -> bool {
        self.ignored_dirs.contains(name)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.extensions
            .iter()
            .any(|ext| name.ends_with(ext.as_str()))
    }
}

/// Walk `source_root`, pruning any directory whose name is ignored, and
/// return the sorted list of matching files in both canonical and
/// absolute form. The same filter (this function) must be used by every
/// downstream stage that emits a path list to the cross-reference
/// scanner, so the two symbol universes agree on what "the tree" is.
pub fn discover(source_root: &Path, cfg: &DiscoveryConfig) -> std::io::Result<Vec<DiscoveredFile>> {
    let source_root = source_root.canonicalize()?;
    let mut out = Vec::new();

    let walker = WalkDir::new(&source_root).into_iter().filter_entry(|entry| {
        if entry.depth() == 0 {
            return true;
        }
        let name = entry.file_name().to_str().unwrap_or("");
        !(entry.file_type().is_dir() && cfg.is_ignored_dir(name))
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !cfg.matches_extension(path) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(&source_root) else {
            continue;
        };
        let canonical = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push(DiscoveredFile {
            canonical,
            absolute: path.to_path_buf(),
        });
    }

    out.sort_by(|a, b| a.canonical.cmp(&b.canonical));
    Ok(out)
}
