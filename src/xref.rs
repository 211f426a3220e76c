//! Stage D: build the cross-reference scanner's database over the same
//! file universe Stage A discovered, so Stage E's queries see a consistent
//! path space. Scanner failure is logged and degrades the run to symbols-
//! only; it is never fatal (spec §4.D).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

pub struct XrefBuilder {
    bin: String,
}

impl Default for XrefBuilder {
    fn default() -> Self {
        Self {
            bin: "cscope".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct XrefDb {
    pub out_file: PathBuf,
    pub files_manifest: PathBuf,
}

impl XrefBuilder {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Write `cscope.files` and invoke the scanner with `cwd = source_root`
    /// so its own relative paths match ours. `out_dir` is resolved to an
    /// absolute path first — the child's cwd is `source_root`, not ours, so
    /// a relative manifest/output path would resolve against the wrong
    /// directory on either side. Returns `None` (logged at `warn`) on any
    /// failure to build — the caller should treat that as "skip Stages E/F
    /// for this run", not abort.
    pub fn build(
        &self,
        source_root: &Path,
        out_dir: &Path,
        canonical_paths: &[String],
    ) -> Option<XrefDb> {
        let out_dir = absolutize(out_dir);

        if let Err(e) = fs::create_dir_all(&out_dir) {
            log::warn!("failed to create cscope output dir {}: {e}", out_dir.display());
            return None;
        }

        let files_manifest = out_dir.join("cscope.files");
        let contents = canonical_paths.join("\n");
        if let Err(e) = fs::write(&files_manifest, contents) {
            log::warn!("failed to write {}: {e}", files_manifest.display());
            return None;
        }

        let out_file = out_dir.join("cscope.out");

        let status = Command::new(&self.bin)
            .current_dir(source_root)
            .args([
                "-b",
                "-q",
                "-k",
                "-i",
            ])
            .arg(&files_manifest)
            .arg("-f")
            .arg(&out_file)
            .status();

        match status {
            Ok(s) if s.success() => Some(XrefDb { out_file, files_manifest }),
            Ok(s) => {
                log::warn!("cross-reference scanner exited with {s}");
                None
            }
            Err(e) => {
                log::warn!("cross-reference scanner ({}) not available: {e}", self.bin);
                None
            }
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolutize_leaves_absolute_path_untouched() {
        let p = Path::new("/already/absolute");
        assert_eq!(absolutize(p), p);
    }

    #[test]
    fn absolutize_joins_relative_path_to_cwd() {
        let resolved = absolutize(Path::new("cscope"));
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("cscope"));
    }
}
