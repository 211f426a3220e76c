//! Stage G: record run-level metadata after every successful stage has
//! committed. Always the last write of a run.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::Local;

use crate::error::Result;
use crate::store::Store;

/// Wall-clock elapsed time per stage, keyed by stage name, in the order
/// they ran. Kept as a `BTreeMap` so the rendered summary is stable.
pub type StageTimings = BTreeMap<String, Duration>;

pub fn write(
    store: &mut Store,
    source_root: &Path,
    total_files: usize,
    total_symbols: usize,
    timings: &StageTimings,
) -> Result<()> {
    let mut entries = vec![
        ("source_root".to_string(), source_root.to_string_lossy().to_string()),
        ("total_files".to_string(), total_files.to_string()),
        ("total_symbols".to_string(), total_symbols.to_string()),
        ("indexed_at".to_string(), Local::now().to_rfc3339()),
    ];
    for (stage, elapsed) in timings {
        entries.push((format!("stage_{stage}_ms"), elapsed.as_millis().to_string()));
    }
    store.write_metadata(&entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tempfile::tempdir;

    #[test]
    fn writes_required_keys() {
        let dir = tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("index.db")).unwrap();
        let mut timings = StageTimings::new();
        timings.insert("discovery".to_string(), StdDuration::from_millis(5));

        write(&mut store, Path::new("/src/root"), 2, 10, &timings).unwrap();

        let value: String = store
            .conn
            .query_row("SELECT value FROM metadata WHERE key = 'total_files'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(value, "2");

        let stage_value: String = store
            .conn
            .query_row(
                "SELECT value FROM metadata WHERE key = 'stage_discovery_ms'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(stage_value, "5");
    }
}
