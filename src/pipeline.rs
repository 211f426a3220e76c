//! Orchestrates stages A–G through the `INIT → ... → META_WRITTEN` state
//! machine, gated by the CLI's `--refs`/`--build-cscope`/`--ingest-refs`/
//! `--resolve-refs` flags. Each transition commits one store transaction;
//! a failure leaves the store at the last state that committed.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use sha1::{Digest, Sha1};

use crate::discovery::{self, DiscoveryConfig};
use crate::error::Result;
use crate::ingest::Ingestor;
use crate::ir::{FileRecord, QueryType};
use crate::metadata;
use crate::resolve::{CalleeResolver, IncludeResolver};
use crate::store::Store;
use crate::tags::CtagsAdapter;
use crate::xref::XrefBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineState {
    Init,
    Discovered,
    SymbolsWritten,
    XrefBuilt,
    RefsIngested,
    EdgesResolved,
    MetaWritten,
}

pub struct PipelineConfig {
    pub source_root: PathBuf,
    pub db_path: PathBuf,
    pub discovery: DiscoveryConfig,
    pub force: bool,
    pub refs: bool,
    pub build_cscope: bool,
    pub ingest_refs: bool,
    pub resolve_refs: bool,
    pub ctags_bin: String,
    pub cscope_bin: String,
    pub cscope_out_dir: PathBuf,
}

#[derive(Debug, Default)]
pub struct PipelineReport {
    pub final_state: Option<&'static str>,
    pub total_files: usize,
    pub total_symbols: usize,
}

/// Runs the pipeline and, on failure, logs the last state the run reached
/// before erroring out — each transition committed atomically, so that
/// state is exactly what's durable in the store (spec §4: "failure rolls
/// back to the prior state").
pub fn run(cfg: &PipelineConfig) -> Result<PipelineReport> {
    let mut state = PipelineState::Init;
    let result = run_stages(cfg, &mut state);
    if let Err(ref e) = result {
        log::error!("pipeline failed at state {}: {e}", state_name(state));
    }
    result
}

fn run_stages(cfg: &PipelineConfig, state: &mut PipelineState) -> Result<PipelineReport> {
    let mut timings = metadata::StageTimings::new();
    let mut report = PipelineReport::default();
    let mut store = Store::open(&cfg.db_path)?;

    // The CLI binary is responsible for the interactive "clear existing
    // store?" confirmation gated by `--force`; by the time `run` is
    // called the caller has already agreed, so every run starts clean.
    store.clear()?;

    let source_root = cfg.source_root.canonicalize()?;

    // A: discover
    let t0 = Instant::now();
    let files = discovery::discover(&source_root, &cfg.discovery)?;
    timings.insert("discovery".to_string(), t0.elapsed());
    *state = PipelineState::Discovered;
    log::info!("stage A: discovered {} files", files.len());

    // B: tags
    let t0 = Instant::now();
    let ctags = CtagsAdapter::new(cfg.ctags_bin.clone());
    let symbols_by_path = ctags.extract(&source_root, &files)?;
    timings.insert("tags".to_string(), t0.elapsed());
    log::info!(
        "stage B: extracted symbols for {} files",
        symbols_by_path.len()
    );

    // C: write files + symbols
    let t0 = Instant::now();
    let file_records = build_file_records(&files)?;
    store.write_files_and_symbols(&file_records, &symbols_by_path)?;
    timings.insert("store".to_string(), t0.elapsed());
    *state = PipelineState::SymbolsWritten;

    report.total_files = file_records.len();
    report.total_symbols = symbols_by_path.values().map(|v| v.len()).sum();
    log::info!(
        "stage C: wrote {} files, {} symbols",
        report.total_files,
        report.total_symbols
    );

    if cfg.refs || cfg.build_cscope {
        let t0 = Instant::now();
        let canonical_paths = store.all_file_paths()?;
        let xref = XrefBuilder::new(cfg.cscope_bin.clone());
        let xref_db = xref.build(&source_root, &cfg.cscope_out_dir, &canonical_paths);
        timings.insert("xref".to_string(), t0.elapsed());

        if let Some(xref_db) = xref_db {
            *state = PipelineState::XrefBuilt;

            if cfg.refs || cfg.ingest_refs {
                let t0 = Instant::now();
                let all_symbols = store.all_symbols()?;
                let plan = Ingestor::plan(&all_symbols, &canonical_paths);
                let ingestor = Ingestor::default();

                let (callee_rows, callee_stats) = ingestor.ingest_class(
                    &xref_db.out_file,
                    &source_root,
                    QueryType::Callees,
                    &plan.callees,
                );
                let (caller_rows, caller_stats) = ingestor.ingest_class(
                    &xref_db.out_file,
                    &source_root,
                    QueryType::Callers,
                    &plan.callers,
                );
                let (include_rows, include_stats) = ingestor.ingest_class(
                    &xref_db.out_file,
                    &source_root,
                    QueryType::Includes,
                    &plan.includes,
                );

                store.write_raw_references(&callee_rows)?;
                store.write_raw_references(&caller_rows)?;
                store.write_raw_references(&include_rows)?;
                timings.insert("ingest".to_string(), t0.elapsed());

                log::info!(
                    "stage E: callees({}/{} failed) callers({}/{} failed) includes({}/{} failed)",
                    callee_stats.queries_run, callee_stats.queries_failed,
                    caller_stats.queries_run, caller_stats.queries_failed,
                    include_stats.queries_run, include_stats.queries_failed,
                );
                *state = PipelineState::RefsIngested;

                if cfg.refs || cfg.resolve_refs {
                    let t0 = Instant::now();
                    let raws = store.all_raw_references()?;
                    let symbols = store.all_symbols()?;
                    let file_paths = store.all_file_paths()?;

                    let (symbol_edges, callee_resolve_stats) =
                        CalleeResolver::default().resolve(&raws, &symbols);
                    let (file_edges, include_resolve_stats) =
                        IncludeResolver.resolve(&raws, &file_paths);

                    store.write_symbol_edges(&symbol_edges)?;
                    store.write_file_edges(&file_edges)?;
                    timings.insert("resolve".to_string(), t0.elapsed());

                    log::info!("stage F: {}", callee_resolve_stats.summary("callees"));
                    log::info!("stage F: {}", include_resolve_stats.summary());
                    *state = PipelineState::EdgesResolved;
                }
            }
        } else {
            log::warn!("cross-reference scanner unavailable; skipping stages E/F");
        }
    }

    // G: metadata, always last
    let t0 = Instant::now();
    metadata::write(
        &mut store,
        &source_root,
        report.total_files,
        report.total_symbols,
        &timings,
    )?;
    timings.insert("metadata".to_string(), t0.elapsed());
    *state = PipelineState::MetaWritten;

    report.final_state = Some(state_name(*state));
    Ok(report)
}

fn state_name(state: PipelineState) -> &'static str {
    match state {
        PipelineState::Init => "INIT",
        PipelineState::Discovered => "DISCOVERED",
        PipelineState::SymbolsWritten => "SYMBOLS_WRITTEN",
        PipelineState::XrefBuilt => "XREF_BUILT",
        PipelineState::RefsIngested => "REFS_INGESTED",
        PipelineState::EdgesResolved => "EDGES_RESOLVED",
        PipelineState::MetaWritten => "META_WRITTEN",
    }
}

fn build_file_records(files: &[discovery::DiscoveredFile]) -> Result<Vec<FileRecord>> {
    let mut out = Vec::with_capacity(files.len());
    for f in files {
        let bytes = fs::read(&f.absolute)?;
        let mut hasher = Sha1::new();
        hasher.update(&bytes);
        let sha1 = format!("{:x}", hasher.finalize());
        let meta = fs::metadata(&f.absolute)?;
        let last_modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let language = match Path::new(&f.canonical).extension().and_then(|e| e.to_str()) {
            Some("c") => "c",
            Some("h") => "h",
            _ => "unknown",
        };
        out.push(FileRecord {
            path: f.canonical.clone(),
            size: bytes.len() as u64,
            language: language.to_string(),
            sha1,
            last_modified,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tag_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let c_file = dir.path().join("a.c");
        std::fs::write(&c_file, b"int x;").unwrap();
        let files = vec![discovery::DiscoveredFile {
            canonical: "a.c".to_string(),
            absolute: c_file,
        }];
        let records = build_file_records(&files).unwrap();
        assert_eq!(records[0].language, "c");
        assert_eq!(records[0].sha1.len(), 40);
    }
}
