//! Stage E: fan out the three query classes over the cross-reference
//! scanner's prebuilt database, one subprocess per (class, symbol) pair,
//! and stage the results verbatim into `raw_references`.

use std::path::Path;

use rayon::prelude::*;

use crate::cscope::CscopeClient;
use crate::ir::{QueryType, RawReference, Symbol};

const DEFAULT_POOL_SIZE: usize = 8;

#[derive(Debug, Default, Clone, Copy)]
pub struct IngestStats {
    pub queries_run: usize,
    pub queries_failed: usize,
    pub rows_staged: usize,
}

pub struct Ingestor {
    client: CscopeClient,
    pool: rayon::ThreadPool,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self::new(CscopeClient::default(), DEFAULT_POOL_SIZE)
    }
}

impl Ingestor {
    /// Builds one bounded worker pool, shared across every `ingest_class`
    /// call this instance makes (callees, callers, includes) rather than
    /// spinning up a fresh pool per query class.
    pub fn new(client: CscopeClient, pool_size: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size.max(1))
            .build()
            .expect("failed to build ingest worker pool");
        Self { client, pool }
    }

    /// Run one query class over its symbol set. Each worker's failure is
    /// logged and contributes nothing; the caller writes the accumulated
    /// rows in a single batched transaction once this returns.
    pub fn ingest_class(
        &self,
        xref_out: &Path,
        source_root: &Path,
        query_type: QueryType,
        symbols: &[(String, String)],
    ) -> (Vec<RawReference>, IngestStats) {
        let client = &self.client;
        let xref_out = xref_out.to_path_buf();

        let results: Vec<(Vec<RawReference>, bool)> = self.pool.install(|| {
            symbols
                .par_iter()
                .map(|(query_symbol, _source_name)| {
                    match client.query(&xref_out, query_type, query_symbol) {
                        Ok(lines) => {
                            let rows = lines
                                .into_iter()
                                .map(|l| RawReference {
                                    id: None,
                                    query_type,
                                    query_symbol: query_symbol.clone(),
                                    source_file: normalize_path(&l.file, source_root),
                                    source_function: if query_type == QueryType::Includes {
                                        "<global>".to_string()
                                    } else {
                                        l.function
                                    },
                                    line_number: l.line_number,
                                    line_text: l.line_text,
                                })
                                .collect();
                            (rows, false)
                        }
                        Err(e) => {
                            log::warn!("cscope query failed for '{query_symbol}' ({query_type:?}): {e}");
                            (Vec::new(), true)
                        }
                    }
                })
                .collect()
        });

        let mut rows = Vec::new();
        let mut stats = IngestStats {
            queries_run: results.len(),
            ..Default::default()
        };
        for (r, failed) in results {
            if failed {
                stats.queries_failed += 1;
            }
            stats.rows_staged += r.len();
            rows.extend(r);
        }
        (rows, stats)
    }

    /// Build the three classes' symbol iteration sets per spec §4.E:
    /// callees/callers both iterate `kind_raw = function` only (prototypes
    /// excluded from both), includes over every `.h` file's basename.
    pub fn plan(symbols: &[Symbol], file_paths: &[String]) -> IngestPlan {
        let functions: Vec<(String, String)> = symbols
            .iter()
            .filter(|s| s.kind_raw == "function")
            .map(|s| (s.name.clone(), s.name.clone()))
            .collect();
        let callees = functions.clone();
        let callers = functions;

        let includes: Vec<(String, String)> = file_paths
            .iter()
            .filter(|p| p.ends_with(".h"))
            .map(|p| {
                let basename = Path::new(p)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| p.clone());
                (basename, p.clone())
            })
            .collect();

        IngestPlan { callees, callers, includes }
    }
}

pub struct IngestPlan {
    pub callees: Vec<(String, String)>,
    pub callers: Vec<(String, String)>,
    pub includes: Vec<(String, String)>,
}

fn normalize_path(raw: &str, source_root: &Path) -> String {
    let p = Path::new(raw);
    if p.is_absolute() {
        if let Ok(rel) = p.strip_prefix(source_root) {
            return rel.to_string_lossy().replace('\\', "/");
        }
    }
    raw.replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::SymbolType::Function;

    fn function_symbol(name: &str, kind_raw: &str) -> Symbol {
        Symbol {
            id: None,
            name: name.to_string(),
            sym_type: Function,
            kind_raw: kind_raw.to_string(),
            file_path: "a.c".to_string(),
            line_number: 1,
            signature: None,
            typeref: None,
            scope_kind: None,
            scope_name: None,
            is_file_scope: crate::ir::TriState::Unknown,
        }
    }

    #[test]
    fn plan_excludes_prototypes_from_callees() {
        let symbols = vec![function_symbol("main", "function"), function_symbol("helper", "prototype")];
        let plan = Ingestor::plan(&symbols, &[]);
        assert_eq!(plan.callees.len(), 1);
        assert_eq!(plan.callees[0].0, "main");
    }

    #[test]
    fn plan_excludes_prototypes_from_callers() {
        let symbols = vec![function_symbol("main", "function"), function_symbol("helper", "prototype")];
        let plan = Ingestor::plan(&symbols, &[]);
        assert_eq!(plan.callers.len(), 1);
        assert_eq!(plan.callers[0].0, "main");
    }

    #[test]
    fn plan_uses_header_basename_for_includes() {
        let plan = Ingestor::plan(&[], &["src/power.h".to_string(), "a.c".to_string()]);
        assert_eq!(plan.includes.len(), 1);
        assert_eq!(plan.includes[0].0, "power.h");
    }

    #[test]
    fn normalize_path_leaves_relative_path_untouched() {
        let root = Path::new("/src/root");
        assert_eq!(normalize_path("a.c", root), "a.c");
    }

    #[test]
    fn normalize_path_strips_absolute_prefix() {
        let root = Path::new("/src/root");
        assert_eq!(normalize_path("/src/root/a.c", root), "a.c");
    }
}
