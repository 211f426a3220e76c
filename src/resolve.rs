//! Stage F: turn staged `raw_references` into typed graph edges. Callee
//! extraction plus the disambiguation ladders are the one piece of this
//! pipeline that does real text analysis rather than passing subprocess
//! output straight through.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;

use crate::ir::{FileEdge, QueryType, RawReference, Symbol, SymbolEdge, SymbolType};

const CALLEE_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "return", "sizeof", "typeof", "do", "else", "case", "break",
    "continue", "goto", "default",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ResolveStats {
    pub total_raw: usize,
    pub resolved_edges: usize,
    pub no_callee_in_line: usize,
    pub src_not_found: usize,
    pub dst_not_found_or_ambiguous: usize,
}

impl ResolveStats {
    pub fn summary(&self, label: &str) -> String {
        format!(
            "{label}: total_raw={} resolved={} no_callee_in_line={} src_not_found={} dst_not_found_or_ambiguous={}",
            self.total_raw, self.resolved_edges, self.no_callee_in_line, self.src_not_found, self.dst_not_found_or_ambiguous
        )
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct IncludeResolveStats {
    pub total_raw: usize,
    pub resolved_edges: usize,
    pub unresolved: usize,
    pub ambiguous: usize,
}

impl IncludeResolveStats {
    pub fn summary(&self) -> String {
        format!(
            "includes: total_raw={} resolved={} unresolved={} ambiguous={}",
            self.total_raw, self.resolved_edges, self.unresolved, self.ambiguous
        )
    }
}

pub struct CalleeResolver {
    ident_re: Regex,
}

impl Default for CalleeResolver {
    fn default() -> Self {
        Self {
            ident_re: Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").expect("static regex"),
        }
    }
}

impl CalleeResolver {
    /// First identifier immediately followed by `(` that is not a C
    /// control keyword.
    pub fn extract_callee(&self, line_text: &str) -> Option<String> {
        self.ident_re
            .captures_iter(line_text)
            .map(|c| c[1].to_string())
            .find(|ident| !CALLEE_KEYWORDS.contains(&ident.as_str()))
    }

    /// Resolve `raw_references` with `query_type = callees` into `CALLS`
    /// edges, per spec §4.F's disambiguation ladder.
    pub fn resolve(&self, raws: &[RawReference], symbols: &[Symbol]) -> (Vec<SymbolEdge>, ResolveStats) {
        let by_name = index_functions_by_name(symbols);

        let mut edges = Vec::new();
        let mut stats = ResolveStats::default();

        for raw in raws.iter().filter(|r| r.query_type == QueryType::Callees) {
            stats.total_raw += 1;

            let Some(callee) = self.extract_callee(&raw.line_text) else {
                stats.no_callee_in_line += 1;
                continue;
            };

            let Some(src_id) = resolve_unique_or_same_file(by_name.get(&raw.query_symbol), &raw.source_file) else {
                stats.src_not_found += 1;
                continue;
            };

            let Some(dst_id) = resolve_callee_candidate(by_name.get(&callee), &raw.source_file) else {
                stats.dst_not_found_or_ambiguous += 1;
                continue;
            };

            edges.push(SymbolEdge {
                id: None,
                edge_type: "CALLS".to_string(),
                src_symbol_id: src_id,
                dst_symbol_id: dst_id,
                source_file: raw.source_file.clone(),
                line_number: raw.line_number,
            });
            stats.resolved_edges += 1;
        }

        (edges, stats)
    }
}

fn index_functions_by_name(symbols: &[Symbol]) -> HashMap<&str, Vec<&Symbol>> {
    let mut map: HashMap<&str, Vec<&Symbol>> = HashMap::new();
    for s in symbols {
        if s.sym_type == SymbolType::Function {
            map.entry(s.name.as_str()).or_default().push(s);
        }
    }
    map
}

fn resolve_unique_or_same_file(candidates: Option<&Vec<&Symbol>>, source_file: &str) -> Option<i64> {
    let candidates = candidates?;
    match candidates.len() {
        0 => None,
        1 => candidates[0].id,
        _ => candidates
            .iter()
            .find(|s| s.file_path == source_file)
            .and_then(|s| s.id),
    }
}

/// Same ladder as `resolve_unique_or_same_file`, plus a final `.c`-over-
/// header tiebreak for the destination symbol.
fn resolve_callee_candidate(candidates: Option<&Vec<&Symbol>>, source_file: &str) -> Option<i64> {
    let candidates = candidates?;
    match candidates.len() {
        0 => None,
        1 => candidates[0].id,
        _ => {
            if let Some(s) = candidates.iter().find(|s| s.file_path == source_file) {
                return s.id;
            }
            let c_files: Vec<_> = candidates.iter().filter(|s| s.file_path.ends_with(".c")).collect();
            if c_files.len() == 1 {
                c_files[0].id
            } else {
                None
            }
        }
    }
}

pub struct IncludeResolver;

impl IncludeResolver {
    /// Resolve `raw_references` with `query_type = includes` into
    /// `INCLUDES` file edges, per spec §4.F.
    pub fn resolve(&self, raws: &[RawReference], file_paths: &[String]) -> (Vec<FileEdge>, IncludeResolveStats) {
        let mut edges = Vec::new();
        let mut stats = IncludeResolveStats::default();

        for raw in raws.iter().filter(|r| r.query_type == QueryType::Includes) {
            stats.total_raw += 1;

            let resolved = if raw.query_symbol.contains('/') {
                file_paths.iter().find(|p| p.as_str() == raw.query_symbol).cloned()
            } else {
                let matches: Vec<&String> = file_paths
                    .iter()
                    .filter(|p| {
                        p.as_str() == raw.query_symbol
                            || Path::new(p.as_str())
                                .file_name()
                                .map(|n| n.to_string_lossy() == raw.query_symbol)
                                .unwrap_or(false)
                    })
                    .collect();
                match matches.len() {
                    1 => Some(matches[0].clone()),
                    0 => None,
                    _ => {
                        stats.ambiguous += 1;
                        continue;
                    }
                }
            };

            let Some(dst_file) = resolved else {
                stats.unresolved += 1;
                continue;
            };

            edges.push(FileEdge {
                id: None,
                edge_type: "INCLUDES".to_string(),
                src_file: raw.source_file.clone(),
                dst_file,
                line_number: raw.line_number,
            });
            stats.resolved_edges += 1;
        }

        (edges, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::TriState;

    fn func(name: &str, id: i64, file: &str) -> Symbol {
        func_with_kind(name, id, file, "function")
    }

    fn func_with_kind(name: &str, id: i64, file: &str, kind_raw: &str) -> Symbol {
        Symbol {
            id: Some(id),
            name: name.to_string(),
            sym_type: SymbolType::Function,
            kind_raw: kind_raw.to_string(),
            file_path: file.to_string(),
            line_number: 1,
            signature: None,
            typeref: None,
            scope_kind: None,
            scope_name: None,
            is_file_scope: TriState::Unknown,
        }
    }

    fn raw(query_symbol: &str, source_file: &str, line_text: &str) -> RawReference {
        RawReference {
            id: None,
            query_type: QueryType::Callees,
            query_symbol: query_symbol.to_string(),
            source_file: source_file.to_string(),
            source_function: query_symbol.to_string(),
            line_number: 4,
            line_text: line_text.to_string(),
        }
    }

    #[test]
    fn extracts_first_non_keyword_identifier() {
        let r = CalleeResolver::default();
        assert_eq!(r.extract_callee("if (x) helper();"), Some("helper".to_string()));
        assert_eq!(r.extract_callee("return sizeof(x);"), None);
    }

    #[test]
    fn resolves_unique_callee_to_edge() {
        let r = CalleeResolver::default();
        let symbols = vec![func("main", 1, "a.c"), func("helper", 2, "a.c")];
        let raws = vec![raw("main", "a.c", "helper();")];
        let (edges, stats) = r.resolve(&raws, &symbols);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].src_symbol_id, 1);
        assert_eq!(edges[0].dst_symbol_id, 2);
        assert_eq!(stats.resolved_edges, 1);
    }

    #[test]
    fn prefers_same_file_on_ambiguous_destination() {
        let r = CalleeResolver::default();
        let symbols = vec![
            func("main", 1, "a.c"),
            func("helper", 2, "a.c"),
            func("helper", 3, "b.c"),
        ];
        let raws = vec![raw("main", "a.c", "helper();")];
        let (edges, _stats) = r.resolve(&raws, &symbols);
        assert_eq!(edges[0].dst_symbol_id, 2);
    }

    #[test]
    fn prefers_dot_c_when_no_same_file_match() {
        let r = CalleeResolver::default();
        let symbols = vec![
            func("main", 1, "main.c"),
            func("helper", 2, "helper.h"),
            func("helper", 3, "helper.c"),
        ];
        let raws = vec![raw("main", "main.c", "helper();")];
        let (edges, _stats) = r.resolve(&raws, &symbols);
        assert_eq!(edges[0].dst_symbol_id, 3);
    }

    #[test]
    fn resolves_callee_declared_only_as_prototype() {
        let r = CalleeResolver::default();
        let symbols = vec![
            func("main", 1, "main.c"),
            func_with_kind("helper", 2, "helper.h", "prototype"),
        ];
        let raws = vec![raw("main", "main.c", "helper();")];
        let (edges, stats) = r.resolve(&raws, &symbols);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dst_symbol_id, 2);
        assert_eq!(stats.resolved_edges, 1);
    }

    #[test]
    fn no_callee_in_line_is_counted_not_fatal() {
        let r = CalleeResolver::default();
        let symbols = vec![func("main", 1, "a.c")];
        let raws = vec![raw("main", "a.c", "x = 1 + 2;")];
        let (edges, stats) = r.resolve(&raws, &symbols);
        assert!(edges.is_empty());
        assert_eq!(stats.no_callee_in_line, 1);
    }

    #[test]
    fn includes_resolve_by_basename() {
        let resolver = IncludeResolver;
        let files = vec!["src/power.h".to_string(), "a.c".to_string()];
        let raws = vec![RawReference {
            id: None,
            query_type: QueryType::Includes,
            query_symbol: "power.h".to_string(),
            source_file: "a.c".to_string(),
            source_function: "<global>".to_string(),
            line_number: 1,
            line_text: "#include \"power.h\"".to_string(),
        }];
        let (edges, stats) = resolver.resolve(&raws, &files);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].dst_file, "src/power.h");
        assert_eq!(stats.resolved_edges, 1);
    }

    #[test]
    fn includes_ambiguous_basename_is_not_emitted() {
        let resolver = IncludeResolver;
        let files = vec!["a/power.h".to_string(), "b/power.h".to_string()];
        let raws = vec![RawReference {
            id: None,
            query_type: QueryType::Includes,
            query_symbol: "power.h".to_string(),
            source_file: "a.c".to_string(),
            source_function: "<global>".to_string(),
            line_number: 1,
            line_text: String::new(),
        }];
        let (edges, stats) = resolver.resolve(&raws, &files);
        assert!(edges.is_empty());
        assert_eq!(stats.ambiguous, 1);
    }
}
