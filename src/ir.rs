//! Core data model: files, symbols, raw references and the resolved edge
//! types that make up the semantic graph.

use serde::{Deserialize, Serialize};

/// Tri-state evidence for translation-unit-local (`static`) visibility.
/// Kept distinct from `Option<bool>` so "we never saw evidence either way"
/// is not silently folded into `false`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    Yes,
    No,
    Unknown,
}

impl TriState {
    pub fn as_db_str(self) -> &'static str {
        match self {
            TriState::Yes => "yes",
            TriState::No => "no",
            TriState::Unknown => "unknown",
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "yes" => TriState::Yes,
            "no" => TriState::No,
            _ => TriState::Unknown,
        }
    }
}

/// Normalized symbol kind. `Other` preserves kinds the tag extractor emits
/// that this pipeline doesn't know about, keeping the raw string in
/// `Symbol::kind_raw` for audit regardless of which variant is chosen here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SymbolType {
    Function,
    Variable,
    Struct,
    Union,
    Enum,
    Enumerator,
    Typedef,
    Macro,
    Member,
    Header,
    Other(String),
}

impl SymbolType {
    pub fn as_db_str(&self) -> &str {
        match self {
            SymbolType::Function => "function",
            SymbolType::Variable => "variable",
            SymbolType::Struct => "struct",
            SymbolType::Union => "union",
            SymbolType::Enum => "enum",
            SymbolType::Enumerator => "enumerator",
            SymbolType::Typedef => "typedef",
            SymbolType::Macro => "macro",
            SymbolType::Member => "member",
            SymbolType::Header => "header",
            SymbolType::Other(s) => s.as_str(),
        }
    }

    pub fn from_db_str(s: &str) -> Self {
        match s {
            "function" => SymbolType::Function,
            "variable" => SymbolType::Variable,
            "struct" => SymbolType::Struct,
            "union" => SymbolType::Union,
            "enum" => SymbolType::Enum,
            "enumerator" => SymbolType::Enumerator,
            "typedef" => SymbolType::Typedef,
            "macro" => SymbolType::Macro,
            "member" => SymbolType::Member,
            "header" => SymbolType::Header,
            other => SymbolType::Other(other.to_string()),
        }
    }
}

/// A file discovered under the source root, with its content-addressed
/// metadata. `path` is always a canonical, forward-slash relative path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub path: String,
    pub size: u64,
    pub language: String,
    pub sha1: String,
    pub last_modified: i64,
}

/// A named entity defined at `(file_path, line_number)`, as normalized
/// from a single tag extractor record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Symbol {
    pub id: Option<i64>,
    pub name: String,
    pub sym_type: SymbolType,
    pub kind_raw: String,
    pub file_path: String,
    pub line_number: u32,
    pub signature: Option<String>,
    pub typeref: Option<String>,
    pub scope_kind: Option<String>,
    pub scope_name: Option<String>,
    pub is_file_scope: TriState,
}

/// The three classes of cross-reference-scanner query this pipeline issues.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Callees,
    Callers,
    Includes,
}

impl QueryType {
    pub fn as_db_str(self) -> &'static str {
        match self {
            QueryType::Callees => "callees",
            QueryType::Callers => "callers",
            QueryType::Includes => "includes",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "callees" => Some(QueryType::Callees),
            "callers" => Some(QueryType::Callers),
            "includes" => Some(QueryType::Includes),
            _ => None,
        }
    }
}

/// An untrusted record staged from the cross-reference scanner before
/// semantic resolution. Never assume `source_function`/`line_text` are
/// well-formed — they come straight off the scanner's stdout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawReference {
    pub id: Option<i64>,
    pub query_type: QueryType,
    pub query_symbol: String,
    pub source_file: String,
    pub source_function: String,
    pub line_number: u32,
    pub line_text: String,
}

/// Resolved directed relationship between two symbols.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolEdge {
    pub id: Option<i64>,
    pub edge_type: String,
    pub src_symbol_id: i64,
    pub dst_symbol_id: i64,
    pub source_file: String,
    pub line_number: u32,
}

/// Resolved directed relationship between two files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileEdge {
    pub id: Option<i64>,
    pub edge_type: String,
    pub src_file: String,
    pub dst_file: String,
    pub line_number: u32,
}
