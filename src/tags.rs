//! Stage B: invoke the tag extractor once over the whole source root,
//! parse its line-delimited JSON, normalize into `Symbol` records and
//! resolve anonymous-aggregate scopes to their typedef names.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use serde::Deserialize;

use crate::discovery::DiscoveredFile;
use crate::error::{IndexError, Result};
use crate::ir::{Symbol, SymbolType, TriState};

const ANON_PREFIX: &str = "__anon";

/// One raw tag record as emitted by the extractor, one JSON object per
/// line. `path` is the file the tag belongs to — required for a single
/// batched invocation to attribute tags back to canonical files (see
/// SPEC_FULL.md §4.B).
#[derive(Debug, Deserialize)]
struct TagRecord {
    name: String,
    kind: String,
    line: u32,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    typeref: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default, rename = "scopeKind")]
    scope_kind: Option<String>,
    #[serde(default)]
    file: Option<bool>,
    #[serde(default)]
    extras: Option<String>,
    #[serde(default)]
    path: Option<String>,
}

pub struct CtagsAdapter {
    bin: String,
}

impl Default for CtagsAdapter {
    fn default() -> Self {
        Self {
            bin: "ctags".to_string(),
        }
    }
}

impl CtagsAdapter {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run the extractor once over every discovered file and return
    /// `canonical_path -> symbols` for the whole tree. A missing binary or
    /// a non-zero exit on the whole invocation is a configuration error
    /// (there is no per-file fallback for a single batched call); a file
    /// that never appears in the output simply contributes zero symbols.
    pub fn extract(
        &self,
        source_root: &Path,
        files: &[DiscoveredFile],
    ) -> Result<HashMap<String, Vec<Symbol>>> {
        if files.is_empty() {
            return Ok(HashMap::new());
        }

        let file_list = files
            .iter()
            .map(|f| f.canonical.clone())
            .collect::<Vec<_>>()
            .join("\n");

        let mut child = Command::new(&self.bin)
            .current_dir(source_root)
            .args([
                "--output-format=json",
                "--fields=+nKSzF",
                "--c-kinds=+p",
                "-L",
                "-",
                "-f",
                "-",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IndexError::Configuration(format!("tag extractor not found ({}): {e}", self.bin)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| IndexError::Configuration("failed to open ctags stdin".to_string()))?;
            stdin
                .write_all(file_list.as_bytes())
                .map_err(|e| IndexError::Subprocess {
                    stage: "tags",
                    detail: e.to_string(),
                })?;
            // Dropping `stdin` here closes the write end, signalling EOF to
            // the child — required for `-L -` to see the end of the list.
        }

        let output = child.wait_with_output().map_err(|e| IndexError::Subprocess {
            stage: "tags",
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(IndexError::Configuration(format!(
                "tag extractor exited with {}: {}",
                output.status, stderr
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_tag_stream(&stdout))
    }
}

/// Parse the extractor's line-delimited JSON output into
/// `canonical_path -> symbols`, applying the two-pass anonymous-aggregate
/// resolution described in spec §4.B.
fn parse_tag_stream(stdout: &str) -> HashMap<String, Vec<Symbol>> {
    let mut tags_by_path: HashMap<String, Vec<TagRecord>> = HashMap::new();

    // Pass 1: collect all tags, and build __anonXXXX -> typedef-name.
    let mut anon_to_typedef: HashMap<String, String> = HashMap::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        let tag: TagRecord = match serde_json::from_str(line) {
            Ok(t) => t,
            Err(_) => {
                log::debug!("skipping malformed tag record: {line}");
                continue;
            }
        };

        if tag.kind == "typedef" {
            if let Some(typeref) = &tag.typeref {
                if let Some(anon) = anon_from_typeref(typeref) {
                    anon_to_typedef.insert(anon.to_string(), tag.name.clone());
                }
            }
        }

        let path = tag.path.clone().unwrap_or_default();
        tags_by_path.entry(path).or_default().push(tag);
    }

    // Pass 2: emit normalized Symbol records.
    let mut out: HashMap<String, Vec<Symbol>> = HashMap::new();
    for (path, tags) in tags_by_path {
        if path.is_empty() {
            continue;
        }
        let mut symbols = Vec::with_capacity(tags.len());
        for tag in tags {
            if tag.name.starts_with(ANON_PREFIX) {
                continue;
            }
            if let Some(sym) = normalize_tag(tag, &anon_to_typedef) {
                symbols.push(sym);
            }
        }
        out.insert(path, symbols);
    }
    out
}

fn anon_from_typeref(typeref: &str) -> Option<&str> {
    for prefix in ["struct:", "union:", "enum:"] {
        if let Some(rest) = typeref.strip_prefix(prefix) {
            if rest.starts_with(ANON_PREFIX) {
                return Some(rest);
            }
            return None;
        }
    }
    None
}

fn normalize_tag(tag: TagRecord, anon_to_typedef: &HashMap<String, String>) -> Option<Symbol> {
    let sym_type = if tag.kind == "typedef" {
        match tag.typeref.as_deref() {
            Some(t) if t.starts_with("struct:") => SymbolType::Struct,
            Some(t) if t.starts_with("union:") => SymbolType::Union,
            Some(t) if t.starts_with("enum:") => SymbolType::Enum,
            _ => SymbolType::Typedef,
        }
    } else {
        match tag.kind.as_str() {
            "function" | "prototype" => SymbolType::Function,
            "variable" => SymbolType::Variable,
            "struct" => SymbolType::Struct,
            "union" => SymbolType::Union,
            "enum" => SymbolType::Enum,
            "enumerator" => SymbolType::Enumerator,
            "macro" => SymbolType::Macro,
            "member" => SymbolType::Member,
            "header" => SymbolType::Header,
            other => SymbolType::Other(other.to_string()),
        }
    };

    let (scope_kind, scope_name) = match (tag.scope_kind.clone(), tag.scope.clone()) {
        (kind, Some(mut name)) => {
            if name.starts_with(ANON_PREFIX) {
                match anon_to_typedef.get(&name) {
                    Some(mapped) => name = mapped.clone(),
                    None => return Some(build_symbol(tag, sym_type, None, None)),
                }
            }
            (kind, Some(name))
        }
        (kind, None) => (kind, None),
    };

    Some(build_symbol(tag, sym_type, scope_kind, scope_name))
}

fn build_symbol(
    tag: TagRecord,
    sym_type: SymbolType,
    scope_kind: Option<String>,
    scope_name: Option<String>,
) -> Symbol {
    let is_file_scope = if let Some(file_scope) = tag.file {
        if file_scope {
            TriState::Yes
        } else {
            TriState::No
        }
    } else if let Some(extras) = &tag.extras {
        if extras.split(',').any(|e| e.trim() == "fileScope") {
            TriState::Yes
        } else {
            TriState::Unknown
        }
    } else {
        TriState::Unknown
    };

    Symbol {
        id: None,
        name: tag.name,
        kind_raw: tag.kind,
        file_path: tag.path.unwrap_or_default(),
        line_number: tag.line,
        signature: tag.signature,
        typeref: tag.typeref,
        scope_kind,
        scope_name,
        is_file_scope,
        sym_type,
    }
}
