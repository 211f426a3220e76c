//! Subprocess client for single cross-reference-scanner queries (the three
//! query classes Stage E fans out over). Line-oriented output parsing only
//! — no persistent connection to the scanner, one process per query.

use std::path::Path;
use std::process::Command;

use crate::ir::QueryType;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CscopeLine {
    pub file: String,
    pub function: String,
    pub line_number: u32,
    pub line_text: String,
}

pub struct CscopeClient {
    bin: String,
}

impl Default for CscopeClient {
    fn default() -> Self {
        Self {
            bin: "cscope".to_string(),
        }
    }
}

impl CscopeClient {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run one query against the scanner's prebuilt database and parse its
    /// `file function line rest-of-line` output. A subprocess failure here
    /// is the caller's to log and skip — it is never fatal to the batch.
    pub fn query(&self, xref_out: &Path, query_type: QueryType, symbol: &str) -> Result<Vec<CscopeLine>, String> {
        let flag = match query_type {
            QueryType::Callees => "-2",
            QueryType::Callers => "-3",
            QueryType::Includes => "-8",
        };

        let output = Command::new(&self.bin)
            .args(["-d", "-l", "-f"])
            .arg(xref_out)
            .arg(flag)
            .arg(symbol)
            .output()
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(format!(
                "cscope query exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_lines(&stdout))
    }
}

fn parse_lines(stdout: &str) -> Vec<CscopeLine> {
    let mut out = Vec::new();
    for line in stdout.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(4, ' ');
        let (Some(file), Some(function), Some(line_no)) = (parts.next(), parts.next(), parts.next()) else {
            log::debug!("skipping malformed cscope line: {line}");
            continue;
        };
        let rest = parts.next().unwrap_or("");
        let Ok(line_number) = line_no.parse::<u32>() else {
            log::debug!("skipping cscope line with non-numeric line number: {line}");
            continue;
        };
        out.push(CscopeLine {
            file: file.to_string(),
            function: function.to_string(),
            line_number,
            line_text: rest.to_string(),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_lines() {
        let stdout = "a.c main 4 helper();\nb.c other 10 int x = helper(1, 2);\n";
        let lines = parse_lines(stdout);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].file, "a.c");
        assert_eq!(lines[0].function, "main");
        assert_eq!(lines[0].line_number, 4);
        assert_eq!(lines[0].line_text, "helper();");
    }

    #[test]
    fn skips_malformed_lines() {
        let stdout = "not a valid line\na.c main 4 helper();\n";
        let lines = parse_lines(stdout);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn skips_lines_with_non_numeric_line_number() {
        let stdout = "a.c main notanumber helper();\n";
        let lines = parse_lines(stdout);
        assert!(lines.is_empty());
    }
}
