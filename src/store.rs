//! Stage C (writer half) and the shared persistent store: schema
//! application, clearing, and the batched inserts every later stage uses.
//! One `rusqlite::Connection` per run; every write is serialized through
//! it per the single-writer resource model.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, params};

use crate::error::Result;
use crate::ir::{FileEdge, FileRecord, RawReference, Symbol, SymbolEdge};

#[derive(Debug)]
pub struct Store {
    pub conn: Connection,
    pub db_path: PathBuf,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StoreStats {
    pub files: i64,
    pub symbols: i64,
    pub raw_references: i64,
    pub symbol_edges: i64,
    pub file_edges: i64,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut conn = Connection::open(db_path)?;
        init_schema(&mut conn)?;
        Ok(Self {
            conn,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Delete every row, in the order the invariants require: edges before
    /// the rows they reference, FTS last since it mirrors `symbols`.
    pub fn clear(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM symbol_edges", [])?;
        tx.execute("DELETE FROM file_edges", [])?;
        tx.execute("DELETE FROM raw_references", [])?;
        tx.execute("DELETE FROM symbols", [])?;
        tx.execute("DELETE FROM files", [])?;
        tx.execute("DELETE FROM symbols_fts", [])?;
        tx.execute("DELETE FROM metadata", [])?;
        tx.commit()?;
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = &self.conn;
        Ok(StoreStats {
            files: conn.query_row("SELECT COUNT(*) FROM files", [], |r| r.get(0))?,
            symbols: conn.query_row("SELECT COUNT(*) FROM symbols", [], |r| r.get(0))?,
            raw_references: conn.query_row("SELECT COUNT(*) FROM raw_references", [], |r| r.get(0))?,
            symbol_edges: conn.query_row("SELECT COUNT(*) FROM symbol_edges", [], |r| r.get(0))?,
            file_edges: conn.query_row("SELECT COUNT(*) FROM file_edges", [], |r| r.get(0))?,
        })
    }

    /// Stage C's write: insert every discovered file and every symbol
    /// attributed to it, one transaction, FTS kept in lockstep.
    pub fn write_files_and_symbols(
        &mut self,
        files: &[FileRecord],
        symbols_by_path: &HashMap<String, Vec<Symbol>>,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut file_stmt = tx.prepare(
                "INSERT INTO files(path, size, language, sha1, last_modified) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for f in files {
                file_stmt.execute(params![f.path, f.size as i64, f.language, f.sha1, f.last_modified])?;
            }
        }
        {
            let mut sym_stmt = tx.prepare(
                "INSERT INTO symbols(name, type, kind_raw, file_path, line_number, signature, typeref, scope_kind, scope_name, is_file_scope)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            )?;
            let mut fts_stmt =
                tx.prepare("INSERT INTO symbols_fts(rowid, name, signature, file_path) VALUES (?1, ?2, ?3, ?4)")?;
            for symbols in symbols_by_path.values() {
                for s in symbols {
                    sym_stmt.execute(params![
                        s.name,
                        s.sym_type.as_db_str(),
                        s.kind_raw,
                        s.file_path,
                        s.line_number,
                        s.signature,
                        s.typeref,
                        s.scope_kind,
                        s.scope_name,
                        s.is_file_scope.as_db_str(),
                    ])?;
                    let row_id = tx.last_insert_rowid();
                    fts_stmt.execute(params![row_id, s.name, s.signature, s.file_path])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Stage E's write: one batched insert per query class, called once
    /// all of that class's subprocess fan-out has finished.
    pub fn write_raw_references(&mut self, refs: &[RawReference]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO raw_references(query_type, query_symbol, source_file, source_function, line_number, line_text)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in refs {
                stmt.execute(params![
                    r.query_type.as_db_str(),
                    r.query_symbol,
                    r.source_file,
                    r.source_function,
                    r.line_number,
                    r.line_text,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn all_symbols(&self) -> Result<Vec<Symbol>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, type, kind_raw, file_path, line_number, signature, typeref, scope_kind, scope_name, is_file_scope FROM symbols",
        )?;
        let rows = stmt.query_map([], |row| {
            let type_s: String = row.get(2)?;
            let scope_s: String = row.get(10)?;
            Ok(Symbol {
                id: Some(row.get(0)?),
                name: row.get(1)?,
                sym_type: crate::ir::SymbolType::from_db_str(&type_s),
                kind_raw: row.get(3)?,
                file_path: row.get(4)?,
                line_number: row.get(5)?,
                signature: row.get(6)?,
                typeref: row.get(7)?,
                scope_kind: row.get(8)?,
                scope_name: row.get(9)?,
                is_file_scope: crate::ir::TriState::from_db_str(&scope_s),
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn all_raw_references(&self) -> Result<Vec<RawReference>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, query_type, query_symbol, source_file, source_function, line_number, line_text FROM raw_references",
        )?;
        let rows = stmt.query_map([], |row| {
            let qt: String = row.get(1)?;
            Ok(RawReference {
                id: Some(row.get(0)?),
                query_type: crate::ir::QueryType::from_db_str(&qt).unwrap_or(crate::ir::QueryType::Callees),
                query_symbol: row.get(2)?,
                source_file: row.get(3)?,
                source_function: row.get(4)?,
                line_number: row.get(5)?,
                line_text: row.get(6)?,
            })
        })?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn all_file_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM files ORDER BY path")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    /// Stage F's write: `INSERT OR IGNORE` against each edge table's
    /// uniqueness constraint, deduplicating re-resolved edges for free.
    pub fn write_symbol_edges(&mut self, edges: &[SymbolEdge]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO symbol_edges(edge_type, src_symbol_id, dst_symbol_id, source_file, line_number)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for e in edges {
                inserted += stmt.execute(params![e.edge_type, e.src_symbol_id, e.dst_symbol_id, e.source_file, e.line_number])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn write_file_edges(&mut self, edges: &[FileEdge]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO file_edges(edge_type, src_file, dst_file, line_number) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for e in edges {
                inserted += stmt.execute(params![e.edge_type, e.src_file, e.dst_file, e.line_number])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    pub fn write_metadata(&mut self, entries: &[(String, String)]) -> Result<()> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR REPLACE INTO metadata(key, value) VALUES (?1, ?2)")?;
            for (k, v) in entries {
                stmt.execute(params![k, v])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

fn init_schema(conn: &mut Connection) -> Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS files (
            path TEXT PRIMARY KEY,
            size INTEGER NOT NULL,
            language TEXT NOT NULL,
            sha1 TEXT NOT NULL,
            last_modified INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            type TEXT NOT NULL,
            kind_raw TEXT NOT NULL,
            file_path TEXT NOT NULL REFERENCES files(path),
            line_number INTEGER NOT NULL,
            signature TEXT,
            typeref TEXT,
            scope_kind TEXT,
            scope_name TEXT,
            is_file_scope TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
        CREATE INDEX IF NOT EXISTS idx_symbols_file ON symbols(file_path);

        CREATE VIRTUAL TABLE IF NOT EXISTS symbols_fts USING fts5(
            name, signature, file_path, content=''
        );

        CREATE TABLE IF NOT EXISTS raw_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            query_type TEXT NOT NULL,
            query_symbol TEXT NOT NULL,
            source_file TEXT NOT NULL,
            source_function TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            line_text TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_raw_refs_symbol ON raw_references(query_symbol);

        CREATE TABLE IF NOT EXISTS symbol_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            edge_type TEXT NOT NULL,
            src_symbol_id INTEGER NOT NULL REFERENCES symbols(id),
            dst_symbol_id INTEGER NOT NULL REFERENCES symbols(id),
            source_file TEXT NOT NULL,
            line_number INTEGER NOT NULL,
            UNIQUE(edge_type, src_symbol_id, dst_symbol_id, source_file, line_number)
        );

        CREATE TABLE IF NOT EXISTS file_edges (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            edge_type TEXT NOT NULL,
            src_file TEXT NOT NULL REFERENCES files(path),
            dst_file TEXT NOT NULL REFERENCES files(path),
            line_number INTEGER NOT NULL,
            UNIQUE(edge_type, src_file, dst_file, line_number)
        );

        CREATE TABLE IF NOT EXISTS metadata (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{SymbolType, TriState};

    fn open_tmp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("index.db");
        (Store::open(&db).unwrap(), dir)
    }

    #[test]
    fn schema_application_is_idempotent() {
        let (mut store, _dir) = open_tmp();
        init_schema(&mut store.conn).unwrap();
        init_schema(&mut store.conn).unwrap();
    }

    #[test]
    fn write_files_and_symbols_keeps_fts_in_sync() {
        let (mut store, _dir) = open_tmp();
        let files = vec![FileRecord {
            path: "a.c".to_string(),
            size: 10,
            language: "c".to_string(),
            sha1: "abc".to_string(),
            last_modified: 0,
        }];
        let mut by_path = HashMap::new();
        by_path.insert(
            "a.c".to_string(),
            vec![Symbol {
                id: None,
                name: "main".to_string(),
                sym_type: SymbolType::Function,
                kind_raw: "function".to_string(),
                file_path: "a.c".to_string(),
                line_number: 3,
                signature: Some("int main(void)".to_string()),
                typeref: None,
                scope_kind: None,
                scope_name: None,
                is_file_scope: TriState::No,
            }],
        );
        store.write_files_and_symbols(&files, &by_path).unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 1);
        assert_eq!(stats.symbols, 1);

        let fts_count: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM symbols_fts", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fts_count, 1);

        let found: i64 = store
            .conn
            .query_row(
                "SELECT COUNT(*) FROM symbols_fts WHERE symbols_fts MATCH 'main'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(found, 1);
    }

    #[test]
    fn clear_removes_all_rows_in_dependency_order() {
        let (mut store, _dir) = open_tmp();
        let files = vec![FileRecord {
            path: "a.c".to_string(),
            size: 1,
            language: "c".to_string(),
            sha1: "x".to_string(),
            last_modified: 0,
        }];
        store.write_files_and_symbols(&files, &HashMap::new()).unwrap();
        store.clear().unwrap();
        let stats = store.stats().unwrap();
        assert_eq!(stats.files, 0);
        assert_eq!(stats.symbols, 0);
    }

    #[test]
    fn symbol_edge_insert_or_ignore_deduplicates() {
        let (mut store, _dir) = open_tmp();
        let files = vec![
            FileRecord { path: "a.c".to_string(), size: 1, language: "c".to_string(), sha1: "x".to_string(), last_modified: 0 },
        ];
        let mut by_path = HashMap::new();
        by_path.insert(
            "a.c".to_string(),
            vec![
                Symbol { id: None, name: "main".into(), sym_type: SymbolType::Function, kind_raw: "function".into(), file_path: "a.c".into(), line_number: 1, signature: None, typeref: None, scope_kind: None, scope_name: None, is_file_scope: TriState::No },
                Symbol { id: None, name: "helper".into(), sym_type: SymbolType::Function, kind_raw: "function".into(), file_path: "a.c".into(), line_number: 5, signature: None, typeref: None, scope_kind: None, scope_name: None, is_file_scope: TriState::Yes },
            ],
        );
        store.write_files_and_symbols(&files, &by_path).unwrap();
        let syms = store.all_symbols().unwrap();
        let main_id = syms.iter().find(|s| s.name == "main").unwrap().id.unwrap();
        let helper_id = syms.iter().find(|s| s.name == "helper").unwrap().id.unwrap();

        let edge = SymbolEdge {
            id: None,
            edge_type: "CALLS".to_string(),
            src_symbol_id: main_id,
            dst_symbol_id: helper_id,
            source_file: "a.c".to_string(),
            line_number: 4,
        };
        let first = store.write_symbol_edges(&[edge.clone()]).unwrap();
        let second = store.write_symbol_edges(&[edge]).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(store.stats().unwrap().symbol_edges, 1);
    }
}
