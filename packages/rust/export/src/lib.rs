//! CSV sinks for the enrichment pipeline.
//!
//! Two append-only sinks, opened once per run: the primary game table
//! (filtered to the configured column whitelist) and the base→expansion
//! edge table. Headers go out at creation, and every row is flushed as it
//! is written, so an aborted run leaves a valid file containing everything
//! processed so far.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::debug;

use meeplesync_shared::{ExpansionRef, MeeplesyncError, Result};

/// A merged output row: column name → value.
pub type Row = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// GameSink
// ---------------------------------------------------------------------------

/// Whitelist-filtered writer for the primary game table.
pub struct GameSink {
    writer: csv::Writer<File>,
    columns: Vec<String>,
    path: PathBuf,
}

impl GameSink {
    /// Create the output file and write the header row.
    pub fn create(path: &Path, columns: &[String]) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(columns)?;
        writer
            .flush()
            .map_err(|e| MeeplesyncError::io(path, e))?;

        debug!(path = %path.display(), columns = columns.len(), "game sink opened");
        Ok(Self {
            writer,
            columns: columns.to_vec(),
            path: path.to_path_buf(),
        })
    }

    /// Append one row, taking values in whitelist order. Columns the row
    /// does not carry are written empty; row fields outside the whitelist
    /// are silently dropped.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        let record = self
            .columns
            .iter()
            .map(|col| row.get(col).map(String::as_str).unwrap_or(""));
        self.writer.write_record(record)?;
        self.writer
            .flush()
            .map_err(|e| MeeplesyncError::io(&self.path, e))
    }
}

// ---------------------------------------------------------------------------
// ExpansionSink
// ---------------------------------------------------------------------------

/// Writer for the base→expansion relation table.
pub struct ExpansionSink {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl ExpansionSink {
    /// Create the output file and write the `base_id,expansion_id` header.
    pub fn create(path: &Path) -> Result<Self> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["base_id", "expansion_id"])?;
        writer
            .flush()
            .map_err(|e| MeeplesyncError::io(path, e))?;

        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    /// Append one edge row for an expansion of `base_id`.
    pub fn write_edge(&mut self, base_id: &str, expansion: &ExpansionRef) -> Result<()> {
        self.writer.write_record([base_id, &expansion.id])?;
        self.writer
            .flush()
            .map_err(|e| MeeplesyncError::io(&self.path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("meeplesync-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_and_column_order_follow_whitelist() {
        let path = temp_path("games-order.csv");
        let columns: Vec<String> = ["id", "name", "rank"].map(String::from).to_vec();

        let mut sink = GameSink::create(&path, &columns).unwrap();
        sink.write_row(&row(&[("rank", "3"), ("id", "13"), ("name", "Catan")]))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,name,rank\n13,Catan,3\n");
    }

    #[test]
    fn unknown_fields_dropped_missing_fields_empty() {
        let path = temp_path("games-filter.csv");
        let columns: Vec<String> = ["id", "complexity"].map(String::from).to_vec();

        let mut sink = GameSink::create(&path, &columns).unwrap();
        sink.write_row(&row(&[
            ("id", "42"),
            ("created_at", "2024-01-01"), // not in whitelist
        ]))
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "id,complexity\n42,\n");
    }

    #[test]
    fn values_with_delimiters_are_quoted() {
        let path = temp_path("games-quoting.csv");
        let columns: Vec<String> = ["id", "name"].map(String::from).to_vec();

        let mut sink = GameSink::create(&path, &columns).unwrap();
        sink.write_row(&row(&[("id", "1"), ("name", "Dead of Winter, A Crossroads Game")]))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"Dead of Winter, A Crossroads Game\""));
    }

    #[test]
    fn expansion_edges_append_in_write_order() {
        let path = temp_path("expansions.csv");
        let mut sink = ExpansionSink::create(&path).unwrap();

        let seafarers = ExpansionRef {
            id: "926".into(),
            name: "Catan: Seafarers".into(),
        };
        let cities = ExpansionRef {
            id: "325".into(),
            name: "Catan: Cities and Knights".into(),
        };
        sink.write_edge("13", &seafarers).unwrap();
        sink.write_edge("13", &cities).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "base_id,expansion_id\n13,926\n13,325\n");
    }
}
