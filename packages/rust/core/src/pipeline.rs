//! End-to-end `sync` pipeline: ranks dump → batches → lookup → merge → CSV.
//!
//! Strictly sequential: each batch is fully fetched, parsed, and written
//! before the next begins. The only state that outlives a batch is the
//! pair of open output sinks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, instrument, warn};

use meeplesync_client::{ApiClient, thing_url};
use meeplesync_enrich::{ParseOptions, parse_items};
use meeplesync_export::{ExpansionSink, GameSink, Row};
use meeplesync_shared::{
    ApiConfig, MeeplesyncError, OutputConfig, Result, RetryConfig, SENTINEL_ZERO_COLUMNS,
};

/// Configuration for one `sync` run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Path to the ranks dump CSV.
    pub input: PathBuf,
    /// Path for the primary game table CSV.
    pub output: PathBuf,
    /// Path for the base→expansion edge CSV.
    pub expansions_output: PathBuf,
    /// API endpoint and batch sizing.
    pub api: ApiConfig,
    /// Retry behavior for batch lookups.
    pub retry: RetryConfig,
    /// Column whitelist and derivation knobs.
    pub format: OutputConfig,
}

/// Result of a completed `sync` run.
#[derive(Debug)]
pub struct SyncResult {
    /// Rows written to the primary sink.
    pub games_written: usize,
    /// Edge rows written to the secondary sink.
    pub edges_written: usize,
    /// Lookup calls issued.
    pub batches: usize,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each batch lookup completes.
    fn batch_done(&self, current: usize, total: usize);
    /// Called when a merged game row is written.
    fn game_written(&self, id: &str, name: &str);
    /// Called when the pipeline completes.
    fn done(&self, result: &SyncResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn batch_done(&self, _current: usize, _total: usize) {}
    fn game_written(&self, _id: &str, _name: &str) {}
    fn done(&self, _result: &SyncResult) {}
}

/// Run the full `sync` pipeline.
///
/// 1. Read the ranks dump
/// 2. Per batch: blank sentinel zeros, fetch, parse, merge
/// 3. Append merged rows and expansion edges to the sinks
///
/// A non-transient HTTP error aborts mid-run; rows flushed so far stay on
/// disk, there is no rollback.
#[instrument(skip_all, fields(input = %config.input.display()))]
pub async fn run_sync(
    config: &SyncConfig,
    progress: &dyn ProgressReporter,
) -> Result<SyncResult> {
    let start = Instant::now();

    progress.phase("Reading ranks dump");
    let rows = read_source_rows(&config.input)?;
    let batch_size = config.api.batch_size.max(1);
    let total_batches = rows.len().div_ceil(batch_size);
    info!(
        rows = rows.len(),
        batch_size,
        batches = total_batches,
        "starting sync"
    );

    let client = ApiClient::new(config.retry.clone())?;
    let opts = ParseOptions::from(&config.format);

    let mut games = GameSink::create(&config.output, &config.format.columns)?;
    let mut edges = ExpansionSink::create(&config.expansions_output)?;

    let mut games_written = 0usize;
    let mut edges_written = 0usize;
    let mut batches = 0usize;

    progress.phase("Fetching game details");
    for chunk in rows.chunks(batch_size) {
        // Fresh per-batch lookup table, discarded after the merge.
        let mut batch: HashMap<String, Row> = HashMap::with_capacity(chunk.len());
        let mut ids: Vec<String> = Vec::with_capacity(chunk.len());
        for row in chunk {
            let mut row = row.clone();
            normalize_sentinel_zeros(&mut row);
            let id = row.get("id").cloned().unwrap_or_default();
            ids.push(id.clone());
            batch.insert(id, row);
        }

        let url = thing_url(&config.api.base_url, &ids.join(","), config.api.stats);
        let body = client.get_with_retry(&url).await?;
        batches += 1;

        // Sub-documents come back in arbitrary order; merge by id.
        for item in parse_items(&body, &opts)? {
            let Some(mut row) = batch.remove(&item.id) else {
                warn!(id = %item.id, "response item not in requested batch, skipping");
                continue;
            };
            row.extend(item.fields.clone());
            if let Some(year) = row.get("yearpublished").cloned() {
                row.insert("year_published".into(), year);
            }

            games.write_row(&row)?;
            games_written += 1;
            progress.game_written(&item.id, row.get("name").map(String::as_str).unwrap_or(""));

            for expansion in &item.expansions {
                edges.write_edge(&item.id, expansion)?;
                edges_written += 1;
            }
        }

        // Ids absent from the response get no merged row at all.
        if !batch.is_empty() {
            let missing: Vec<_> = batch.keys().cloned().collect();
            warn!(?missing, "batch ids missing from lookup response");
        }

        progress.batch_done(batches, total_batches);
    }

    let result = SyncResult {
        games_written,
        edges_written,
        batches,
        elapsed: start.elapsed(),
    };

    info!(
        games = result.games_written,
        edges = result.edges_written,
        batches = result.batches,
        elapsed_ms = result.elapsed.as_millis(),
        "sync completed"
    );
    progress.done(&result);

    Ok(result)
}

// ---------------------------------------------------------------------------
// Source rows
// ---------------------------------------------------------------------------

/// Read the ranks dump into one column map per row. The `id` column is the
/// only one the pipeline itself requires.
fn read_source_rows(path: &Path) -> Result<Vec<Row>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    if !headers.iter().any(|h| h == "id") {
        return Err(MeeplesyncError::config(format!(
            "{}: missing required 'id' column",
            path.display()
        )));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.to_string(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Blank the literal `"0"` in the columns where zero means "no data", so
/// the convention holds whether the zero came from the dump or the API.
fn normalize_sentinel_zeros(row: &mut Row) {
    for col in SENTINEL_ZERO_COLUMNS {
        if row.get(col).is_some_and(|v| v == "0") {
            row.insert(col.to_string(), String::new());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_zeros_blanked_only_where_exact() {
        let mut row: Row = [
            ("id", "13"),
            ("rank", "0"),
            ("average", "0"),
            ("bayesaverage", "5.5"),
            ("yearpublished", "0"),
            ("usersrated", "0"), // not a sentinel column
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        normalize_sentinel_zeros(&mut row);

        assert_eq!(row["rank"], "");
        assert_eq!(row["average"], "");
        assert_eq!(row["yearpublished"], "");
        assert_eq!(row["bayesaverage"], "5.5");
        assert_eq!(row["usersrated"], "0");
    }

    #[test]
    fn source_rows_require_id_column() {
        let dir = std::env::temp_dir().join(format!("meeplesync-core-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.csv");
        std::fs::write(&good, "id,name,rank\n13,Catan,100\n1,Die Macher,500\n").unwrap();
        let rows = read_source_rows(&good).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "Catan");

        let bad = dir.join("bad.csv");
        std::fs::write(&bad, "name,rank\nCatan,100\n").unwrap();
        assert!(read_source_rows(&bad).is_err());
    }

    // -- end-to-end runs against a mock API ---------------------------------

    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "meeplesync-e2e-{}-{}",
            tag,
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sync_config(dir: &Path, base_url: &str, batch_size: usize) -> SyncConfig {
        SyncConfig {
            input: dir.join("ranks.csv"),
            output: dir.join("output.csv"),
            expansions_output: dir.join("expansion_output.csv"),
            api: ApiConfig {
                base_url: base_url.to_string(),
                batch_size,
                stats: true,
            },
            retry: RetryConfig {
                max_attempts: Some(5),
                delay_secs: 0,
                backoff_cap_secs: None,
            },
            format: OutputConfig::default(),
        }
    }

    const RANKS_CSV: &str = "\
id,name,rank,average,bayesaverage,yearpublished
1,Die Macher,500,7.6,7.1,1986
2,Dragonmaster,4000,6.6,5.9,0
";

    // Items deliberately in reverse order of the request.
    const TWO_ITEMS_REVERSED: &str = r#"
<items>
  <item type="boardgame" id="2">
    <minplayers value="3"/>
    <maxplayers value="4"/>
  </item>
  <item type="boardgame" id="1">
    <minplayers value="3"/>
    <maxplayers value="5"/>
    <link type="boardgameexpansion" id="500" value="Die Macher: Expansion"/>
  </item>
</items>"#;

    #[tokio::test]
    async fn merges_by_id_regardless_of_response_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(query_param("id", "1,2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ITEMS_REVERSED))
            .mount(&server)
            .await;

        let dir = test_dir("order");
        std::fs::write(dir.join("ranks.csv"), RANKS_CSV).unwrap();

        let config = sync_config(&dir, &server.uri(), 20);
        let result = run_sync(&config, &SilentProgress).await.unwrap();

        assert_eq!(result.games_written, 2);
        assert_eq!(result.edges_written, 1);
        assert_eq!(result.batches, 1);

        let output = std::fs::read_to_string(&config.output).unwrap();
        let mut lines = output.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("id,name,"));

        // Document order: item 2 first, each merged with its own source row.
        let first = lines.next().unwrap();
        assert!(first.starts_with("2,Dragonmaster,"));
        assert!(first.contains(",4,")); // max_players from item 2, not item 1
        let second = lines.next().unwrap();
        assert!(second.starts_with("1,Die Macher,"));

        let edges = std::fs::read_to_string(&config.expansions_output).unwrap();
        assert_eq!(edges, "base_id,expansion_id\n1,500\n");
    }

    #[tokio::test]
    async fn year_published_is_copied_and_sentinel_zero_blanked() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ITEMS_REVERSED))
            .mount(&server)
            .await;

        let dir = test_dir("year");
        std::fs::write(dir.join("ranks.csv"), RANKS_CSV).unwrap();

        let config = sync_config(&dir, &server.uri(), 20);
        run_sync(&config, &SilentProgress).await.unwrap();

        let mut reader = csv::Reader::from_path(&config.output).unwrap();
        let headers = reader.headers().unwrap().clone();
        let year_idx = headers.iter().position(|h| h == "year_published").unwrap();

        let records: Vec<csv::StringRecord> =
            reader.records().map(|r| r.unwrap()).collect();
        // Dragonmaster's yearpublished is "0" in the dump: blanked, never "0".
        assert_eq!(&records[0][year_idx], "");
        assert_eq!(&records[1][year_idx], "1986");
    }

    #[tokio::test]
    async fn retry_after_rate_limit_is_transparent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .respond_with(ResponseTemplate::new(200).set_body_string(TWO_ITEMS_REVERSED))
            .mount(&server)
            .await;

        let dir = test_dir("retry");
        std::fs::write(dir.join("ranks.csv"), RANKS_CSV).unwrap();

        let config = sync_config(&dir, &server.uri(), 20);
        let result = run_sync(&config, &SilentProgress).await.unwrap();
        assert_eq!(result.games_written, 2);

        // Same output as an undisturbed run.
        let output = std::fs::read_to_string(&config.output).unwrap();
        assert_eq!(output.lines().count(), 3);
    }

    #[tokio::test]
    async fn fatal_status_aborts_but_keeps_flushed_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(query_param("id", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<items><item type="boardgame" id="1"><minplayers value="3"/></item></items>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/thing"))
            .and(query_param("id", "2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = test_dir("abort");
        std::fs::write(dir.join("ranks.csv"), RANKS_CSV).unwrap();

        // Batch size 1: first batch succeeds, second hits the 404.
        let config = sync_config(&dir, &server.uri(), 1);
        let err = run_sync(&config, &SilentProgress).await.unwrap_err();
        assert!(matches!(err, MeeplesyncError::Http { status: 404, .. }));

        let output = std::fs::read_to_string(&config.output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2); // header + the one flushed row
        assert!(lines[1].starts_with("1,Die Macher,"));
    }
}
