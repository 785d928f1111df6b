use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fitsearch_core::{Engine, EngineConfig, RawContent};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

/// Flat article record: `{id, title, body, url, timestamp, tags}`.
#[derive(Debug, Deserialize)]
struct InputDoc {
    id: Option<String>,
    title: Option<String>,
    body: String,
    url: String,
    timestamp: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// Either a tagged raw-content record or the flat article format.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InputRecord {
    Raw(RawContent),
    Doc(InputDoc),
}

impl InputRecord {
    fn into_raw(self) -> Result<RawContent> {
        match self {
            InputRecord::Raw(raw) => Ok(raw),
            InputRecord::Doc(doc) => {
                let mut raw = RawContent::plain_text(doc.url, doc.title, doc.body).with_tags(doc.tags);
                raw.id = doc.id;
                if let Some(ts) = doc.timestamp {
                    let at = OffsetDateTime::parse(&ts, &Rfc3339).with_context(|| format!("bad timestamp {ts:?}"))?;
                    raw = raw.with_created_at(at);
                }
                Ok(raw)
            }
        }
    }
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and manage the fitness content search index", long_about = None)]
struct Cli {
    /// Engine configuration (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest JSON/JSONL files (or a directory of them) into an index
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Index directory; created if missing, updated in place otherwise
        #[arg(long)]
        output: String,
    },
    /// Remove a document by id
    Remove {
        #[arg(long)]
        index: String,
        #[arg(long)]
        id: String,
    },
    /// Run a query against an index
    Search {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long)]
        k: Option<usize>,
        /// Require this tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Print document and term counts
    Stats {
        #[arg(long)]
        index: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Build { input, output } => {
            let summary = build_index(&input, &output, &config)?;
            println!("{}", serde_json::json!({ "indexed": summary.indexed, "failed": summary.failed }));
            Ok(())
        }
        Commands::Remove { index, id } => {
            let engine = Engine::open(&index, &config)?;
            engine.remove(&id);
            engine.close()?;
            Ok(())
        }
        Commands::Search { index, q, k, tags } => {
            let engine = Engine::open(&index, &config)?;
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            let results = engine.search(&q, &tags, k.unwrap_or(config.search.default_k))?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Stats { index } => {
            let engine = Engine::open(&index, &config)?;
            let store = engine.store();
            println!("{}", serde_json::json!({ "num_docs": store.len(), "num_terms": store.num_terms() }));
            Ok(())
        }
    }
}

/// Counts from one `build` run.
#[derive(Debug, Default, PartialEq, Eq)]
struct BuildSummary {
    indexed: usize,
    failed: usize,
}

fn build_index(input: &str, output: &str, config: &EngineConfig) -> Result<BuildSummary> {
    let input_path = Path::new(input);
    let files = collect_inputs(input_path);
    if files.is_empty() {
        anyhow::bail!("no .json or .jsonl inputs found at {input}");
    }
    let engine = Engine::open(output, config)?;

    let mut summary = BuildSummary::default();
    for file in files {
        let records = if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
            read_jsonl(&file)
        } else {
            read_json(&file)
        };
        let records = match records {
            Ok(records) => records,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(file = %file.display(), error = %e, "skipped unreadable file");
                continue;
            }
        };
        for record in records {
            match record.and_then(|r| r.into_raw()).and_then(|raw| Ok(engine.ingest(raw)?)) {
                Ok(_) => summary.indexed += 1,
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(file = %file.display(), error = %e, "skipped record");
                }
            }
        }
    }

    tracing::info!(
        indexed = summary.indexed,
        failed = summary.failed,
        num_docs = engine.store().len(),
        num_terms = engine.store().num_terms(),
        "ingested documents"
    );
    engine.close()?;
    tracing::info!(output, "index build complete");
    Ok(summary)
}

fn collect_inputs(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    }
    files
}

/// One entry per non-blank line; a malformed line is an `Err` in place, not a failure of the file.
fn read_jsonl(file: &Path) -> Result<Vec<Result<InputRecord>>> {
    let reader = BufReader::new(File::open(file)?);
    let mut out = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let record = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: not a valid record", file.display(), n + 1));
        out.push(record);
    }
    Ok(out)
}

/// An object or an array of objects; each array element is parsed on its own.
fn read_json(file: &Path) -> Result<Vec<Result<InputRecord>>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let values = match json {
        serde_json::Value::Array(arr) => arr,
        v @ serde_json::Value::Object(_) => vec![v],
        _ => anyhow::bail!("{}: expected an object or array", file.display()),
    };
    Ok(values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value(v).with_context(|| format!("{}[{i}]: not a valid record", file.display()))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn flat_records_become_plain_text() {
        let rec: InputRecord = serde_json::from_str(
            r#"{"id":"a1","title":"Squats","body":"squats build leg strength","url":"https://fit.example/a1","timestamp":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let raw = rec.into_raw().unwrap();
        assert_eq!(raw.id.as_deref(), Some("a1"));
        assert_eq!(raw.kind(), "plain_text");
        assert!(raw.created_at.is_some());
    }

    #[test]
    fn tagged_records_pass_through() {
        let rec: InputRecord = serde_json::from_str(
            r#"{"kind":"html","source_uri":"https://fit.example/p","html":"<p>plank</p>"}"#,
        )
        .unwrap();
        assert_eq!(rec.into_raw().unwrap().kind(), "html");
    }

    #[test]
    fn build_skips_malformed_records_and_still_writes_the_index() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("mixed.jsonl");
        fs::write(
            &input,
            concat!(
                r#"{"id":"a1","body":"goblet squats","url":"https://fit.example/a1"}"#, "\n",
                "{not json\n",
                r#"{"id":"a3","body":"walking lunges","url":"https://fit.example/a3"}"#, "\n",
            ),
        )
        .unwrap();
        let json = dir.path().join("plans.json");
        fs::write(&json, r#"[{"id":"p1","body":"push press","url":"https://fit.example/p1"}, 42]"#).unwrap();

        let output = dir.path().join("index");
        let config = EngineConfig::default();
        let summary = build_index(dir.path().to_str().unwrap(), output.to_str().unwrap(), &config).unwrap();
        assert_eq!(summary, BuildSummary { indexed: 3, failed: 2 });
        assert!(output.join("meta.json").is_file());

        let engine = Engine::open(&output, &config).unwrap();
        assert_eq!(engine.store().len(), 3);
        assert!(engine.get("a3").is_ok());
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        let rec: InputRecord = serde_json::from_str(
            r#"{"body":"rows","url":"https://fit.example/r","timestamp":"yesterday"}"#,
        )
        .unwrap();
        assert!(rec.into_raw().is_err());
    }
}
