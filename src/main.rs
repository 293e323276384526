//! frank CLI: recursive question answering over knowledge sources.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde_json::{Value, json};

use frank::alist::{Alist, AttrValue, attr};
use frank::config::EngineConfig;
use frank::kb::{KnowledgeSource, StaticSource, Wikidata};
use frank::launcher::{Launcher, SessionRegistry};

#[derive(Parser)]
#[command(name = "frank", version, about = "Recursive question-answering engine")]
struct Cli {
    /// TOML configuration file overlaying the defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// JSON file with local facts to query instead of the live adapters:
    /// {"facts": [{"s", "p", "o", "t"?}, ...], "sub_locations": {place: [..]}}.
    #[arg(long, global = true)]
    facts: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single query alist.
    Query {
        /// The query as an alist JSON object, e.g.
        /// '{"h": "value", "s": "France", "p": "capital", "o": "?y", "v": "?y"}'.
        alist: String,

        /// Context JSON object merged into the query (trust, accuracy,
        /// datetime, place, nationality).
        #[arg(long)]
        context: Option<String>,
    },

    /// Answer a JSON file of queries: [{"id", "alist", "context"?}, ...].
    Batch {
        /// Input file.
        file: PathBuf,

        /// Output file for [{"id", "answer"}, ...]; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

/// Build the launcher from CLI options: a local fact table when one was
/// given, the live Wikidata adapter otherwise.
fn build_launcher(config: EngineConfig, facts: Option<&PathBuf>) -> Result<Launcher> {
    let mut geo = StaticSource::new("geonames");
    let mut sources: Vec<Arc<dyn KnowledgeSource>> = Vec::new();
    match facts {
        Some(path) => {
            let text = std::fs::read_to_string(path).into_diagnostic()?;
            let doc: Value = serde_json::from_str(&text).into_diagnostic()?;
            let mut table = StaticSource::new("facts");
            for fact in doc["facts"].as_array().into_iter().flatten() {
                let (Some(s), Some(p), Some(o)) = (
                    fact["s"].as_str(),
                    fact["p"].as_str(),
                    fact["o"].as_str(),
                ) else {
                    continue;
                };
                match fact["t"].as_str() {
                    Some(t) => table.add_dated_fact(s, p, o, t),
                    None => table.add_fact(s, p, o),
                }
            }
            if let Some(map) = doc["sub_locations"].as_object() {
                for (place, subs) in map {
                    let subs: Vec<&str> = subs
                        .as_array()
                        .into_iter()
                        .flatten()
                        .filter_map(|v| v.as_str())
                        .collect();
                    geo.add_sub_locations(place, subs);
                }
            }
            sources.push(Arc::new(table));
        }
        None => sources.push(Arc::new(Wikidata::new())),
    }
    Ok(Launcher::new(
        config,
        SessionRegistry::new(),
        sources,
        Arc::new(geo),
    ))
}

fn parse_query(alist_json: &str, context_json: Option<&str>) -> Result<Alist> {
    let mut query = Alist::from_json_str(alist_json)?;
    if let Some(cx) = context_json {
        let value: Value = serde_json::from_str(cx).into_diagnostic()?;
        query.set(attr::CONTEXT, AttrValue::from_json(&value));
    }
    query.check_variables();
    Ok(query)
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .build(),
        )
    }))
    .ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_toml_file(path)?,
        None => EngineConfig::default(),
    };
    let launcher = build_launcher(config, cli.facts.as_ref())?;

    match cli.command {
        Commands::Query { alist, context } => {
            let query = parse_query(&alist, context.as_deref())?;
            let snapshot = launcher.start(&alist, &query, "cli");
            println!("{}", serde_json::to_string_pretty(&snapshot).into_diagnostic()?);
        }

        Commands::Batch { file, out } => {
            let text = std::fs::read_to_string(&file).into_diagnostic()?;
            let entries: Vec<Value> = serde_json::from_str(&text).into_diagnostic()?;

            let mut results = Vec::new();
            for (n, entry) in entries.iter().enumerate() {
                let id = entry["id"].clone();
                let context = entry
                    .get("context")
                    .filter(|c| !c.is_null())
                    .map(|c| c.to_string());
                let query = parse_query(&entry["alist"].to_string(), context.as_deref())?;
                let session_id = format!("batch-{n}");
                let snapshot = launcher.start(&entry["alist"].to_string(), &query, &session_id);
                results.push(json!({"id": id, "answer": snapshot.answer}));
            }

            let rendered = serde_json::to_string_pretty(&results).into_diagnostic()?;
            match out {
                Some(path) => std::fs::write(&path, rendered).into_diagnostic()?,
                None => println!("{rendered}"),
            }
        }
    }
    Ok(())
}
