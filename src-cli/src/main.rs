use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Parser;
use docqa_ai::ollama::OllamaClient;
use docqa_ai::{Answer, EngineDeps, IndexStats, Query, QueryEngine, RebuildMode};
use docqa_core::config::{AppConfig, ProviderKind};

mod cli;
mod logging;

use cli::{Cli, Commands};

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.log);
    tracing::debug!(
        config = ?cli.config,
        documents_dir = %config.documents_dir.display(),
        "docqa starting"
    );

    let deps = EngineDeps::from_config(&config).context("configuring model providers")?;
    let engine = QueryEngine::open(&config, deps).context("opening index state")?;

    match cli.command {
        Commands::Index { docs_dir, full } => {
            let dir = docs_dir.unwrap_or_else(|| config.documents_dir.clone());
            let mode = if full { RebuildMode::Full } else { RebuildMode::Incremental };
            let stats = engine
                .rebuild(&dir, mode)
                .with_context(|| format!("indexing {}", dir.display()))?;
            print_stats(&stats);
        }
        Commands::Query {
            text,
            system_prompt,
            top_k,
            threshold,
        } => {
            build_if_missing(&engine)?;
            let answer = engine
                .answer_with(&Query {
                    text,
                    system_prompt,
                    top_k,
                    similarity_threshold: threshold,
                })
                .context("answering question")?;
            print_answer(&answer);
        }
        Commands::Interactive => {
            build_if_missing(&engine)?;
            interactive(&engine)?
        }
        Commands::Status => {
            let s = engine.status().context("reading index status")?;
            println!("state dir:   {}", config.state_dir.display());
            println!("generation:  {}", s.generation.as_deref().unwrap_or("(none)"));
            println!("documents:   {}", s.documents);
            println!("entries:     {}", s.entries);
            println!("model:       {}", s.embedding_model);
            println!("dimension:   {}", s.dimension);
            println!("metric:      {}", s.metric.as_str());
            println!("backend:     {:?}", s.backend);
            println!("updated at:  {}", s.updated_at.as_deref().unwrap_or("-"));
            print_provider_health(&config);
        }
    }
    Ok(())
}

/// First use against an empty state directory indexes the configured documents.
fn build_if_missing(engine: &QueryEngine) -> Result<()> {
    let built = engine
        .ensure_index()
        .with_context(|| format!("building the initial index from {}", engine.documents_dir().display()))?;
    if let Some(stats) = built {
        eprintln!(
            "indexed {} document(s) into {} chunk(s)",
            stats.documents_processed, stats.chunks_created
        );
    }
    Ok(())
}

fn interactive(engine: &QueryEngine) -> Result<()> {
    println!("Ask a question. Commands: :index, :reload, :prompt <text>, :quit");
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("> ");
        io::stdout().flush().context("writing prompt")?;
        let Some(line) = lines.next() else { break };
        let line = line.context("reading stdin")?;
        let line = line.trim();

        let result = match line {
            "" => continue,
            ":quit" | ":q" | ":exit" => break,
            ":index" => engine
                .rebuild(engine.documents_dir(), RebuildMode::Incremental)
                .map(|s| print_stats(&s)),
            ":reload" => engine.reload().map(|g| {
                println!("reloaded {}", g.as_deref().unwrap_or("empty index"));
            }),
            _ if line.starts_with(":prompt") => engine
                .set_system_prompt(line.trim_start_matches(":prompt").trim())
                .map(|()| println!("system prompt updated")),
            _ => engine.answer(line, None).map(|a| print_answer(&a)),
        };
        // A failed turn is reported and the loop carries on.
        if let Err(e) = result {
            eprintln!("error: {e}");
        }
    }
    Ok(())
}

fn print_provider_health(config: &AppConfig) {
    let providers = [
        ("embedding", config.embedding.provider, &config.embedding.base_url),
        ("generation", config.generation.provider, &config.generation.base_url),
    ];
    for (role, provider, base_url) in providers {
        if provider != ProviderKind::Ollama {
            continue;
        }
        match OllamaClient::new(base_url).and_then(|c| c.health_check()) {
            Ok(()) => println!("{role:<13}ollama at {base_url} is reachable"),
            Err(e) => println!("{role:<13}ollama at {base_url} is unreachable: {e}"),
        }
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.text.trim());
    if answer.sources.is_empty() {
        println!("\n(no matching passages)");
        return;
    }
    println!("\nSources:");
    for (i, s) in answer.sources.iter().enumerate() {
        println!("  {}. {} #{} (score {:.3})", i + 1, s.document_id, s.position, s.score);
    }
}

fn print_stats(stats: &IndexStats) {
    let row = |label: &str, value: &dyn std::fmt::Display| println!("{label:<22}{value}");
    row("mode", &format!("{:?}", stats.mode.unwrap_or(RebuildMode::Full)));
    row("documents processed", &stats.documents_processed);
    row("documents skipped", &stats.documents_skipped);
    row("documents removed", &stats.documents_removed);
    row("chunks created", &stats.chunks_created);
    row("chunks removed", &stats.chunks_removed);
    row("embeddings computed", &stats.embeddings_computed);
    row("generation", &stats.generation.as_deref().unwrap_or("(unchanged)"));
    row("duration", &format!("{} ms", stats.duration_ms));
    if !stats.errors.is_empty() {
        println!("\n{} document(s) failed:", stats.errors.len());
        for e in &stats.errors {
            println!("  {} [{}] {}", e.document_id, e.code, e.message);
        }
    }
}
