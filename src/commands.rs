//! CLI command implementations.
//!
//! Each `run_*` function backs one `rag` subcommand and prints its result to
//! stdout. Diagnostics go through `tracing` (stderr) so stdout stays
//! parseable, in particular for `rag search --json`.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::SearchResult;
use crate::retrieval::render_prompt;
use crate::service::RagService;
use crate::summarize::{summarize_file, DEFAULT_MAX_SENTENCES};

/// Chunk a documents directory and build the index over it.
pub async fn run_ingest(config: &Config, dir: &Path) -> Result<()> {
    let service = RagService::new(config.clone())?;
    let vectors = service.build_index(dir).await?;
    println!("ingest {}", dir.display());
    println!("  chunks indexed: {}", vectors);
    println!("  provider: {}", service.provider().provider_key());
    println!("  data dir: {}", config.data.dir.display());
    println!("ok");
    Ok(())
}

/// Re-embed the stored corpus and rebuild the index.
pub async fn run_build(config: &Config) -> Result<()> {
    let service = RagService::new(config.clone())?;
    let vectors = service.rebuild().await?;
    println!("build");
    println!("  chunks indexed: {}", vectors);
    println!("  provider: {}", service.provider().provider_key());
    println!("ok");
    Ok(())
}

/// Rebuild the index from the stored matrix without re-embedding.
pub async fn run_reindex(config: &Config) -> Result<()> {
    let service = RagService::new(config.clone())?;
    let vectors = service.rebuild_from_saved().await?;
    println!("reindex");
    println!("  vectors indexed: {}", vectors);
    println!("ok");
    Ok(())
}

pub async fn run_search(config: &Config, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let service = RagService::new(config.clone())?;
    let top_k = top_k.unwrap_or(config.retrieval.search_k);
    let results = service.search(query, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }
    print_results(&results);
    Ok(())
}

fn print_results(results: &[SearchResult]) {
    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.2}] {}", i + 1, result.score, result.doc_id);
        println!(
            "    excerpt: \"{}\"",
            excerpt(&result.text, 160).replace('\n', " ").trim()
        );
        println!("    id: {}", result.chunk_id);
        println!();
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().nth(max_chars).is_some() {
        out.push_str("...");
    }
    out
}

/// Print the answer context, sources and (optionally) the generator prompt.
pub async fn run_ask(config: &Config, query: &str, show_prompt: bool) -> Result<()> {
    let service = RagService::new(config.clone())?;
    let answer = service.answer_context(query).await?;

    println!("--- Context ---");
    println!("{}", answer.context);
    println!();
    println!("--- Sources ---");
    if answer.sources.is_empty() {
        println!("(none)");
    }
    for source in &answer.sources {
        println!("[{:.2}] {}", source.score, source.doc_id);
    }
    if show_prompt {
        println!();
        println!("--- Prompt ---");
        print!("{}", render_prompt(query, &answer.context));
    }
    Ok(())
}

pub fn run_summarize(files: &[PathBuf]) -> Result<()> {
    for path in files {
        let summary = summarize_file(path, DEFAULT_MAX_SENTENCES)?;
        println!("{}", path.display());
        println!("    {}", summary);
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt() {
        assert_eq!(excerpt("short", 10), "short");
        assert_eq!(excerpt("abcdef", 3), "abc...");
    }
}
