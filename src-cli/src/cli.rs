use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "docqa")]
#[command(about = "Ask questions about a folder of documents", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./docqa.toml when present)
    #[arg(short, long, global = true, env = "DOCQA_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build or update the index from the documents directory
    Index {
        /// Documents directory; overrides `documents_dir` from the config
        #[arg(short, long)]
        docs_dir: Option<PathBuf>,

        /// Re-embed everything instead of only changed documents
        #[arg(long)]
        full: bool,
    },

    /// Answer a single question
    Query {
        text: String,

        #[arg(short, long)]
        system_prompt: Option<String>,

        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Minimum similarity for a passage to be used
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Read questions from stdin until `:quit`
    Interactive,

    /// Show what the persisted index contains
    Status,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_query_overrides() {
        let cli = Cli::try_parse_from([
            "docqa", "--config", "alt.toml", "query", "What color is grass?", "-k", "5", "--threshold", "0.2",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
        match cli.command {
            Commands::Query { text, top_k, threshold, system_prompt } => {
                assert_eq!(text, "What color is grass?");
                assert_eq!(top_k, Some(5));
                assert_eq!(threshold, Some(0.2));
                assert_eq!(system_prompt, None);
            }
            _ => panic!("expected query"),
        }
    }

    #[test]
    fn index_defaults_to_incremental() {
        let cli = Cli::try_parse_from(["docqa", "index"]).unwrap();
        assert!(matches!(cli.command, Commands::Index { full: false, docs_dir: None }));
    }
}
