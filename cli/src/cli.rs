//! Command line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Semantic search over a folder of documents with cached embeddings.
#[derive(Parser, Debug)]
#[command(name = "docvec")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: the platform config dir, then built-in defaults)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Corpus root directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Embedding provider (overrides the config file)
    #[arg(long, global = true, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Log filter when RUST_LOG is unset (e.g. info, docvec_vector_cache=debug)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add a document and embed it
    Add {
        /// File to add; files outside the corpus root are copied into it
        path: PathBuf,
    },

    /// List cached documents
    List,

    /// Find documents similar to a document id or a piece of text
    Search {
        /// Document id (as shown by `list`) or free text
        query: String,

        /// Minimum cosine similarity in [-1, 1]
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// Embed new and changed documents, pruning deleted ones
    Refresh,

    /// Drop every cached embedding and embed the whole corpus again
    Rebuild,

    /// Drop one cached embedding so the next refresh recomputes it
    Invalidate {
        /// Document id
        doc_id: String,
    },

    /// Show store status
    Status,

    /// Ask questions about the documents; reads one question per line from
    /// stdin when none is given
    Chat {
        /// Question to ask
        question: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ProviderArg {
    Openai,
    Hashing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_search() {
        let cli = Cli::try_parse_from([
            "docvec",
            "--root",
            "/notes",
            "search",
            "notes/a.md",
            "--threshold",
            "0.5",
        ])
        .unwrap();

        assert_eq!(cli.root, Some(PathBuf::from("/notes")));
        match cli.command {
            Commands::Search { query, threshold } => {
                assert_eq!(query, "notes/a.md");
                assert_eq!(threshold, Some(0.5));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["docvec", "status", "--provider", "hashing", "--json"])
            .unwrap();
        assert_eq!(cli.provider, Some(ProviderArg::Hashing));
        assert!(cli.json);
    }
}
