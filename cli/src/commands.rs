//! Command implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use docvec_retrieval::{
    ChatAnswer, ChatSession, DocumentManager, EmbeddingProviderType, OpenAIChatResponder,
    ReconcileReport, RetrievalConfig,
};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ProviderArg};

/// Install the stderr subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolve configuration from the config file and command line overrides.
pub fn load_config(
    config_path: Option<&PathBuf>,
    root: Option<&PathBuf>,
    provider: Option<ProviderArg>,
) -> Result<RetrievalConfig> {
    let mut config = match config_path {
        Some(path) => RetrievalConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => match RetrievalConfig::default_config_path().filter(|p| p.as_path().is_file()) {
            Some(path) => RetrievalConfig::from_toml_file(&path)
                .with_context(|| format!("Failed to load {}", path.display()))?,
            None => RetrievalConfig::default(),
        },
    };

    if let Some(root) = root {
        config.corpus.root = root.clone();
    }
    if let Some(provider) = provider {
        config.embedding.provider = match provider {
            ProviderArg::Openai => EmbeddingProviderType::OpenAI,
            ProviderArg::Hashing => EmbeddingProviderType::Hashing,
        };
    }
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref(), cli.root.as_ref(), cli.provider)?;
    debug!("Corpus root: {}", config.corpus.root.display());
    let chat_config = config.chat.clone();
    let manager = Arc::new(
        DocumentManager::from_config(config)
            .await
            .context("Failed to open document store")?,
    );
    let json = cli.json;

    match cli.command {
        Commands::Add { path } => {
            let report = manager.add(&path).await?;
            print_report(&report, json)?;
        }
        Commands::List => {
            let documents = manager.list().await;
            if json {
                print_json(&documents)?;
            } else if documents.is_empty() {
                println!("No documents cached.");
            } else {
                for doc in &documents {
                    println!(
                        "{}\t{}\t{}\t{}",
                        doc.doc_id,
                        doc.file_type,
                        doc.added.format("%Y-%m-%d %H:%M:%S"),
                        doc.dimension
                    );
                }
            }
        }
        Commands::Search { query, threshold } => {
            let results = manager.search(&query, threshold).await?;
            if json {
                print_json(&results)?;
            } else if results.is_empty() {
                println!("No similar documents.");
            } else {
                for result in &results {
                    println!("{:.4}\t{}", result.score, result.doc_id);
                }
            }
        }
        Commands::Refresh => {
            let report = manager.refresh().await?;
            print_report(&report, json)?;
        }
        Commands::Rebuild => {
            let report = manager.rebuild().await?;
            print_report(&report, json)?;
        }
        Commands::Invalidate { doc_id } => {
            let removed = manager.invalidate(&doc_id).await?;
            if json {
                print_json(&serde_json::json!({ "doc_id": doc_id, "removed": removed }))?;
            } else if removed {
                println!("Invalidated {doc_id}");
            } else {
                println!("No cached embedding for {doc_id}");
            }
        }
        Commands::Status => {
            let status = manager.status().await;
            if json {
                print_json(&status)?;
            } else {
                println!("Documents:   {}", status.count);
                match status.dimension {
                    Some(dimension) => println!("Dimension:   {dimension}"),
                    None => println!("Dimension:   -"),
                }
                println!("Provider:    {}", status.provider);
                println!("Model:       {}", status.model.as_deref().unwrap_or("-"));
                println!(
                    "Last build:  {}",
                    status.last_build_time.map_or_else(
                        || "never".to_string(),
                        |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string()
                    )
                );
                println!("Store:       {}", status.store_path.display());
                if status.quarantined > 0 {
                    println!("Quarantined: {}", status.quarantined);
                }
            }
        }
        Commands::Chat { question } => {
            let responder = OpenAIChatResponder::from_config(&chat_config)
                .context("Chat needs an OpenAI API key")?;
            let mut session = ChatSession::new(manager, Arc::new(responder));
            match question {
                Some(question) => {
                    let answer = session.ask(&question).await?;
                    print_answer(&answer, json)?;
                }
                None => chat_loop(&mut session, json).await?,
            }
        }
    }

    Ok(())
}

async fn chat_loop(session: &mut ChatSession, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        match session.ask(question).await {
            Ok(answer) => print_answer(&answer, json)?,
            Err(e) => warn!("Could not answer: {e}"),
        }
    }
    Ok(())
}

fn print_report(report: &ReconcileReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!("{report}");
    for failure in &report.failed {
        println!("  failed: {}: {}", failure.doc_id, failure.reason);
    }
    for id in &report.orphans_retained {
        println!("  orphaned: {id}");
    }
    if let Some(err) = &report.persist_error {
        bail!("embeddings were computed but not saved: {err}");
    }
    Ok(())
}

fn print_answer(answer: &ChatAnswer, json: bool) -> Result<()> {
    if json {
        return print_json(answer);
    }
    println!("{}", answer.answer);
    if !answer.sources.is_empty() {
        let sources: Vec<&str> = answer.sources.iter().map(|s| s.doc_id.as_str()).collect();
        println!("\nSources: {}", sources.join(", "));
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
