//! Command-line interface for the recommender binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "recommender")]
#[command(version, about = "Recommends catalog assessments for a job description")]
pub struct Cli {
    /// Defaults to `serve`
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP service and the presentation page
    Serve,

    /// Crawl the product catalog, resuming from the saved cursor if one exists
    Crawl {
        /// Discard the saved cursor and start from the first page
        #[arg(long)]
        restart: bool,

        /// Stop after this many listing pages (resume later)
        #[arg(long)]
        max_pages: Option<u32>,
    },

    /// Rebuild the vector index from the catalog file
    Index,

    /// Recall@K of raw vector retrieval over a labelled query set
    Evaluate {
        /// JSON array of {"query", "relevant_urls"}
        #[arg(long, default_value = "train.json")]
        train: PathBuf,

        #[arg(short, long, default_value_t = 10)]
        k: usize,
    },

    /// Run the full pipeline over unlabelled queries and write a CSV
    Predict {
        /// JSON array of {"query"}
        #[arg(long, default_value = "test.json")]
        input: PathBuf,

        #[arg(short, long, default_value = "test_predictions.csv")]
        output: PathBuf,
    },
}
