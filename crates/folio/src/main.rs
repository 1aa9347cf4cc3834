mod cli;
mod config;
mod pipeline;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::config::{parse_languages, AnalysisMode, FolioConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Analyze {
            pdf,
            mode,
            dpi,
            max_height,
            ocr_langs,
            out,
        } => {
            let mut config = FolioConfig::from_env()?;
            config.mode = AnalysisMode::parse(&mode)?;
            config.dpi = dpi;
            config.max_height = max_height;
            config.ocr_languages = parse_languages(&ocr_langs);
            config.output_dir = out;
            let report = pipeline::run_analysis(&config, &pdf)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Extract { pdf, out } => {
            let report = pipeline::run_extract(&pdf, &out)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Search {
            query,
            top_k,
            index_dir,
        } => {
            let hits = pipeline::run_search(&query, top_k, &index_dir)?;
            println!("{}", serde_json::to_string_pretty(&hits)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
