use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "folio", about = "Analysis pipeline for scanned medieval-history documents")]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the full analysis pipeline over a PDF document.
    Analyze {
        pdf: PathBuf,
        /// 1/composite = bounded-height composite blocks, 2/pages = one unit per page
        #[arg(long, default_value = "composite")]
        mode: String,
        #[arg(long, default_value_t = 300)]
        dpi: u32,
        #[arg(long = "max-height", default_value_t = 20_000)]
        max_height: u32,
        #[arg(long = "ocr-langs", default_value = "eng,ita")]
        ocr_langs: String,
        #[arg(long, default_value = "output")]
        out: PathBuf,
    },
    /// Dump per-page text and embedded images without calling any model.
    Extract {
        pdf: PathBuf,
        #[arg(long, default_value = "immagini_estratte")]
        out: PathBuf,
    },
    /// Query a persisted vector index.
    Search {
        query: String,
        #[arg(long = "top-k", default_value_t = 5)]
        top_k: usize,
        #[arg(long = "index-dir", default_value = "output")]
        index_dir: PathBuf,
    },
}
