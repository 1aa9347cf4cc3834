use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use folio_llm::{Provider, RetryPolicy};

/// How the document is cut into processing units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisMode {
    /// Pages stacked into bounded-height composite blocks, one unit each.
    CompositeBlocks,
    /// One unit per source page.
    SinglePages,
}

impl AnalysisMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "1" | "composite" | "blocks" => Ok(AnalysisMode::CompositeBlocks),
            "2" | "pages" | "single" => Ok(AnalysisMode::SinglePages),
            other => Err(anyhow!(
                "unknown analysis mode '{}'. choose composite|pages (or 1|2)",
                other
            )),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisMode::CompositeBlocks => "composite",
            AnalysisMode::SinglePages => "pages",
        }
    }
}

/// All pipeline settings, built once at startup and passed by reference.
#[derive(Debug, Clone)]
pub struct FolioConfig {
    pub provider: Provider,
    pub model: String,
    pub ollama_url: String,
    pub retry: RetryPolicy,
    pub mode: AnalysisMode,
    pub dpi: u32,
    pub max_height: u32,
    pub ocr_languages: Vec<String>,
    pub output_dir: PathBuf,
}

impl FolioConfig {
    pub fn from_env() -> Result<Self> {
        let provider_name = env::var("FOLIO_PROVIDER").unwrap_or_else(|_| "ollama".to_string());
        let provider = Provider::from_str(&provider_name)
            .ok_or_else(|| anyhow!(format!("unknown provider {provider_name}")))?;
        let model = env::var("FOLIO_MODEL").unwrap_or_else(|_| default_model(provider).to_string());
        let ollama_url =
            env::var("FOLIO_OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
        Ok(Self {
            provider,
            model,
            ollama_url,
            retry: RetryPolicy::default(),
            mode: AnalysisMode::CompositeBlocks,
            dpi: 300,
            max_height: 20_000,
            ocr_languages: vec!["eng".to_string(), "ita".to_string()],
            output_dir: PathBuf::from("output"),
        })
    }
}

fn default_model(provider: Provider) -> &'static str {
    match provider {
        Provider::Ollama => "qwen2.5vl",
        Provider::Local => "local",
    }
}

pub fn parse_languages(raw: &str) -> Vec<String> {
    let langs: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if langs.is_empty() {
        vec!["eng".to_string()]
    } else {
        langs
    }
}
