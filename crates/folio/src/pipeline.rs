use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbImage};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use folio_core::{
    compose_blocks, extract_embedded_images, extract_page_texts, generate_feature_sql,
    image_to_text, parse_model_json, rasterize_pages, AnalysisRecord, TAG_SOFT_CAP,
};
use folio_index::{EmbeddingClient, VectorIndex};
use folio_llm::{GenerationClient, GenerationRequest};

use crate::config::{AnalysisMode, FolioConfig};

const JPEG_QUALITY: u8 = 95;
const OCR_CONTEXT_CHARS: usize = 4000;
pub const VECTOR_FILE: &str = "index.folio";
pub const META_FILE: &str = "index_meta.json";
pub const RESULT_FILE: &str = "risultato.json";

const ANALYSIS_PROMPT: &str = "\
Agisci come un esperto di storia medievale italiana e analista di documenti accademici. Ti fornir\u{f2}:
- Un'immagine contenente una o pi\u{f9} pagine di un documento storico medievale.
- Il testo estratto tramite OCR.

Il tuo compito \u{e8}:
1. Leggere e comprendere il contenuto testuale.
2. Generare un riassunto coerente dei contenuti storici del documento.
3. Identificare al massimo 15 parole chiave (tags) che descrivono i contenuti.

Il risultato che mi restituisci deve essere formattato come JSON nel seguente modo:

{
  \"riassunto\": \"Testo riassuntivo dei contenuti storici...\",
  \"tags\": [\"tag1\", \"tag2\"]
}
";

/// One item processed end to end: a composite block or a single page.
pub struct Unit {
    pub id: u32,
    pub pages: Vec<u32>,
    pub image: RgbImage,
}

/// Stage a unit was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStage {
    Ocr,
    Model,
    Parse,
    Sql,
    Index,
}

impl UnitStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitStage::Ocr => "ocr",
            UnitStage::Model => "model",
            UnitStage::Parse => "parse",
            UnitStage::Sql => "sql",
            UnitStage::Index => "index",
        }
    }
}

/// Typed per-unit result: one unit's failure never aborts the run.
pub enum UnitOutcome {
    Completed(AnalysisRecord),
    Failed { stage: UnitStage, reason: String },
}

pub struct UnitReport {
    pub unit_id: u32,
    pub pages: Vec<u32>,
    pub outcome: UnitOutcome,
}

/// Runs the full analysis pipeline over a PDF and returns the final
/// structured report. Only setup errors (unopenable or unrasterizable
/// document) abort the run.
pub fn run_analysis(config: &FolioConfig, pdf: &Path) -> Result<Value> {
    let pages = rasterize_pages(pdf, config.dpi)
        .with_context(|| format!("failed to rasterize {}", pdf.display()))?;
    info!(
        pages = pages.len(),
        mode = config.mode.as_str(),
        "document rasterized"
    );
    prepare_output_dir(&config.output_dir)?;

    let images_by_page =
        match extract_embedded_images(pdf, &config.output_dir.join("immagini")) {
            Ok(map) => map,
            Err(err) => {
                warn!(%err, "embedded image extraction failed, continuing without");
                BTreeMap::new()
            }
        };

    let units = build_units(config.mode, pages, config.max_height);
    write_unit_images(&units, config.mode, &config.output_dir)?;

    let client =
        GenerationClient::new(config.provider, config.model.clone(), config.ollama_url.clone())
            .with_policy(config.retry);
    let mut index = VectorIndex::new(EmbeddingClient::from_env()?);
    let source = pdf.display().to_string();
    let languages = config.ocr_languages.clone();

    let reports = process_units(
        &units,
        &source,
        &images_by_page,
        &mut index,
        &|image: &RgbImage| {
            Ok(image_to_text(&DynamicImage::ImageRgb8(image.clone()), &languages)?)
        },
        &|request: &GenerationRequest| client.generate(request),
    );

    // Save failures are logged without rolling back in-memory state.
    let vector_path = config.output_dir.join(VECTOR_FILE);
    let meta_path = config.output_dir.join(META_FILE);
    if let Err(err) = index.save(&vector_path, &meta_path) {
        warn!(%err, "failed to persist vector index");
    }

    let report = assemble_report(&reports);
    let result_path = config.output_dir.join(RESULT_FILE);
    serde_json::to_writer_pretty(
        BufWriter::new(
            File::create(&result_path)
                .with_context(|| format!("failed to create {}", result_path.display()))?,
        ),
        &report,
    )?;
    Ok(report)
}

/// Cuts the rasterized pages into processing units for the given mode.
pub fn build_units(
    mode: AnalysisMode,
    pages: Vec<folio_core::PageImage>,
    max_height: u32,
) -> Vec<Unit> {
    match mode {
        AnalysisMode::CompositeBlocks => compose_blocks(&pages, max_height)
            .into_iter()
            .map(|block| Unit {
                id: block.id,
                pages: block.pages,
                image: block.canvas,
            })
            .collect(),
        AnalysisMode::SinglePages => pages
            .into_iter()
            .map(|page| Unit {
                id: page.number,
                pages: vec![page.number],
                image: page.pixels,
            })
            .collect(),
    }
}

/// Drives every unit through OCR, model call, parse, SQL derivation, and
/// index ingestion. Units are processed sequentially and independently.
pub fn process_units(
    units: &[Unit],
    source: &str,
    images_by_page: &BTreeMap<u32, Vec<PathBuf>>,
    index: &mut VectorIndex,
    ocr: &impl Fn(&RgbImage) -> Result<String>,
    invoke: &impl Fn(&GenerationRequest) -> Result<String>,
) -> Vec<UnitReport> {
    let total = units.len();
    let mut reports = Vec::with_capacity(total);
    for (position, unit) in units.iter().enumerate() {
        info!(
            unit = unit.id,
            pages = ?unit.pages,
            "processing unit ({}/{})",
            position + 1,
            total
        );
        let outcome = process_unit(unit, source, images_by_page, index, ocr, invoke);
        if let UnitOutcome::Failed { stage, reason } = &outcome {
            warn!(
                unit = unit.id,
                stage = stage.as_str(),
                reason = %reason,
                "unit failed, continuing with the rest"
            );
        }
        reports.push(UnitReport {
            unit_id: unit.id,
            pages: unit.pages.clone(),
            outcome,
        });
    }
    reports
}

fn process_unit(
    unit: &Unit,
    source: &str,
    images_by_page: &BTreeMap<u32, Vec<PathBuf>>,
    index: &mut VectorIndex,
    ocr: &impl Fn(&RgbImage) -> Result<String>,
    invoke: &impl Fn(&GenerationRequest) -> Result<String>,
) -> UnitOutcome {
    let mut record = AnalysisRecord::for_pages(unit.pages.clone());
    record.embedded_images = unit
        .pages
        .iter()
        .filter_map(|page| images_by_page.get(page))
        .flatten()
        .cloned()
        .collect();

    let ocr_text = match ocr(&unit.image) {
        Ok(text) => text,
        Err(err) => {
            return UnitOutcome::Failed {
                stage: UnitStage::Ocr,
                reason: err.to_string(),
            }
        }
    };
    record.ocr_text = Some(ocr_text.clone());

    let prompt = format!(
        "{ANALYSIS_PROMPT}\nPagine incluse nell'immagine: {}\n\nTesto estratto OCR:\n{}",
        format_pages(&unit.pages),
        ocr_text
    );
    let image_payload = match encode_jpeg(&unit.image) {
        Ok(bytes) => bytes,
        Err(err) => {
            return UnitOutcome::Failed {
                stage: UnitStage::Model,
                reason: format!("failed to encode unit image: {err}"),
            }
        }
    };
    let raw_response = match invoke(&GenerationRequest {
        prompt,
        image: Some(image_payload),
    }) {
        Ok(text) => text,
        Err(err) => {
            return UnitOutcome::Failed {
                stage: UnitStage::Model,
                reason: err.to_string(),
            }
        }
    };

    let mut extra = Map::new();
    extra.insert("pagine".to_string(), json!(unit.pages));
    let Some(parsed) = parse_model_json(&raw_response, &extra) else {
        return UnitOutcome::Failed {
            stage: UnitStage::Parse,
            reason: "model response is not a JSON object".to_string(),
        };
    };
    let Some(summary) = parsed.get("riassunto").and_then(Value::as_str) else {
        return UnitOutcome::Failed {
            stage: UnitStage::Parse,
            reason: "model response is missing 'riassunto'".to_string(),
        };
    };
    let mut tags: Vec<String> = parsed
        .get("tags")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    tags.truncate(TAG_SOFT_CAP);
    record.summary = Some(summary.to_string());
    record.tags = tags.clone();

    let sql = generate_feature_sql(summary, &tags, &unit.pages);
    record.sql = Some(sql);

    let blob = format!(
        "{summary}\nTags: {}\n{}",
        tags.join(", "),
        truncate_chars(&ocr_text, OCR_CONTEXT_CHARS)
    );
    let mut metadata = Map::new();
    metadata.insert("fonte".to_string(), json!(source));
    metadata.insert("unita".to_string(), json!(unit.id));
    metadata.insert("pagine".to_string(), json!(unit.pages));
    metadata.insert("riassunto".to_string(), json!(summary));
    metadata.insert("tags".to_string(), json!(tags));
    metadata.insert(
        "immagini".to_string(),
        json!(record
            .embedded_images
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<String>>()),
    );
    if let Err(err) = index.add_texts(&[blob], &[metadata]) {
        return UnitOutcome::Failed {
            stage: UnitStage::Index,
            reason: err.to_string(),
        };
    }

    UnitOutcome::Completed(record)
}

/// Final report: one entry per completed unit. Failures are logged by the
/// orchestrator and reflected only in the entry count.
pub fn assemble_report(reports: &[UnitReport]) -> Value {
    let entries: Vec<Value> = reports
        .iter()
        .filter_map(|report| match &report.outcome {
            UnitOutcome::Completed(record) => Some(json!({
                "riassunto": record.summary,
                "tags": record.tags,
                "pagine": record.pages,
                "query": record.sql,
            })),
            UnitOutcome::Failed { .. } => None,
        })
        .collect();
    Value::Array(entries)
}

/// Dumps per-page text and embedded images without touching any model.
pub fn run_extract(pdf: &Path, out_dir: &Path) -> Result<Value> {
    fs::create_dir_all(out_dir)?;
    let texts = extract_page_texts(pdf)
        .with_context(|| format!("failed to extract text from {}", pdf.display()))?;
    let images_by_page = extract_embedded_images(pdf, out_dir)
        .with_context(|| format!("failed to extract images from {}", pdf.display()))?;
    let mut result = Map::new();
    for (i, text) in texts.iter().enumerate() {
        let page = i as u32 + 1;
        let images: Vec<String> = images_by_page
            .get(&page)
            .map(|paths| paths.iter().map(|p| p.display().to_string()).collect())
            .unwrap_or_default();
        result.insert(
            page.to_string(),
            json!({ "testo": text, "immagini": images }),
        );
    }
    let report = Value::Object(result);
    let result_path = out_dir.join(RESULT_FILE);
    serde_json::to_writer_pretty(
        BufWriter::new(File::create(&result_path)?),
        &report,
    )?;
    Ok(report)
}

/// Loads the persisted index pair and runs a similarity query.
pub fn run_search(query: &str, top_k: usize, index_dir: &Path) -> Result<Value> {
    let index = VectorIndex::load(
        EmbeddingClient::from_env()?,
        &index_dir.join(VECTOR_FILE),
        &index_dir.join(META_FILE),
    )?;
    let hits = index.search(query, top_k)?;
    Ok(json!(hits))
}

fn prepare_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn write_unit_images(units: &[Unit], mode: AnalysisMode, out_dir: &Path) -> Result<()> {
    for unit in units {
        let name = match mode {
            AnalysisMode::CompositeBlocks => format!("blocco_{}.jpg", unit.id),
            AnalysisMode::SinglePages => format!("pagina_{}.jpg", unit.id),
        };
        let path = out_dir.join(name);
        let mut file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        JpegEncoder::new_with_quality(&mut file, JPEG_QUALITY)
            .write_image(
                unit.image.as_raw(),
                unit.image.width(),
                unit.image.height(),
                ColorType::Rgb8.into(),
            )
            .with_context(|| format!("failed to encode {}", path.display()))?;
    }
    Ok(())
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgb8.into(),
    )?;
    Ok(buffer)
}

fn format_pages(pages: &[u32]) -> String {
    pages
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<String>>()
        .join(", ")
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
