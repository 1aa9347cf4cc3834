use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::embedding::{l2_normalize, EmbeddingClient};

const MAGIC: &[u8; 8] = b"FOLIOIDX";
const VERSION: u32 = 1;

/// Dense vector store with a parallel metadata list.
///
/// The vector at position `i` corresponds to the metadata object at
/// position `i`; every mutation preserves that correspondence. Entries are
/// append-only. The store and its metadata persist as a matched pair of
/// files that are only valid together.
#[derive(Debug)]
pub struct VectorIndex {
    embedder: EmbeddingClient,
    dimensions: Option<usize>,
    vectors: Vec<Vec<f32>>,
    metadata: Vec<Map<String, Value>>,
}

impl VectorIndex {
    pub fn new(embedder: EmbeddingClient) -> Self {
        Self {
            embedder,
            dimensions: None,
            vectors: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions
    }

    /// Embeds and appends `texts` with their paired metadata.
    ///
    /// The two slices must be parallel; a length mismatch is a programming
    /// error and panics. The store's dimensionality is fixed by the first
    /// vector ever added.
    pub fn add_texts(&mut self, texts: &[String], metadatas: &[Map<String, Value>]) -> Result<()> {
        assert_eq!(
            texts.len(),
            metadatas.len(),
            "texts and metadatas must have the same length"
        );
        if texts.is_empty() {
            return Ok(());
        }
        let embedded = self.embedder.embed_batch(texts)?;
        if embedded.len() != texts.len() {
            bail!(
                "embedding backend returned {} vectors for {} texts",
                embedded.len(),
                texts.len()
            );
        }
        for (mut vector, meta) in embedded.into_iter().zip(metadatas.iter()) {
            if vector.is_empty() {
                bail!("embedding backend returned an empty vector");
            }
            match self.dimensions {
                None => self.dimensions = Some(vector.len()),
                Some(dims) if dims != vector.len() => bail!(
                    "embedding dimension changed from {dims} to {}",
                    vector.len()
                ),
                Some(_) => {}
            }
            l2_normalize(&mut vector);
            self.vectors.push(vector);
            self.metadata.push(meta.clone());
        }
        debug_assert_eq!(self.vectors.len(), self.metadata.len());
        Ok(())
    }

    /// Returns up to `k` metadata objects nearest to `query` by inner
    /// product, each annotated with a `score` field, best first.
    pub fn search(&self, query: &str, k: usize) -> Result<Vec<Map<String, Value>>> {
        if self.vectors.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut query_vector = self.embedder.embed(query)?;
        let dims = self
            .dimensions
            .ok_or_else(|| anyhow!("index has vectors but no dimensionality"))?;
        if query_vector.len() != dims {
            bail!(
                "query embedding has {} dimensions, index has {dims}",
                query_vector.len()
            );
        }
        l2_normalize(&mut query_vector);
        let mut scored: Vec<(f32, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (dot(&query_vector, v), i))
            .filter(|(score, _)| score.is_finite())
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        let mut hits = Vec::with_capacity(scored.len());
        for (score, idx) in scored {
            let mut item = self.metadata[idx].clone();
            item.insert(
                "score".to_string(),
                Number::from_f64(f64::from(score))
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
            );
            hits.push(item);
        }
        Ok(hits)
    }

    /// Writes the vector file and the metadata file as a matched pair.
    pub fn save(&self, vector_path: &Path, meta_path: &Path) -> Result<()> {
        let dims = self.dimensions.unwrap_or(0);
        let file = File::create(vector_path)
            .with_context(|| format!("failed to create {}", vector_path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(dims as u32).to_le_bytes())?;
        writer.write_all(&(self.vectors.len() as u32).to_le_bytes())?;
        for vector in &self.vectors {
            for value in vector {
                writer.write_all(&value.to_le_bytes())?;
            }
        }
        writer.flush()?;

        let meta_file = File::create(meta_path)
            .with_context(|| format!("failed to create {}", meta_path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(meta_file), &self.metadata)?;
        debug!(
            entries = self.vectors.len(),
            vector_path = %vector_path.display(),
            "index persisted"
        );
        Ok(())
    }

    /// Restores an index from its companion files.
    ///
    /// Both files must exist and describe the same construction; any
    /// mismatch (magic, version, entry counts) fails fast.
    pub fn load(embedder: EmbeddingClient, vector_path: &Path, meta_path: &Path) -> Result<Self> {
        if !vector_path.exists() || !meta_path.exists() {
            bail!(
                "both companion files are required: {} and {}",
                vector_path.display(),
                meta_path.display()
            );
        }
        let file = File::open(vector_path)
            .with_context(|| format!("failed to open {}", vector_path.display()))?;
        let mut reader = BufReader::new(file);
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if &magic != MAGIC {
            bail!("{} is not a folio vector file", vector_path.display());
        }
        let version = read_u32(&mut reader)?;
        if version != VERSION {
            bail!("unsupported vector file version {version}");
        }
        let dims = read_u32(&mut reader)? as usize;
        let count = read_u32(&mut reader)? as usize;
        let mut vectors = Vec::with_capacity(count);
        let mut row = vec![0u8; dims * 4];
        for _ in 0..count {
            reader.read_exact(&mut row)?;
            let vector: Vec<f32> = row
                .chunks_exact(4)
                .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
                .collect();
            vectors.push(vector);
        }

        let meta_file = File::open(meta_path)
            .with_context(|| format!("failed to open {}", meta_path.display()))?;
        let metadata: Vec<Map<String, Value>> = serde_json::from_reader(BufReader::new(meta_file))
            .with_context(|| format!("invalid metadata file {}", meta_path.display()))?;
        if metadata.len() != count {
            bail!(
                "vector file holds {count} entries but metadata file holds {}; the pair does not match",
                metadata.len()
            );
        }
        Ok(Self {
            embedder,
            dimensions: Some(dims).filter(|d| *d > 0),
            vectors,
            metadata,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}
