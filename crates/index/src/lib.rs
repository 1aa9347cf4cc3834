mod embedding;
mod store;

pub use embedding::{
    EmbeddingBackend, EmbeddingClient, HashEmbedder, HashEmbedderConfig, OllamaEmbeddingClient,
};
pub use store::VectorIndex;
