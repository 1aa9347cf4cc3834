mod compositor;
mod error;
mod ocr;
mod parser;
mod pdf;
mod record;
mod render;
mod sql;

pub use compositor::{compose_blocks, ImageBlock, PageImage};
pub use error::{FolioError, Result};
pub use ocr::{image_to_text, preprocess};
pub use parser::parse_model_json;
pub use pdf::{extract_embedded_images, extract_page_texts};
pub use record::{AnalysisRecord, TAG_SOFT_CAP};
pub use render::rasterize_pages;
pub use sql::generate_feature_sql;
