use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("pdf error: {0}")]
    Pdf(String),
    #[error("pdf rasterization support not enabled: {0:?}")]
    RenderSupportDisabled(PathBuf),
    #[error("ocr support not enabled")]
    OcrSupportDisabled,
    #[error("invalid document: {0}")]
    InvalidDocument(&'static str),
    #[error("other: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, FolioError>;

impl From<lopdf::Error> for FolioError {
    fn from(value: lopdf::Error) -> Self {
        Self::Pdf(value.to_string())
    }
}

impl From<pdf_extract::OutputError> for FolioError {
    fn from(value: pdf_extract::OutputError) -> Self {
        Self::Pdf(value.to_string())
    }
}
