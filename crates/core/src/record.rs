use std::path::PathBuf;

use serde::Serialize;

/// Soft cap on tags kept per record; parses exceeding it are truncated.
pub const TAG_SOFT_CAP: usize = 15;

/// Everything accumulated for one processing unit (a composite block or a
/// single page). All fields are declared upfront and filled additively as
/// pipeline stages complete.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisRecord {
    pub pages: Vec<u32>,
    pub ocr_text: Option<String>,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub embedded_images: Vec<PathBuf>,
    pub sql: Option<String>,
}

impl AnalysisRecord {
    pub fn for_pages(pages: Vec<u32>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_starts_with_pages_and_empty_stages() {
        let record = AnalysisRecord::for_pages(vec![3, 4]);
        assert_eq!(record.pages, vec![3, 4]);
        assert!(record.ocr_text.is_none());
        assert!(record.summary.is_none());
        assert!(record.tags.is_empty());
        assert!(record.sql.is_none());
    }
}
