//! Request and result types

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::capability::{Language, Modality};
use crate::pool::WorkerKey;

/// Detection granularity forwarded to the worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    #[default]
    Word,
    Line,
    Paragraph,
    Page,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Word => "word",
            Level::Line => "line",
            Level::Paragraph => "paragraph",
            Level::Page => "page",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One OCR batch
#[derive(Debug, Clone)]
pub struct OcrRequest {
    /// Raw image bytes, in result order
    pub images: Vec<Vec<u8>>,
    pub modality: Modality,
    pub language: Language,
    pub version: String,
    pub level: Level,
    /// Skip the load step; the caller asserts the worker is already up
    pub preloaded: bool,
    /// Return `{}` for every meta
    pub omit_meta: bool,
    /// Opaque parameters passed through to the worker
    pub params: Map<String, Value>,
}

impl OcrRequest {
    pub fn new(
        images: Vec<Vec<u8>>,
        modality: Modality,
        language: Language,
        version: impl Into<String>,
    ) -> Self {
        Self {
            images,
            modality,
            language,
            version: version.into(),
            level: Level::default(),
            preloaded: false,
            omit_meta: true,
            params: Map::new(),
        }
    }

    /// Worker serving this request
    pub fn key(&self) -> WorkerKey {
        WorkerKey::new(self.modality, self.language, self.version.clone())
    }
}

/// Text and metadata for one input image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrResult {
    pub text: String,
    pub meta: Map<String, Value>,
}
