use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a source document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginKind {
    ScrapedPage,
    Pdf,
    StructuredSeed,
}

/// Coarse topical tag used for filtering and for categorizing harvested
/// resource links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Licensing,
    Wages,
    Steps,
    Planning,
    Tools,
    Guidance,
    Other,
}

impl Category {
    /// Categorizes a resource by keyword, checking the title and url
    /// together. First matching bucket wins, so the order below is part
    /// of the contract.
    pub fn from_keywords(title: &str, url: &str) -> Category {
        let haystack = format!("{} {}", title.to_lowercase(), url.to_lowercase());
        let contains_any =
            |words: &[&str]| words.iter().any(|word| haystack.contains(word));

        if contains_any(&[
            "license", "permit", "registration", "endorsement", "certification",
            "regulatory", "compliance", "filing", "register", "dor.wa.gov", "ubi",
            "tax", "revenue",
        ]) {
            Category::Licensing
        } else if contains_any(&[
            "wage", "minimum-wage", "overtime", "payroll", "paid leave",
            "paid-leave", "lni.wa.gov", "workers-rights",
        ]) {
            Category::Wages
        } else if contains_any(&[
            "start", "opening", "checklist", "roadmap", "setup", "launch", "step",
            "startup",
        ]) {
            Category::Steps
        } else if contains_any(&[
            "plan", "strategy", "preparation", "assessment", "market-research",
            "business-plan", "planning",
        ]) {
            Category::Planning
        } else if contains_any(&[
            "calculator", "wizard", "estimator", "forms", "templates", "portal",
            "finder", "tool", "secure.dor",
        ]) {
            Category::Tools
        } else if contains_any(&[
            "guide", "liaison", "help", "support", "assistance", "resources",
            "faq", "learn", "training", "mentor", "handbook", "manual", "sbdc",
        ]) {
            Category::Guidance
        } else {
            Category::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Licensing => "licensing",
            Category::Wages => "wages",
            Category::Steps => "steps",
            Category::Planning => "planning",
            Category::Tools => "tools",
            Category::Guidance => "guidance",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "licensing" => Ok(Category::Licensing),
            "wages" => Ok(Category::Wages),
            "steps" => Ok(Category::Steps),
            "planning" => Ok(Category::Planning),
            "tools" => Ok(Category::Tools),
            "guidance" => Ok(Category::Guidance),
            "other" => Ok(Category::Other),
            unknown => Err(format!("unknown category: {unknown}")),
        }
    }
}

/// A unit of raw content before chunking.
///
/// `page_breaks` holds the character offsets in `raw_text` where a new
/// PDF page begins; empty for non-PDF origins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub source_id: String,
    pub origin_kind: OriginKind,
    pub raw_text: String,
    pub fetched_at: DateTime<Utc>,
    pub category: Category,
    pub page_breaks: Vec<usize>,
}

/// An outbound link harvested from a scraped page, already filtered by
/// the domain allowlist and categorized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLink {
    pub title: String,
    pub url: String,
    pub category: Category,
}

/// A bounded slice of a source document's text, the unit indexed for
/// similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub ordinal: usize,
    pub source_id: String,
    pub category: Category,
}

/// A chunk paired with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub chunk_id: String,
    pub vector: Vec<f32>,
    pub text: String,
    pub category: Category,
    pub source_id: String,
}

/// Configured unit of ingestion. The source-spec list, serialized as
/// JSON, is one of the two persisted artifacts (the other being the
/// vector store snapshot).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    ScrapedPage {
        source_id: String,
        url: String,
        category: Category,
    },
    PdfUrl {
        source_id: String,
        url: String,
        category: Category,
    },
    PdfFile {
        source_id: String,
        path: PathBuf,
        category: Category,
    },
    StructuredSeed {
        source_id: String,
        title: String,
        text: String,
        category: Category,
    },
}

impl SourceSpec {
    pub fn page(url: impl Into<String>, category: Category) -> Self {
        let url = url.into();
        SourceSpec::ScrapedPage {
            source_id: derive_source_id(&url),
            url,
            category,
        }
    }

    pub fn pdf_url(url: impl Into<String>, category: Category) -> Self {
        let url = url.into();
        SourceSpec::PdfUrl {
            source_id: derive_source_id(&url),
            url,
            category,
        }
    }

    pub fn pdf_file(path: impl Into<PathBuf>, category: Category) -> Self {
        let path = path.into();
        SourceSpec::PdfFile {
            source_id: derive_source_id(&path.to_string_lossy()),
            path,
            category,
        }
    }

    pub fn seed(
        source_id: impl Into<String>,
        title: impl Into<String>,
        text: impl Into<String>,
        category: Category,
    ) -> Self {
        SourceSpec::StructuredSeed {
            source_id: source_id.into(),
            title: title.into(),
            text: text.into(),
            category,
        }
    }

    pub fn source_id(&self) -> &str {
        match self {
            SourceSpec::ScrapedPage { source_id, .. }
            | SourceSpec::PdfUrl { source_id, .. }
            | SourceSpec::PdfFile { source_id, .. }
            | SourceSpec::StructuredSeed { source_id, .. } => source_id,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            SourceSpec::ScrapedPage { category, .. }
            | SourceSpec::PdfUrl { category, .. }
            | SourceSpec::PdfFile { category, .. }
            | SourceSpec::StructuredSeed { category, .. } => *category,
        }
    }

    pub fn origin_kind(&self) -> OriginKind {
        match self {
            SourceSpec::ScrapedPage { .. } => OriginKind::ScrapedPage,
            SourceSpec::PdfUrl { .. } | SourceSpec::PdfFile { .. } => OriginKind::Pdf,
            SourceSpec::StructuredSeed { .. } => OriginKind::StructuredSeed,
        }
    }
}

/// Stable identity for a logical document, derived from its origin URL
/// or file path. Re-ingesting the same origin always maps to the same id.
pub fn derive_source_id(origin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(origin.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunk boundary policy. `overlap_tokens` is clamped below
/// `max_tokens` at chunking time, so any combination of values is safe.
#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_tokens: usize,
    pub overlap_tokens: usize,
    pub min_tokens: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_tokens: 300,
            overlap_tokens: 50,
            min_tokens: 40,
        }
    }
}

/// Retrieval policy knobs. The threshold and per-source cap are tunable
/// because no canonical values exist in the source material.
#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    /// Matches scoring below this are dropped instead of padding the
    /// result set.
    pub min_score: f32,
    /// Maximum passages returned per source document.
    pub per_source_cap: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            min_score: 0.30,
            per_source_cap: 2,
        }
    }
}

/// A ranked passage returned to the answer layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub source_id: String,
    pub category: Category,
    pub score: f32,
}
