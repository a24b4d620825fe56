use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use url::Url;
use walkdir::WalkDir;

use crate::cache::{FreshnessCache, DEFAULT_MAX_ENTRIES, DEFAULT_TTL};
use crate::error::AcquireError;
use crate::extractor::{join_pages, PdfExtract};
use crate::fetch::HttpFetch;
use crate::models::{Category, ResourceLink, SourceDocument, SourceSpec};
use crate::scrape::{extract_page, ScrapeConfig};

/// Acquisition policy: how long raw payloads stay fresh and how scraped
/// pages are filtered.
#[derive(Debug, Clone)]
pub struct AcquirerConfig {
    pub cache_ttl: Duration,
    pub scrape: ScrapeConfig,
}

impl Default for AcquirerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_TTL,
            scrape: ScrapeConfig::default(),
        }
    }
}

/// One acquired source, ready for chunking. `is_stale` marks content
/// served from an expired cache entry because the origin was down.
#[derive(Debug, Clone)]
pub struct Acquired {
    pub document: SourceDocument,
    pub links: Vec<ResourceLink>,
    pub is_stale: bool,
}

/// Turns source specs into normalized documents.
///
/// Raw payload bytes (HTML or PDF) are cached per origin; parsing and
/// extraction run on every call so policy changes take effect without
/// waiting out the TTL. Structured seeds never touch the cache or the
/// network.
pub struct DocumentAcquirer {
    fetcher: Arc<dyn HttpFetch>,
    extractor: Arc<dyn PdfExtract>,
    cache: FreshnessCache<Vec<u8>>,
    config: AcquirerConfig,
}

impl DocumentAcquirer {
    pub fn new(
        fetcher: Arc<dyn HttpFetch>,
        extractor: Arc<dyn PdfExtract>,
        config: AcquirerConfig,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            cache: FreshnessCache::new(DEFAULT_MAX_ENTRIES),
            config,
        }
    }

    pub async fn acquire(&self, spec: &SourceSpec) -> Result<Acquired, AcquireError> {
        match spec {
            SourceSpec::ScrapedPage {
                source_id,
                url,
                category,
            } => {
                let base = Url::parse(url)?;
                let fetched = self.cached_bytes(url, || self.fetcher.get(url)).await?;
                let html = String::from_utf8_lossy(&fetched.value);
                let page = extract_page(&html, &base, &self.config.scrape)?;

                Ok(Acquired {
                    document: SourceDocument {
                        source_id: source_id.clone(),
                        origin_kind: spec.origin_kind(),
                        raw_text: page.body_text,
                        fetched_at: Utc::now(),
                        category: *category,
                        page_breaks: Vec::new(),
                    },
                    links: page.links,
                    is_stale: fetched.is_stale,
                })
            }
            SourceSpec::PdfUrl {
                source_id,
                url,
                category,
            } => {
                Url::parse(url)?;
                let fetched = self.cached_bytes(url, || self.fetcher.get(url)).await?;
                self.pdf_document(spec, source_id, *category, &fetched.value, url, fetched.is_stale)
            }
            SourceSpec::PdfFile {
                source_id,
                path,
                category,
            } => {
                let key = path.to_string_lossy().into_owned();
                let fetched = self
                    .cached_bytes(&key, || async {
                        Ok(tokio::fs::read(path).await?)
                    })
                    .await?;
                self.pdf_document(spec, source_id, *category, &fetched.value, &key, fetched.is_stale)
            }
            SourceSpec::StructuredSeed {
                source_id,
                title,
                text,
                category,
            } => Ok(Acquired {
                document: SourceDocument {
                    source_id: source_id.clone(),
                    origin_kind: spec.origin_kind(),
                    raw_text: format!("{title}\n\n{text}"),
                    fetched_at: Utc::now(),
                    category: *category,
                    page_breaks: Vec::new(),
                },
                links: Vec::new(),
                is_stale: false,
            }),
        }
    }

    /// Drops the cached payload so the next acquire hits the origin.
    pub async fn invalidate(&self, spec: &SourceSpec) {
        match spec {
            SourceSpec::ScrapedPage { url, .. } | SourceSpec::PdfUrl { url, .. } => {
                self.cache.invalidate(url).await;
            }
            SourceSpec::PdfFile { path, .. } => {
                self.cache.invalidate(&path.to_string_lossy()).await;
            }
            SourceSpec::StructuredSeed { .. } => {}
        }
    }

    async fn cached_bytes<F, Fut>(
        &self,
        key: &str,
        fetch: F,
    ) -> Result<crate::cache::Fetched<Vec<u8>>, AcquireError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<Vec<u8>, AcquireError>>,
    {
        self.cache
            .get_or_fetch(key, self.config.cache_ttl, fetch)
            .await
    }

    fn pdf_document(
        &self,
        spec: &SourceSpec,
        source_id: &str,
        category: Category,
        bytes: &[u8],
        label: &str,
        is_stale: bool,
    ) -> Result<Acquired, AcquireError> {
        let pages = self.extractor.extract_pages(bytes, label)?;
        let (raw_text, page_breaks) = join_pages(&pages);

        Ok(Acquired {
            document: SourceDocument {
                source_id: source_id.to_string(),
                origin_kind: spec.origin_kind(),
                raw_text,
                fetched_at: Utc::now(),
                category,
                page_breaks,
            },
            links: Vec::new(),
            is_stale,
        })
    }
}

/// Expands a directory into one `PdfFile` spec per `.pdf` found,
/// recursively, in stable path order.
pub fn expand_pdf_dir(dir: &Path, category: Category) -> Result<Vec<SourceSpec>, AcquireError> {
    let mut specs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let is_pdf = entry
            .path()
            .extension()
            .map_or(false, |extension| extension.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            specs.push(SourceSpec::pdf_file(entry.path(), category));
        }
    }
    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::PageText;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Serves a fixed body, optionally failing after the first call.
    struct ScriptedFetcher {
        body: Vec<u8>,
        calls: AtomicUsize,
        fail_after: Option<usize>,
    }

    impl ScriptedFetcher {
        fn serving(body: &str) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                calls: AtomicUsize::new(0),
                fail_after: None,
            }
        }

        fn failing_after(body: &str, successes: usize) -> Self {
            Self {
                body: body.as_bytes().to_vec(),
                calls: AtomicUsize::new(0),
                fail_after: Some(successes),
            }
        }
    }

    #[async_trait]
    impl HttpFetch for ScriptedFetcher {
        async fn get(&self, url: &str) -> Result<Vec<u8>, AcquireError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(limit) = self.fail_after {
                if call >= limit {
                    return Err(AcquireError::Status {
                        url: url.to_string(),
                        status: 503,
                    });
                }
            }
            Ok(self.body.clone())
        }
    }

    struct FixedExtractor {
        pages: Vec<PageText>,
    }

    impl PdfExtract for FixedExtractor {
        fn extract_pages(&self, _bytes: &[u8], _label: &str) -> Result<Vec<PageText>, AcquireError> {
            Ok(self.pages.clone())
        }
    }

    fn page_html() -> &'static str {
        r#"<html><body><main>
            <h1>Minimum wage</h1>
            <p>Washington sets a statewide minimum wage each year.</p>
        </main></body></html>"#
    }

    fn acquirer_with(fetcher: ScriptedFetcher, config: AcquirerConfig) -> (DocumentAcquirer, Arc<ScriptedFetcher>) {
        let fetcher = Arc::new(fetcher);
        let acquirer = DocumentAcquirer::new(
            Arc::clone(&fetcher) as Arc<dyn HttpFetch>,
            Arc::new(FixedExtractor { pages: Vec::new() }),
            config,
        );
        (acquirer, fetcher)
    }

    #[tokio::test]
    async fn repeated_page_acquisition_is_served_from_cache() {
        let (acquirer, fetcher) =
            acquirer_with(ScriptedFetcher::serving(page_html()), AcquirerConfig::default());
        let spec = SourceSpec::page("https://lni.wa.gov/minimum-wage", Category::Wages);

        let first = acquirer.acquire(&spec).await.expect("first acquire");
        let second = acquirer.acquire(&spec).await.expect("second acquire");

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(first.document.raw_text.contains("statewide minimum wage"));
        assert!(!second.is_stale);
    }

    #[tokio::test]
    async fn origin_failure_serves_stale_content() {
        let config = AcquirerConfig {
            cache_ttl: Duration::ZERO,
            scrape: ScrapeConfig::default(),
        };
        let (acquirer, fetcher) =
            acquirer_with(ScriptedFetcher::failing_after(page_html(), 1), config);
        let spec = SourceSpec::page("https://lni.wa.gov/minimum-wage", Category::Wages);

        let first = acquirer.acquire(&spec).await.expect("first acquire");
        let fallback = acquirer.acquire(&spec).await.expect("stale fallback");

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(!first.is_stale);
        assert!(fallback.is_stale);
        assert_eq!(fallback.document.raw_text, first.document.raw_text);
    }

    #[tokio::test]
    async fn failure_without_cache_entry_propagates() {
        let (acquirer, _fetcher) = acquirer_with(
            ScriptedFetcher::failing_after(page_html(), 0),
            AcquirerConfig::default(),
        );
        let spec = SourceSpec::page("https://lni.wa.gov/minimum-wage", Category::Wages);

        let result = acquirer.acquire(&spec).await;
        assert!(matches!(result, Err(AcquireError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn seeds_never_touch_the_network() {
        let (acquirer, fetcher) = acquirer_with(
            ScriptedFetcher::failing_after("", 0),
            AcquirerConfig::default(),
        );
        let spec = SourceSpec::seed(
            "seed-steps",
            "Starting steps",
            "Register the business with the state.",
            Category::Steps,
        );

        let acquired = acquirer.acquire(&spec).await.expect("seed acquires");
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert!(acquired.document.raw_text.starts_with("Starting steps"));
        assert!(acquired.links.is_empty());
    }

    #[tokio::test]
    async fn local_pdf_goes_through_the_extractor() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("guide.pdf");
        tokio::fs::write(&path, b"%PDF-ignored-by-stub")
            .await
            .expect("write fixture");

        let fetcher: Arc<dyn HttpFetch> = Arc::new(ScriptedFetcher::failing_after("", 0));
        let acquirer = DocumentAcquirer::new(
            fetcher,
            Arc::new(FixedExtractor {
                pages: vec![
                    PageText {
                        number: 1,
                        text: "First page.".to_string(),
                    },
                    PageText {
                        number: 2,
                        text: "Second page.".to_string(),
                    },
                ],
            }),
            AcquirerConfig::default(),
        );

        let spec = SourceSpec::pdf_file(&path, Category::Guidance);
        let acquired = acquirer.acquire(&spec).await.expect("pdf acquires");
        assert_eq!(acquired.document.raw_text, "First page.\n\nSecond page.");
        assert_eq!(acquired.document.page_breaks.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_refetch() {
        let (acquirer, fetcher) =
            acquirer_with(ScriptedFetcher::serving(page_html()), AcquirerConfig::default());
        let spec = SourceSpec::page("https://lni.wa.gov/minimum-wage", Category::Wages);

        acquirer.acquire(&spec).await.expect("first acquire");
        acquirer.invalidate(&spec).await;
        acquirer.acquire(&spec).await.expect("refetch");

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn pdf_directories_expand_in_stable_order() {
        let dir = tempdir().expect("tempdir");
        for name in ["b.pdf", "a.PDF", "notes.txt"] {
            tokio::fs::write(dir.path().join(name), b"x")
                .await
                .expect("write fixture");
        }

        let specs = expand_pdf_dir(dir.path(), Category::Guidance).expect("expand");
        assert_eq!(specs.len(), 2);
        let paths: Vec<String> = specs
            .iter()
            .map(|spec| match spec {
                SourceSpec::PdfFile { path, .. } => {
                    path.file_name().map(|n| n.to_string_lossy().into_owned())
                }
                _ => None,
            })
            .map(|name| name.expect("pdf file spec"))
            .collect();
        assert_eq!(paths, vec!["a.PDF", "b.pdf"]);
    }
}
