use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::AcquireError;
use crate::models::{Category, ResourceLink};

/// Policy for extracting content and links from a scraped page.
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Domain suffixes outbound links must match to be kept.
    pub allowed_domains: Vec<String>,
    /// Upper bound on harvested links per page.
    pub max_links: usize,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            allowed_domains: vec!["gov".to_string()],
            max_links: 50,
        }
    }
}

/// Main text plus the categorized resource links of one page.
#[derive(Debug, Clone)]
pub struct PageContent {
    pub body_text: String,
    pub links: Vec<ResourceLink>,
}

/// Extracts the main textual content and allowlisted outbound links
/// from raw markup.
///
/// The content root is the first of `article`, `main`, `body`;
/// navigation, header, footer, and aside subtrees are skipped entirely.
pub fn extract_page(
    html: &str,
    base_url: &Url,
    config: &ScrapeConfig,
) -> Result<PageContent, AcquireError> {
    let document = Html::parse_document(html);
    let root = pick_root(&document);

    let mut blocks = Vec::new();
    for element in root.descendent_elements() {
        if !is_content_tag(element.value().name())
            || in_boilerplate(element)
            || in_nested_content(element)
        {
            continue;
        }
        let text = collapse_whitespace(&element.text().collect::<String>());
        if !text.is_empty() {
            blocks.push(text);
        }
    }

    let body_text = blocks.join("\n\n");
    if body_text.trim().is_empty() {
        return Err(AcquireError::EmptyPage(base_url.to_string()));
    }

    let links = collect_links(root, base_url, config);

    Ok(PageContent { body_text, links })
}

fn pick_root(document: &Html) -> ElementRef<'_> {
    let article = Selector::parse("article").expect("article selector");
    let main = Selector::parse("main").expect("main selector");
    let body = Selector::parse("body").expect("body selector");

    document
        .select(&article)
        .next()
        .or_else(|| document.select(&main).next())
        .or_else(|| document.select(&body).next())
        .unwrap_or_else(|| document.root_element())
}

fn is_content_tag(tag: &str) -> bool {
    matches!(
        tag,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "p" | "li" | "blockquote" | "td"
    )
}

fn in_boilerplate(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| {
            matches!(
                ancestor.value().name(),
                "nav" | "header" | "footer" | "aside" | "script" | "style" | "noscript"
                    | "template"
            )
        })
}

// A content element inside another content element (a `p` in a
// `blockquote`, a nested `li`) already contributed its text through the
// ancestor's `text()`; visiting it too would emit the passage twice.
fn in_nested_content(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| is_content_tag(ancestor.value().name()))
}

fn collect_links(root: ElementRef<'_>, base_url: &Url, config: &ScrapeConfig) -> Vec<ResourceLink> {
    let anchor = Selector::parse("a[href]").expect("anchor selector");
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in root.select(&anchor) {
        if links.len() >= config.max_links {
            break;
        }
        if in_boilerplate(element) {
            continue;
        }

        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(url) = base_url.join(href) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }
        if !host_allowed(url.host_str(), &config.allowed_domains) {
            continue;
        }

        let title = collapse_whitespace(&element.text().collect::<String>());
        if title.is_empty() {
            continue;
        }
        if !seen.insert(url.to_string()) {
            continue;
        }

        let category = Category::from_keywords(&title, url.as_str());
        links.push(ResourceLink {
            title,
            url: url.to_string(),
            category,
        });
    }

    links
}

fn host_allowed(host: Option<&str>, allowed_domains: &[String]) -> bool {
    let Some(host) = host else {
        return false;
    };
    allowed_domains
        .iter()
        .any(|domain| host == domain || host.ends_with(&format!(".{domain}")))
}

fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}
