//! Source loaders: turn a source reference into [`SourceDocument`]s.
//!
//! | Kind | Reference | Documents |
//! |------|-----------|-----------|
//! | `web` | HTTP(S) URL | one, HTML reduced to text |
//! | `pdf` | local file path | one per page |
//! | `text` | the raw text | one |
//!
//! [`LoaderRegistry`] dispatches on [`SourceKind`]. Loader failures are
//! reported as [`RagError::LoadFailure`] carrying the reference.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;

use agentkb_core::models::{Metadata, SourceDocument, SourceKind, META_SOURCE};
use agentkb_core::{RagError, RagResult};

use crate::config::IngestionConfig;
use crate::extract::extract_pdf_pages;

#[async_trait]
pub trait SourceLoader: Send + Sync {
    /// Load every document behind `source_ref`.
    async fn load(&self, source_ref: &str) -> Result<Vec<SourceDocument>>;
}

/// Maps each [`SourceKind`] to its loader.
pub struct LoaderRegistry {
    loaders: HashMap<SourceKind, Box<dyn SourceLoader>>,
}

impl LoaderRegistry {
    /// An empty registry. Every kind is unsupported until registered.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// The built-in web, pdf, and text loaders.
    pub fn with_defaults(config: &IngestionConfig) -> Result<Self> {
        let mut registry = Self::empty();
        registry.register(SourceKind::Web, Box::new(WebLoader::new(config)?));
        registry.register(SourceKind::Pdf, Box::new(PdfLoader::new(config.max_file_size)));
        registry.register(SourceKind::Text, Box::new(TextLoader));
        Ok(registry)
    }

    /// Install or replace the loader for `kind`.
    pub fn register(&mut self, kind: SourceKind, loader: Box<dyn SourceLoader>) {
        self.loaders.insert(kind, loader);
    }

    pub async fn load(&self, source_ref: &str, kind: SourceKind) -> RagResult<Vec<SourceDocument>> {
        let loader = self
            .loaders
            .get(&kind)
            .ok_or_else(|| RagError::UnsupportedSourceKind(kind.to_string()))?;
        loader
            .load(source_ref)
            .await
            .map_err(|cause| RagError::LoadFailure {
                source_ref: source_ref.to_string(),
                cause,
            })
    }
}

// ============ Text ============

/// The reference is the content.
pub struct TextLoader;

#[async_trait]
impl SourceLoader for TextLoader {
    async fn load(&self, source_ref: &str) -> Result<Vec<SourceDocument>> {
        Ok(vec![SourceDocument::new(source_ref, Metadata::new())])
    }
}

// ============ Web ============

pub struct WebLoader {
    client: reqwest::Client,
}

impl WebLoader {
    pub fn new(config: &IngestionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.web_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SourceLoader for WebLoader {
    async fn load(&self, source_ref: &str) -> Result<Vec<SourceDocument>> {
        let response = self
            .client
            .get(source_ref)
            .send()
            .await
            .with_context(|| format!("GET {} failed", source_ref))?
            .error_for_status()?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();
        let body = response.text().await?;

        let mut metadata = Metadata::new();
        metadata.insert(META_SOURCE.into(), json!(source_ref));
        metadata.insert("content_type".into(), json!(content_type));

        let text = if content_type.contains("html") {
            if let Some(title) = html_title(&body) {
                metadata.insert("title".into(), json!(title));
            }
            html_to_text(&body)
        } else {
            body
        };

        tracing::debug!(url = source_ref, chars = text.len(), "fetched web source");
        Ok(vec![SourceDocument::new(text, metadata)])
    }
}

/// Elements whose content is never visible text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript"];

/// Tags that start a new line in the extracted text.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p",
    "pre", "section", "table", "td", "th", "title", "tr", "ul",
];

/// Reduce an HTML page to readable text.
///
/// Drops script, style, and noscript content, strips tags, decodes the
/// common entities, collapses whitespace within each line, and drops blank
/// lines.
pub fn html_to_text(html: &str) -> String {
    // ASCII lowercasing keeps byte offsets aligned with `html`.
    let lower = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut pos = 0usize;

    loop {
        let lt = match html[pos..].find('<') {
            Some(rel) => pos + rel,
            None => break,
        };
        out.push_str(&html[pos..lt]);

        if html[lt..].starts_with("<!--") {
            pos = match html[lt + 4..].find("-->") {
                Some(rel) => lt + 4 + rel + 3,
                None => html.len(),
            };
            continue;
        }

        // `<` not opening a tag, comment, or declaration is literal text.
        let opens_markup = html[lt + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        if !opens_markup {
            out.push('<');
            pos = lt + 1;
            continue;
        }

        let gt = match html[lt..].find('>') {
            Some(rel) => lt + rel,
            None => {
                out.push_str(&html[lt..]);
                pos = html.len();
                break;
            }
        };
        let inner = &lower[lt + 1..gt];
        let closing = inner.starts_with('/');
        let name = tag_name(inner);
        pos = gt + 1;

        if !closing && SKIPPED_ELEMENTS.contains(&name) {
            let close = format!("</{}", name);
            pos = match lower[pos..].find(&close) {
                Some(rel) => {
                    let start = pos + rel;
                    lower[start..]
                        .find('>')
                        .map(|g| start + g + 1)
                        .unwrap_or(html.len())
                }
                None => html.len(),
            };
            continue;
        }

        if BLOCK_TAGS.contains(&name) {
            out.push('\n');
        }
    }
    out.push_str(&html[pos..]);

    decode_entities(&out)
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Text of the first `<title>` element, if any.
pub fn html_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = decode_entities(html[start..end].trim());
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    (!title.is_empty()).then_some(title)
}

fn tag_name(inner: &str) -> &str {
    inner
        .trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("")
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

// ============ PDF ============

pub struct PdfLoader {
    max_file_size: u64,
}

impl PdfLoader {
    pub fn new(max_file_size: u64) -> Self {
        Self { max_file_size }
    }
}

#[async_trait]
impl SourceLoader for PdfLoader {
    async fn load(&self, source_ref: &str) -> Result<Vec<SourceDocument>> {
        let path = Path::new(source_ref);
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        if !meta.is_file() {
            anyhow::bail!("{} is not a file", path.display());
        }
        if meta.len() > self.max_file_size {
            anyhow::bail!(
                "{} is {} bytes, larger than the {} byte limit",
                path.display(),
                meta.len(),
                self.max_file_size
            );
        }

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        let pages = tokio::task::spawn_blocking(move || extract_pdf_pages(&bytes))
            .await
            .context("PDF extraction task failed")??;

        let docs = pages
            .into_iter()
            .enumerate()
            .map(|(page, text)| {
                let mut metadata = Metadata::new();
                metadata.insert(META_SOURCE.into(), json!(source_ref));
                metadata.insert("page".into(), json!(page));
                SourceDocument::new(text, metadata)
            })
            .collect::<Vec<_>>();

        tracing::debug!(path = source_ref, pages = docs.len(), "extracted PDF");
        Ok(docs)
    }
}
