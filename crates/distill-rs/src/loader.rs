//! Document loaders: turn an identifier (path, URL) into raw text.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

/// Boxed future returned by [`DocumentLoader::load`].
pub type LoadFuture<'a> = Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>>;

/// Fetches the full text of one document.
pub trait DocumentLoader: Send + Sync {
    fn load<'a>(&'a self, identifier: &'a str) -> LoadFuture<'a>;
}

// ── FileLoader ─────────────────────────────────────────────────────

/// Reads UTF-8 text files from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl DocumentLoader for FileLoader {
    fn load<'a>(&'a self, identifier: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            tokio::fs::read_to_string(identifier)
                .await
                .map_err(|e| format!("failed to read {identifier}: {e}"))
                .inspect(|text| debug!("Loaded {identifier} ({} bytes)", text.len()))
        })
    }
}

// ── Wikipedia ──────────────────────────────────────────────────────

/// Language edition and title parsed from an article URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikipediaArticle {
    pub language: String,
    /// Slug with underscores turned into spaces.
    pub title: String,
}

/// Accept only `https://<lang>.wikipedia.org/wiki/<slug>`, where `<lang>`
/// is two or more lowercase ASCII letters and `<slug>` is word characters
/// and dashes. No query string and no fragment.
pub fn validate_wikipedia_url(url: &str) -> Result<WikipediaArticle, String> {
    let invalid = || format!("invalid Wikipedia URL format: {url}");

    let rest = url.strip_prefix("https://").ok_or_else(invalid)?;
    let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
    let language = host.strip_suffix(".wikipedia.org").ok_or_else(invalid)?;
    if language.len() < 2 || !language.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(invalid());
    }
    let slug = path.strip_prefix("wiki/").ok_or_else(invalid)?;
    if slug.is_empty()
        || !slug
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid());
    }

    Ok(WikipediaArticle {
        language: language.to_string(),
        title: slug.replace('_', " "),
    })
}

#[derive(Deserialize, Debug)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Deserialize, Debug)]
struct ExtractQuery {
    #[serde(default)]
    pages: Vec<ExtractPage>,
}

#[derive(Deserialize, Debug)]
struct ExtractPage {
    title: Option<String>,
    extract: Option<String>,
    #[serde(default)]
    missing: bool,
}

/// Loads the plain-text body of a Wikipedia article through the MediaWiki
/// `extracts` API, following redirects.
pub struct WikipediaLoader {
    client: reqwest::Client,
}

impl WikipediaLoader {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("distill-rs/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// MediaWiki API request for `article`.
    fn extract_url(article: &WikipediaArticle) -> Result<reqwest::Url, String> {
        reqwest::Url::parse_with_params(
            &format!("https://{}.wikipedia.org/w/api.php", article.language),
            &[
                ("action", "query"),
                ("prop", "extracts"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("formatversion", "2"),
                ("titles", article.title.as_str()),
            ],
        )
        .map_err(|e| format!("failed to build API URL: {e}"))
    }
}

impl DocumentLoader for WikipediaLoader {
    fn load<'a>(&'a self, identifier: &'a str) -> LoadFuture<'a> {
        Box::pin(async move {
            let article = validate_wikipedia_url(identifier)?;
            debug!(
                "Fetching Wikipedia article '{}' ({})",
                article.title, article.language
            );

            let resp = self
                .client
                .get(Self::extract_url(&article)?)
                .send()
                .await
                .map_err(|e| format!("request failed: {e}"))?;
            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| format!("failed to read response: {e}"))?;
            if !status.is_success() {
                return Err(format!("Wikipedia API HTTP {status}: {text}"));
            }

            parse_extract(&text, &article.title)
        })
    }
}

fn parse_extract(body: &str, title: &str) -> Result<String, String> {
    let parsed: ExtractResponse =
        serde_json::from_str(body).map_err(|e| format!("failed to parse response: {e}"))?;
    let page = parsed
        .query
        .and_then(|q| q.pages.into_iter().next())
        .ok_or_else(|| format!("no page returned for '{title}'"))?;
    if page.missing {
        return Err(format!("Wikipedia article '{title}' does not exist"));
    }
    match page.extract {
        Some(extract) if !extract.trim().is_empty() => {
            debug!(
                "Loaded '{}' ({} bytes)",
                page.title.as_deref().unwrap_or(title),
                extract.len()
            );
            Ok(extract)
        }
        _ => Err(format!("Wikipedia article '{title}' has no text")),
    }
}
