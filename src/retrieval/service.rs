//! pc_fetch job service
//!
//! The remote service is an HTML form endpoint. Submitting the form creates
//! a job; the response page either links the finished result (an `ftp://`
//! anchor) or shows a "processing" page that links back to
//! `pc_fetch.cgi?reqid=…` (as an anchor or a meta refresh) for polling.

use super::{RetrievalError, RetrievalResult, RetrieveMode};
use crate::index::RecordKind;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use url::Url;

/// Default pc_fetch endpoint
pub const DEFAULT_ENDPOINT: &str = "https://pubchem.ncbi.nlm.nih.gov/pc_fetch/pc_fetch.cgi";

const POLL_MARKER: &str = "pc_fetch.cgi?reqid";

/// Job creation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Comma-joined identifiers
    pub id_batch: String,
    pub kind: RecordKind,
    pub mode: RetrieveMode,
}

impl FetchRequest {
    /// Form fields understood by pc_fetch
    pub fn form_fields(&self) -> [(&'static str, &str); 3] {
        [
            ("idstr", self.id_batch.as_str()),
            ("retmode", self.mode.as_str()),
            ("db", self.kind.db_selector()),
        ]
    }
}

/// What one response page told us
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPage {
    /// Raw, unvalidated result location
    pub result_location: Option<String>,
    /// Where to poll next
    pub poll_location: Option<Url>,
}

/// Remote job processor
#[async_trait]
pub trait FetchService: Send + Sync {
    /// Create a job
    async fn submit(&self, request: &FetchRequest) -> RetrievalResult<FetchPage>;

    /// Re-request a poll location
    async fn poll(&self, location: &Url) -> RetrievalResult<FetchPage>;
}

/// Configuration for [`PcFetchService`]
#[derive(Debug, Clone)]
pub struct PcFetchConfig {
    pub endpoint: String,
    /// Request timeout in milliseconds
    pub request_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for PcFetchConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_ms: 30_000,
            user_agent: format!("pubchem-resolver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP implementation of [`FetchService`] against pc_fetch
pub struct PcFetchService {
    client: Client,
    endpoint: Url,
}

impl PcFetchService {
    pub fn new(config: &PcFetchConfig) -> RetrievalResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| RetrievalError::Protocol(format!("invalid endpoint {}: {}", config.endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, endpoint })
    }

    async fn read_page(&self, response: reqwest::Response) -> RetrievalResult<FetchPage> {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Http {
                status: status.as_u16(),
                message: text,
            });
        }

        let base = response.url().clone();
        let body = response.text().await.map_err(request_error)?;
        parse_page(&body, &base)
    }
}

#[async_trait]
impl FetchService for PcFetchService {
    async fn submit(&self, request: &FetchRequest) -> RetrievalResult<FetchPage> {
        tracing::debug!(
            endpoint = %self.endpoint,
            db = request.kind.db_selector(),
            retmode = request.mode.as_str(),
            "Submitting pc_fetch job"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .form(&request.form_fields())
            .send()
            .await
            .map_err(request_error)?;

        self.read_page(response).await
    }

    async fn poll(&self, location: &Url) -> RetrievalResult<FetchPage> {
        let response = self
            .client
            .get(location.clone())
            .send()
            .await
            .map_err(request_error)?;

        self.read_page(response).await
    }
}

fn request_error(e: reqwest::Error) -> RetrievalError {
    if e.is_timeout() {
        RetrievalError::Timeout
    } else {
        RetrievalError::Request(e)
    }
}

/// Extract result and poll locations from a pc_fetch response page
///
/// The first `ftp:` anchor is the result location; it is returned verbatim so
/// that validation sees exactly what the service sent. The first anchor
/// pointing at `pc_fetch.cgi?reqid` (or, failing that, a meta refresh target)
/// is the poll location, resolved against `base`.
pub fn parse_page(html: &str, base: &Url) -> RetrievalResult<FetchPage> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let metas = selector("meta[http-equiv][content]")?;

    let mut page = FetchPage::default();

    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };

        if page.result_location.is_none() && is_ftp(href) {
            page.result_location = Some(href.to_string());
        } else if page.poll_location.is_none() && href.contains(POLL_MARKER) {
            page.poll_location = base.join(href.trim()).ok();
        }
    }

    for meta in document.select(&metas) {
        let element = meta.value();
        let is_refresh = element
            .attr("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        let Some(target) = element.attr("content").filter(|_| is_refresh).and_then(refresh_target) else {
            continue;
        };

        if is_ftp(target) {
            page.result_location.get_or_insert_with(|| target.to_string());
        } else if page.poll_location.is_none() {
            page.poll_location = base.join(target.trim()).ok();
        }
    }

    Ok(page)
}

fn selector(pattern: &str) -> RetrievalResult<Selector> {
    Selector::parse(pattern)
        .map_err(|e| RetrievalError::Protocol(format!("invalid selector {}: {}", pattern, e)))
}

fn is_ftp(href: &str) -> bool {
    href.trim_start()
        .get(..4)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("ftp:"))
}

/// Target of a meta refresh `content` attribute (`"5; url=…"`), untrimmed
fn refresh_target(content: &str) -> Option<&str> {
    let start = content.to_ascii_lowercase().find("url=")? + "url=".len();
    let target = content[start..].trim_start();
    let target = match target.chars().next() {
        Some(quote @ ('\'' | '"')) => target[1..].strip_suffix(quote).unwrap_or(&target[1..]),
        _ => target,
    };
    (!target.trim().is_empty()).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::validate_location;

    fn base() -> Url {
        Url::parse("https://pubchem.ncbi.nlm.nih.gov/pc_fetch/pc_fetch.cgi").unwrap()
    }

    #[test]
    fn test_form_fields() {
        let request = FetchRequest {
            id_batch: "1,2,3".to_string(),
            kind: RecordKind::Substance,
            mode: RetrieveMode::Xml,
        };
        assert_eq!(
            request.form_fields(),
            [("idstr", "1,2,3"), ("retmode", "xml"), ("db", "pcsubstance")]
        );
    }

    #[test]
    fn test_processing_page_with_reqid_anchor() {
        let html = r#"<html><body>
            <p>Your request is being processed.</p>
            <a href="https://pubchem.ncbi.nlm.nih.gov/">PubChem</a>
            <a href="pc_fetch.cgi?reqid=4263291843848744431">Check status</a>
        </body></html>"#;

        let page = parse_page(html, &base()).unwrap();
        assert!(page.result_location.is_none());
        assert_eq!(
            page.poll_location.unwrap().as_str(),
            "https://pubchem.ncbi.nlm.nih.gov/pc_fetch/pc_fetch.cgi?reqid=4263291843848744431"
        );
    }

    #[test]
    fn test_processing_page_with_meta_refresh() {
        let html = r#"<html><head>
            <meta http-equiv="Refresh" content="5; URL=pc_fetch.cgi?reqid=42">
        </head><body>Processing...</body></html>"#;

        let page = parse_page(html, &base()).unwrap();
        assert_eq!(
            page.poll_location.unwrap().as_str(),
            "https://pubchem.ncbi.nlm.nih.gov/pc_fetch/pc_fetch.cgi?reqid=42"
        );
    }

    #[test]
    fn test_result_page() {
        let html = r#"<html><body>
            <a href="pc_fetch.cgi?reqid=42">refresh</a>
            <a href="ftp://ftp-private.ncbi.nlm.nih.gov/pubchem/.fetch/42.sdf">Download</a>
            <a href="ftp://ftp-private.ncbi.nlm.nih.gov/pubchem/.fetch/other.sdf">Other</a>
        </body></html>"#;

        let page = parse_page(html, &base()).unwrap();
        assert_eq!(
            page.result_location.as_deref(),
            Some("ftp://ftp-private.ncbi.nlm.nih.gov/pubchem/.fetch/42.sdf")
        );
    }

    #[test]
    fn test_result_location_is_not_normalized() {
        let html = r#"<a href="ftp://ftp.ncbi.nlm.nih.gov/a.sdf;rm -rf /">x</a>"#;
        let page = parse_page(html, &base()).unwrap();
        assert_eq!(page.result_location.as_deref(), Some("ftp://ftp.ncbi.nlm.nih.gov/a.sdf;rm -rf /"));
    }

    #[test]
    fn test_result_location_whitespace_is_kept() {
        let html = "<a href=\"ftp://ftp.ncbi.nlm.nih.gov/a.xml\n\t \">x</a>";
        let page = parse_page(html, &base()).unwrap();
        let location = page.result_location.unwrap();
        assert_eq!(location, "ftp://ftp.ncbi.nlm.nih.gov/a.xml\n\t ");
        assert!(validate_location(&location).unwrap_err().is_unsafe_location());

        let html = r#"<meta http-equiv="refresh" content="0; url=ftp://ftp.ncbi.nlm.nih.gov/b.xml ">"#;
        let location = parse_page(html, &base()).unwrap().result_location.unwrap();
        assert_eq!(location, "ftp://ftp.ncbi.nlm.nih.gov/b.xml ");
        assert!(validate_location(&location).unwrap_err().is_unsafe_location());
    }

    #[test]
    fn test_page_without_links() {
        let page = parse_page("<html><body>Error</body></html>", &base()).unwrap();
        assert_eq!(page, FetchPage::default());
    }

    #[test]
    fn test_is_ftp() {
        assert!(is_ftp("ftp://host/x"));
        assert!(is_ftp("  FTP://host/x"));
        assert!(!is_ftp("http://host/x"));
        assert!(!is_ftp("ft"));
    }

    #[test]
    fn test_refresh_target() {
        assert_eq!(refresh_target("5; url=pc_fetch.cgi?reqid=1"), Some("pc_fetch.cgi?reqid=1"));
        assert_eq!(refresh_target("0;URL='next.cgi'"), Some("next.cgi"));
        assert_eq!(refresh_target("5"), None);
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = PcFetchConfig {
            endpoint: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(PcFetchService::new(&config), Err(RetrievalError::Protocol(_))));
    }
}
