//! Single HTTP probe of one URL.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use rand::thread_rng;
use reqwest::{header::USER_AGENT, redirect::Policy, Client};
use std::time::Duration;

/// Desktop browser strings rotated per attempt so trivial bot filters don't
/// turn live sites into false failures.
pub const USER_AGENTS: [&str; 5] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.114 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:89.0) Gecko/20100101 Firefox/89.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.106 Safari/537.36",
];

/// Normalized result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// HTTP status, or 0 when no response was obtained.
    pub status: u16,
    pub error: Option<String>,
}

impl Probe {
    /// A response was obtained. Statuses >= 400 carry the reason phrase.
    pub fn response(status: u16, reason: Option<&str>) -> Self {
        let error = if status >= 400 {
            Some(reason.map(str::to_string).unwrap_or_else(|| format!("HTTP {status}")))
        } else {
            None
        };
        Probe { status, error }
    }

    /// No response: network, TLS, timeout or protocol failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Probe { status: 0, error: Some(reason.into()) }
    }

    pub fn got_response(&self) -> bool {
        self.status != 0
    }

    pub fn is_error(&self) -> bool {
        self.status == 0 || self.status >= 400
    }
}

#[async_trait]
pub trait Checker: Send + Sync {
    /// Perform exactly one attempt against `url`. Never fails; failures are
    /// folded into a status-0 [`Probe`].
    async fn check(&self, url: &str, timeout: Duration) -> Probe;
}

/// Reqwest-backed checker.
///
/// Certificate verification is disabled: the goal is reachability, and a site
/// with a broken chain still counts as reachable. Do not reuse this client for
/// anything that trusts the response content.
#[derive(Clone)]
pub struct HttpChecker {
    client: Client,
}

impl HttpChecker {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(Policy::limited(10))
            .brotli(true)
            .gzip(true)
            .deflate(true)
            .build()?;
        Ok(HttpChecker { client })
    }
}

pub fn random_user_agent() -> &'static str {
    USER_AGENTS.choose(&mut thread_rng()).copied().unwrap_or(USER_AGENTS[0])
}

#[async_trait]
impl Checker for HttpChecker {
    async fn check(&self, url: &str, timeout: Duration) -> Probe {
        let req = self
            .client
            .get(url)
            .timeout(timeout)
            .header(USER_AGENT, random_user_agent());
        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                // hyper only keeps the phrase when it differs from the canonical one.
                let reason = resp
                    .extensions()
                    .get::<hyper::ext::ReasonPhrase>()
                    .and_then(|r| std::str::from_utf8(r.as_bytes()).ok())
                    .or_else(|| status.canonical_reason());
                Probe::response(status.as_u16(), reason)
            }
            Err(e) => Probe::failed(describe_error(&e)),
        }
    }
}

fn describe_error(e: &reqwest::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    if e.is_timeout() {
        parts.push("timed out".into());
    }
    parts.push(e.to_string());
    let mut source = std::error::Error::source(e);
    while let Some(s) = source {
        let msg = s.to_string();
        if !parts.contains(&msg) {
            parts.push(msg);
        }
        source = s.source();
    }
    parts.join(": ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const T: Duration = Duration::from_secs(5);

    #[test]
    fn response_classification() {
        assert_eq!(Probe::response(200, Some("OK")), Probe { status: 200, error: None });
        assert_eq!(Probe::response(301, Some("Moved Permanently")).error, None);
        let p = Probe::response(404, Some("Not Found"));
        assert!(p.is_error() && p.got_response());
        assert_eq!(p.error.as_deref(), Some("Not Found"));
        assert_eq!(Probe::response(599, None).error.as_deref(), Some("HTTP 599"));
        let f = Probe::failed("boom");
        assert!(f.is_error() && !f.got_response());
    }

    #[test]
    fn user_agent_comes_from_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[tokio::test]
    async fn ok_response_has_no_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/up"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let probe = checker.check(&format!("{}/up", server.uri()), T).await;
        assert_eq!(probe, Probe { status: 200, error: None });

        let reqs = server.received_requests().await.unwrap();
        assert_eq!(reqs.len(), 1);
        let ua = reqs[0].headers.get("user-agent").unwrap().to_str().unwrap().to_string();
        assert!(USER_AGENTS.contains(&ua.as_str()), "{ua}");
    }

    #[tokio::test]
    async fn http_error_carries_reason_phrase() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let p = checker.check(&format!("{}/gone", server.uri()), T).await;
        assert_eq!(p, Probe { status: 404, error: Some("Not Found".into()) });
        let p = checker.check(&format!("{}/down", server.uri()), T).await;
        assert_eq!(p, Probe { status: 503, error: Some("Service Unavailable".into()) });
    }

    #[tokio::test]
    async fn http_error_uses_the_reason_the_server_sent() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = sock.read(&mut buf).await;
            sock.write_all(b"HTTP/1.1 503 Back Soon\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .await
                .unwrap();
        });

        let checker = HttpChecker::new().unwrap();
        let p = checker.check(&format!("http://{addr}/"), T).await;
        assert_eq!(p, Probe { status: 503, error: Some("Back Soon".into()) });
    }

    #[tokio::test]
    async fn slow_response_times_out_as_status_zero() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let checker = HttpChecker::new().unwrap();
        let p = checker.check(&server.uri(), Duration::from_millis(100)).await;
        assert_eq!(p.status, 0);
        assert!(p.error.unwrap().starts_with("timed out"));
    }

    #[tokio::test]
    async fn refused_connection_is_status_zero() {
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let checker = HttpChecker::new().unwrap();
        let p = checker.check(&format!("http://127.0.0.1:{port}/"), T).await;
        assert_eq!(p.status, 0);
        assert!(!p.error.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_url_is_status_zero() {
        let checker = HttpChecker::new().unwrap();
        let p = checker.check("not a url", T).await;
        assert_eq!(p.status, 0);
        assert!(p.error.is_some());
    }
}
