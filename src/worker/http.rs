//! HTTP client for page fetches and media downloads

use crate::config::HttpConfig;
use crate::error::AcquireError;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_TYPE, RANGE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Too many redirects")]
    TooManyRedirects,

    #[error("Response exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Client errors, size limits and cancellation are final
    fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status, .. } => {
                *status >= 500
                    || *status == StatusCode::REQUEST_TIMEOUT.as_u16()
                    || *status == StatusCode::TOO_MANY_REQUESTS.as_u16()
            }
            Self::RequestFailed(_) | Self::Timeout(_) => true,
            Self::InvalidUrl(_)
            | Self::TooManyRedirects
            | Self::TooLarge { .. }
            | Self::Io { .. }
            | Self::Cancelled => false,
        }
    }

    fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

impl From<DownloadError> for AcquireError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Timeout(after) => AcquireError::timeout("HTTP transfer", after),
            DownloadError::Cancelled => AcquireError::Cancelled,
            DownloadError::InvalidUrl(url) => AcquireError::UnsupportedSource(url),
            DownloadError::Io { context, source } => AcquireError::Io { context, source },
            other => AcquireError::Network(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

/// Response metadata of a streamed download
#[derive(Debug, Clone, Default)]
pub struct DownloadMeta {
    pub bytes: u64,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// HTTP downloader
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_retries: u32,
    read_timeout: Duration,
    max_download_size: Option<u64>,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout.as_duration())
            .read_timeout(config.read_timeout.as_duration())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| DownloadError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            max_retries: config.max_retries,
            read_timeout: config.read_timeout.as_duration(),
            max_download_size: config.max_download_size.map(|size| size.as_u64()),
        })
    }

    /// Same client with a different attempt budget
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            max_retries,
            ..self.clone()
        }
    }

    /// Fetch a page body as text, with retry
    pub async fn get_text(
        &self,
        url: &str,
        headers: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<String> {
        self.retrying(url, cancel, move || async move {
            let fetch = async {
                let response = self.send(self.request(url, headers)).await?;
                response
                    .text()
                    .await
                    .map_err(|e| self.map_transport_error(e))
            };
            tokio::select! {
                _ = cancel.cancelled() => Err(DownloadError::Cancelled),
                body = fetch => body,
            }
        })
        .await
    }

    /// Download a resource into memory, with retry
    pub async fn download(
        &self,
        url: &str,
        headers: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        self.retrying(url, cancel, move || async move {
            let fetch = async {
                let response = self.send(self.request(url, headers)).await?;
                self.check_length(response.content_length(), 0)?;
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| self.map_transport_error(e))?;
                self.check_length(Some(bytes.len() as u64), 0)?;
                Ok::<_, DownloadError>(bytes)
            };
            let bytes = tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                bytes = fetch => bytes?,
            };
            debug!(url, size = bytes.len(), "Download completed");
            Ok(bytes)
        })
        .await
    }

    /// Stream a resource into `dest`, resuming with a Range request when a
    /// previous attempt left bytes behind
    pub async fn download_to(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadMeta> {
        self.retrying(url, cancel, move || self.stream_once(url, headers, dest, cancel))
            .await
    }

    /// Retry loop with exponential backoff: 1s, 2s, 4s. Cancellation cuts
    /// the backoff short.
    async fn retrying<T, F, Fut>(&self, url: &str, cancel: &CancellationToken, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;

            match attempt().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(url, attempts, "Request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    if attempts >= self.max_retries {
                        warn!(url, attempts, error = %e, "Request failed after retries");
                        return Err(e);
                    }

                    warn!(url, attempts, error = %e, "Request failed, retrying");

                    let backoff = Duration::from_secs(2u64.pow((attempts - 1).min(6)));
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn stream_once(
        &self,
        url: &str,
        headers: &[(String, String)],
        dest: &Path,
        cancel: &CancellationToken,
    ) -> Result<DownloadMeta> {
        let written = match tokio::fs::metadata(dest).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        let mut request = self.request(url, headers);
        if written > 0 {
            debug!(url, offset = written, "Resuming download");
            request = request.header(RANGE, format!("bytes={written}-"));
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
            response = self.send(request) => response,
        };

        let response = match response {
            Err(DownloadError::Status { status, .. })
                if written > 0 && status == StatusCode::RANGE_NOT_SATISFIABLE.as_u16() =>
            {
                truncate(dest).await?;
                return Err(DownloadError::RequestFailed(
                    "server rejected resume offset".to_string(),
                ));
            }
            other => other?,
        };

        let resumed = written > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        let offset = if resumed { written } else { 0 };
        self.check_length(response.content_length(), offset)?;

        let meta = DownloadMeta {
            bytes: offset,
            content_type: header_string(&response, CONTENT_TYPE.as_str()),
            content_disposition: header_string(&response, CONTENT_DISPOSITION.as_str()),
        };

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(resumed)
            .truncate(!resumed)
            .open(dest)
            .await
            .map_err(|e| DownloadError::io(format!("open {}", dest.display()), e))?;

        let mut total = offset;
        let mut stream = response.bytes_stream();
        loop {
            let chunk = tokio::select! {
                _ = cancel.cancelled() => return Err(DownloadError::Cancelled),
                chunk = stream.next() => chunk,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| self.map_transport_error(e))?;

            total += chunk.len() as u64;
            self.check_length(Some(total), 0)?;

            file.write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(format!("write {}", dest.display()), e))?;
        }

        file.flush()
            .await
            .map_err(|e| DownloadError::io(format!("flush {}", dest.display()), e))?;

        debug!(url, size = total, resumed, "Download completed");

        Ok(DownloadMeta {
            bytes: total,
            ..meta
        })
    }

    fn request(&self, url: &str, headers: &[(String, String)]) -> RequestBuilder {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// Send and reject non-2xx responses
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }

        Ok(response)
    }

    fn check_length(&self, length: Option<u64>, offset: u64) -> Result<()> {
        match (self.max_download_size, length) {
            (Some(limit), Some(length)) if offset.saturating_add(length) > limit => {
                Err(DownloadError::TooLarge { limit })
            }
            _ => Ok(()),
        }
    }

    fn map_transport_error(&self, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout(self.read_timeout)
        } else if e.is_redirect() {
            DownloadError::TooManyRedirects
        } else if e.is_builder() {
            DownloadError::InvalidUrl(e.to_string())
        } else {
            DownloadError::RequestFailed(e.to_string())
        }
    }
}

fn header_string(response: &Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn truncate(path: &Path) -> Result<()> {
    OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map(|_| ())
        .map_err(|e| DownloadError::io(format!("truncate {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ByteSize;
    use tempfile::TempDir;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(max_retries: u32) -> HttpClient {
        let config = HttpConfig {
            max_retries,
            ..HttpConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
            .mount(&server)
            .await;

        let body = client(1)
            .get_text(&format!("{}/page", server.uri()), &[], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(body, "<html></html>");
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(3)
            .download(&format!("{}/missing.mp3", server.uri()), &[], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Status { status: 404, .. }));
        assert_eq!(AcquireError::from(err).kind(), crate::error::ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_custom_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("referer", "https://example.com/"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
            .mount(&server)
            .await;

        let headers = vec![("Referer".to_string(), "https://example.com/".to_string())];
        let bytes = client(1)
            .download(&format!("{}/x", server.uri()), &headers, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn test_download_to_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/song.mp3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "audio/mpeg")
                    .set_body_bytes(vec![7u8; 2048]),
            )
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("part");
        let meta = client(1)
            .download_to(
                &format!("{}/song.mp3", server.uri()),
                &[],
                &dest,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(meta.bytes, 2048);
        assert_eq!(meta.content_type.as_deref(), Some("audio/mpeg"));
        assert_eq!(std::fs::metadata(&dest).unwrap().len(), 2048);
    }

    #[tokio::test]
    async fn test_resume_appends_on_partial_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=4-"))
            .respond_with(ResponseTemplate::new(206).set_body_bytes(b"5678".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("part");
        std::fs::write(&dest, b"1234").unwrap();

        let meta = client(1)
            .download_to(&server.uri(), &[], &dest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(meta.bytes, 8);
        assert_eq!(std::fs::read(&dest).unwrap(), b"12345678");
    }

    #[tokio::test]
    async fn test_resume_restarts_on_full_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abcdef".to_vec()))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("part");
        std::fs::write(&dest, b"stale-bytes-here").unwrap();

        client(1)
            .download_to(&server.uri(), &[], &dest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_size_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&server)
            .await;

        let config = HttpConfig {
            max_retries: 1,
            max_download_size: Some(ByteSize(1024)),
            ..HttpConfig::default()
        };
        let client = HttpClient::new(&config).unwrap();

        let dir = TempDir::new().unwrap();
        let err = client
            .download_to(&server.uri(), &[], &dir.path().join("part"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge { limit: 1024 }));
    }

    #[tokio::test]
    async fn test_cancelled_before_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let dir = TempDir::new().unwrap();
        let err = client(3)
            .download_to(&server.uri(), &[], &dir.path().join("part"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = client(5)
            .get_text(&server.uri(), &[], &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Cancelled));
        // Second backoff alone would be 2s
        assert!(started.elapsed() < Duration::from_millis(900));
    }

    #[tokio::test]
    async fn test_cancelled_in_memory_download() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = client(3)
            .download(&format!("{}/a.torrent", server.uri()), &[], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Cancelled));
    }
}
