//! HTTP client for the SciCrunch-hosted dataset index.
//!
//! Implements [`SearchIndex`] over the index's Elasticsearch-compatible
//! REST API. Rate limits and server errors are retried with exponential
//! backoff; other client errors fail immediately.
//!
//! Document ids are sent as a single percent-encoded path segment, so an id
//! containing `/`, `?` or `#` cannot address anything but `_doc/<id>`.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::time::Duration;

use sparc_search_core::index::SearchIndex;

use crate::config::IndexConfig;

/// Remote index reached over HTTP.
pub struct SciCrunchIndex {
    client: reqwest::Client,
    endpoint: Url,
    api_key: Option<String>,
    max_retries: u32,
}

impl SciCrunchIndex {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = Url::parse(config.endpoint.trim())
            .with_context(|| format!("invalid index endpoint '{}'", config.endpoint))?;
        if endpoint.cannot_be_a_base() {
            bail!("index endpoint '{}' cannot carry a path", config.endpoint);
        }
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key(),
            max_retries: config.max_retries,
        })
    }

    /// The endpoint with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("index endpoint cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.query(&[("api_key", key)]),
            None => request,
        }
    }

    /// Send a request, retrying on 429, 5xx and transport failures.
    ///
    /// Returns `None` on 404.
    async fn send<F>(&self, build: F) -> Result<Option<Value>>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_millis(250 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match self.with_key(build()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(Some(response.json().await?));
                    }
                    if status == reqwest::StatusCode::NOT_FOUND {
                        return Ok(None);
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        tracing::debug!(%status, attempt, "index request failed, retrying");
                        last_err = Some(anyhow!("index error {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("index error {}: {}", status, body_text);
                }
                Err(e) => {
                    tracing::debug!(error = %e, attempt, "index request failed, retrying");
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("index request failed after retries")))
    }
}

#[async_trait]
impl SearchIndex for SciCrunchIndex {
    async fn search(&self, body: &Value) -> Result<Value> {
        let url = self.url(&["_search"])?;
        tracing::debug!(%url, %body, "index search");
        match self.send(|| self.client.post(url.clone()).json(body)).await? {
            Some(response) => Ok(response),
            None => bail!("index not found at {}", self.endpoint),
        }
    }

    async fn get(&self, id: &str) -> Result<Option<Value>> {
        // Dot segments are dropped by URL path handling; no document lives there.
        if id.is_empty() || id == "." || id == ".." {
            return Ok(None);
        }
        let url = self.url(&["_doc", id])?;
        tracing::debug!(%url, "index get");
        let response = self.send(|| self.client.get(url.clone())).await?;
        // A missing document may also come back as 200 with `found: false`.
        Ok(response.filter(|doc| doc.get("found").and_then(Value::as_bool) != Some(false)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    /// Serves one canned `(status, body)` per connection, in order, and
    /// records each request line. Returns the index base URL.
    async fn fake_index(responses: Vec<(u16, Value)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let request_line = read_request(&mut stream).await;
                log.lock().unwrap().push(request_line);

                let body = body.to_string();
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}/datasets", addr), seen)
    }

    /// Reads one request (headers plus `Content-Length` body) and returns
    /// its request line.
    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_string();
                let length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                while buf.len() < end + 4 + length {
                    let n = stream.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                return head.lines().next().unwrap_or_default().to_string();
            }
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return String::from_utf8_lossy(&buf).lines().next().unwrap_or_default().to_string();
            }
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn index_at(endpoint: &str) -> SciCrunchIndex {
        let config = IndexConfig {
            endpoint: endpoint.to_string(),
            api_key_env: "SPARC_SEARCH_TEST_UNSET_KEY".to_string(),
            timeout_secs: 5,
            max_retries: 1,
        };
        SciCrunchIndex {
            api_key: None,
            ..SciCrunchIndex::new(&config).unwrap()
        }
    }

    fn requests(seen: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        seen.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let (endpoint, seen) = fake_index(vec![
            (500, json!({"error": "busy"})),
            (200, json!({"hits": {"total": 0, "hits": []}})),
        ])
        .await;
        let index = index_at(&endpoint);

        let response = index.search(&json!({"size": 1})).await.unwrap();
        assert_eq!(response["hits"]["total"], 0);
        let sent = requests(&seen);
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("POST /datasets/_search "), "{}", sent[0]);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let (endpoint, seen) = fake_index(vec![
            (503, json!({})),
            (503, json!({})),
            (200, json!({})),
        ])
        .await;
        let index = index_at(&endpoint);

        let err = index.search(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("503"), "{}", err);
        assert_eq!(requests(&seen).len(), 2);
    }

    #[tokio::test]
    async fn test_client_error_fails_fast() {
        let (endpoint, seen) = fake_index(vec![
            (400, json!({"error": "bad query"})),
            (200, json!({})),
        ])
        .await;
        let index = index_at(&endpoint);

        let err = index.search(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("400"), "{}", err);
        assert!(err.to_string().contains("bad query"), "{}", err);
        assert_eq!(requests(&seen).len(), 1);
    }

    #[tokio::test]
    async fn test_missing_document() {
        let (endpoint, _) = fake_index(vec![
            (404, json!({"found": false})),
            (200, json!({"_id": "7", "found": false})),
            (200, json!({"_id": "8", "found": true, "_source": {}})),
        ])
        .await;
        let index = index_at(&endpoint);

        assert!(index.get("6").await.unwrap().is_none());
        assert!(index.get("7").await.unwrap().is_none());
        let found = index.get("8").await.unwrap().unwrap();
        assert_eq!(found["_id"], "8");
    }

    #[tokio::test]
    async fn test_search_on_missing_index_is_an_error() {
        let (endpoint, _) = fake_index(vec![(404, json!({}))]).await;
        let err = index_at(&endpoint).search(&json!({})).await.unwrap_err();
        assert!(err.to_string().contains("index not found"), "{}", err);
    }

    #[tokio::test]
    async fn test_document_id_is_one_path_segment() {
        let (endpoint, seen) = fake_index(vec![(404, json!({}))]).await;
        let index = index_at(&endpoint);

        assert!(index.get("../_search?q=x#frag").await.unwrap().is_none());
        let sent = requests(&seen);
        assert_eq!(sent.len(), 1);
        assert!(
            sent[0].starts_with("GET /datasets/_doc/..%2F_search%3Fq=x%23frag "),
            "{}",
            sent[0]
        );
    }

    #[tokio::test]
    async fn test_dot_ids_are_not_sent() {
        let (endpoint, seen) = fake_index(vec![]).await;
        let index = index_at(&endpoint);

        assert!(index.get("..").await.unwrap().is_none());
        assert!(index.get("").await.unwrap().is_none());
        assert!(requests(&seen).is_empty());
    }

    #[tokio::test]
    async fn test_api_key_is_sent_as_query_parameter() {
        let (endpoint, seen) = fake_index(vec![(200, json!({"hits": {"hits": []}}))]).await;
        let index = SciCrunchIndex {
            api_key: Some("secret".to_string()),
            ..index_at(&format!("{}/", endpoint))
        };

        index.search(&json!({})).await.unwrap();
        let sent = requests(&seen);
        assert!(
            sent[0].starts_with("POST /datasets/_search?api_key=secret "),
            "{}",
            sent[0]
        );
    }

    #[test]
    fn test_rejects_unparseable_endpoint() {
        let config = IndexConfig {
            endpoint: "not a url".to_string(),
            api_key_env: "SPARC_SEARCH_TEST_UNSET_KEY".to_string(),
            timeout_secs: 5,
            max_retries: 0,
        };
        assert!(SciCrunchIndex::new(&config).is_err());
    }
}
