//! HttpTransport - JSON POST to a collector endpoint

use contracts::{encode_batch, ContractError, Event, EventTransport};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Url};
use tracing::{debug, instrument};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Transport that POSTs each batch as a JSON array
pub struct HttpTransport {
    name: String,
    endpoint: Url,
    client: Client,
}

impl HttpTransport {
    /// Create a transport for `endpoint`
    ///
    /// # Errors
    /// The endpoint is not an absolute http(s) URL.
    pub fn new(name: impl Into<String>, endpoint: &str) -> Result<Self, ContractError> {
        Self::with_client(name, endpoint, Client::new())
    }

    /// Create a transport sharing an existing client
    pub fn with_client(
        name: impl Into<String>,
        endpoint: &str,
        client: Client,
    ) -> Result<Self, ContractError> {
        let name = name.into();
        let endpoint = parse_endpoint(endpoint)
            .map_err(|message| ContractError::config_validation("endpoint", message))?;

        debug!(transport = %name, endpoint = %endpoint, "HttpTransport created");

        Ok(Self {
            name,
            endpoint,
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

/// Parse and check an endpoint URL
fn parse_endpoint(endpoint: &str) -> Result<Url, String> {
    let url = Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{endpoint}': {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!(
            "endpoint '{endpoint}' uses unsupported scheme '{other}'"
        )),
    }
}

impl EventTransport for HttpTransport {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "http_transport_post",
        skip(self, events),
        fields(transport = %self.name, batch = events.len())
    )]
    async fn post(&self, events: Vec<Event>) -> Result<(), ContractError> {
        let body = encode_batch(&events)?;

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(ACCEPT, JSON_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| ContractError::transport(&self.name, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContractError::TransportStatus {
                transport: self.name.clone(),
                status: status.as_u16(),
            });
        }

        debug!(transport = %self.name, status = status.as_u16(), "Batch delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accept one request, answer with `status_line`, return the raw request
    async fn serve_once(listener: TcpListener, status_line: &'static str) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            raw.extend_from_slice(&buf[..n]);
            if n == 0 || request_complete(&raw) {
                break;
            }
        }
        let response = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).await.unwrap();
        String::from_utf8(raw).unwrap()
    }

    fn request_complete(raw: &[u8]) -> bool {
        let text = String::from_utf8_lossy(raw);
        let Some((head, body)) = text.split_once("\r\n\r\n") else {
            return false;
        };
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        body.len() >= length
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(HttpTransport::new("http", "ftp://example.com/upload").is_err());
        assert!(HttpTransport::new("http", "/relative/path").is_err());
        assert!(HttpTransport::new("http", "http://example.com/collect").is_ok());
    }

    #[tokio::test]
    async fn test_post_sends_json_array() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 200 OK"));

        let transport =
            HttpTransport::new("collector", &format!("http://{addr}/postevent")).unwrap();
        let events = vec![Event::new().with("n", 1), Event::new().with("n", 2)];
        transport.post(events).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /postevent HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("content-type: application/json"));

        let (_, body) = request.split_once("\r\n\r\n").unwrap();
        let body: Value = serde_json::from_str(body).unwrap();
        assert_eq!(body, serde_json::json!([{ "n": 1 }, { "n": 2 }]));
    }

    #[tokio::test]
    async fn test_post_reports_error_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve_once(listener, "HTTP/1.1 503 Service Unavailable"));

        let transport = HttpTransport::new("collector", &format!("http://{addr}/")).unwrap();
        let result = transport.post(vec![Event::new()]).await;
        server.await.unwrap();

        assert!(matches!(
            result,
            Err(ContractError::TransportStatus { status: 503, .. })
        ));
    }
}
