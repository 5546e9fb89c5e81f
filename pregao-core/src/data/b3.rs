//! B3 index portfolio provider.
//!
//! Fetches the "portfolio of the day" for an index from B3's public
//! `indexProxy` API. The request descriptor travels base64-encoded in the
//! URL path. The endpoint is observed to answer with the current day's
//! composition whatever date is requested, so the date only names the output.

use super::provider::{
    extract_results, FetchError, PortfolioRecord, PortfolioRequest, PortfolioSource,
};
use crate::config::HttpConfig;
use reqwest::header::{HeaderValue, ACCEPT};

/// Blocking client for the B3 portfolio endpoint. One GET per fetch, no retries.
pub struct B3PortfolioClient {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl B3PortfolioClient {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }
}

impl PortfolioSource for B3PortfolioClient {
    fn name(&self) -> &str {
        "b3_index_portfolio"
    }

    fn fetch(&self, request: &PortfolioRequest) -> Result<Vec<PortfolioRecord>, FetchError> {
        let url = request.url(&self.base_url);
        tracing::debug!(%url, "requesting portfolio");

        let resp = self
            .client
            .get(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::Transport(format!("reading response body: {e}")))?;
        let envelope: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| FetchError::MalformedJson(e.to_string()))?;

        extract_results(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RequestConfig;
    use chrono::NaiveDate;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn request() -> PortfolioRequest {
        PortfolioRequest::for_date(
            &RequestConfig::default(),
            NaiveDate::from_ymd_opt(2025, 7, 17).unwrap(),
        )
    }

    /// Serve one canned HTTP response on loopback and return a client aimed at it.
    fn serve_once(status_line: &'static str, body: &'static str) -> B3PortfolioClient {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut seen: Vec<u8> = Vec::new();
            let mut buf = [0u8; 1024];
            while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                seen.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).unwrap();
        });

        let config = HttpConfig {
            base_url: format!("http://{addr}/GetPortfolioDay/"),
            timeout_secs: 5,
            ..HttpConfig::default()
        };
        B3PortfolioClient::new(&config).unwrap()
    }

    #[test]
    fn client_builds_from_default_config() {
        let client = B3PortfolioClient::new(&HttpConfig::default()).unwrap();
        assert_eq!(client.name(), "b3_index_portfolio");
        assert!(client.base_url.ends_with("GetPortfolioDay/"));
    }

    #[test]
    fn unreachable_host_is_a_transport_error() {
        let config = HttpConfig {
            // Port 9 (discard) on loopback refuses connections on any sane host.
            base_url: "http://127.0.0.1:9/GetPortfolioDay/".into(),
            timeout_secs: 2,
            ..HttpConfig::default()
        };
        let client = B3PortfolioClient::new(&config).unwrap();

        assert!(matches!(
            client.fetch(&request()),
            Err(FetchError::Transport(_))
        ));
    }

    #[test]
    fn non_success_status_is_reported() {
        let client = serve_once("500 Internal Server Error", "{}");

        assert!(matches!(
            client.fetch(&request()),
            Err(FetchError::Status { status: 500 })
        ));
    }

    #[test]
    fn unparseable_body_is_malformed_json() {
        let client = serve_once("200 OK", "{oops");

        assert!(matches!(
            client.fetch(&request()),
            Err(FetchError::MalformedJson(_))
        ));
    }

    #[test]
    fn results_array_is_returned() {
        let client = serve_once(
            "200 OK",
            r#"{"page":{"pageNumber":1},"results":[{"cod":"PETR4","part":"10,5"}]}"#,
        );

        let records = client.fetch(&request()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["cod"], "PETR4");
        assert_eq!(records[0]["part"], "10,5");
    }
}
