//! Minimal JSON REST client.
//!
//! Purpose-built for the CI-server and issue-tracker APIs. Internally uses
//! reqwest for transport; every request carries a fixed timeout so a stuck
//! remote cannot hang a triage batch.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;

const DEFAULT_USER_AGENT: &str = concat!("flake-triage/", env!("CARGO_PKG_VERSION"));
const DEFAULT_REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Client {
    inner: reqwest::Client,
}

impl Client {
    pub fn new() -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { inner })
    }

    pub fn get(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Get, url)
    }

    pub fn post(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Post, url)
    }

    pub fn patch(&self, url: &str) -> RequestBuilder<'_> {
        RequestBuilder::new(self, Method::Patch, url)
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Patch,
}

impl Method {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
        }
    }
}

pub struct RequestBuilder<'a> {
    client: &'a Client,
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Option<Vec<u8>>,
    timeout: std::time::Duration,
}

impl<'a> RequestBuilder<'a> {
    fn new(client: &'a Client, method: Method, url: &str) -> Self {
        Self {
            client,
            method,
            url: url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub const fn timeout(mut self, duration: std::time::Duration) -> Self {
        self.timeout = duration;
        self
    }

    pub fn json<T: serde::Serialize>(mut self, payload: &T) -> Result<Self> {
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        self.body = Some(serde_json::to_vec(payload)?);
        Ok(self)
    }

    pub async fn send(self) -> Result<Response> {
        let Self {
            client,
            method,
            url,
            headers,
            query,
            body,
            timeout,
        } = self;

        let reqwest_method = match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
        };

        let mut builder = client.inner.request(reqwest_method, &url).timeout(timeout);
        for (key, value) in &headers {
            builder = builder.header(key, value);
        }
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::api(format!("{} {url}: request timed out", method.as_str()))
            } else {
                Error::api(format!("{} {url}: {e}", method.as_str()))
            }
        })?;

        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::api(format!("{} {url}: reading body: {e}", method.as_str())))?;
        if bytes.len() > MAX_BODY_BYTES {
            return Err(Error::api(format!("{url}: response body too large")));
        }

        Ok(Response {
            status,
            body: bytes.to_vec(),
        })
    }
}

pub struct Response {
    status: u16,
    body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Error out unless the response has a 2xx status.
    pub fn success(self, context: &str) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(Error::api(format!(
                "{context}: unexpected status {} ({})",
                self.status,
                String::from_utf8_lossy(&self.body[..self.body.len().min(200)])
            )))
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn method_as_str() {
        assert_eq!(Method::Get.as_str(), "GET");
        assert_eq!(Method::Post.as_str(), "POST");
        assert_eq!(Method::Patch.as_str(), "PATCH");
    }

    #[test]
    fn request_builder_header_chaining() {
        let client = Client::new().unwrap();
        let builder = client
            .get("https://ci.example.com/api/json")
            .header("Accept", "application/json")
            .bearer("t0ken");
        assert_eq!(builder.headers.len(), 2);
        assert_eq!(builder.headers[1].1, "Bearer t0ken");
    }

    #[test]
    fn request_builder_json_sets_content_type() {
        let client = Client::new().unwrap();
        let builder = client
            .post("https://api.example.com/issues")
            .json(&json!({"title": "CI: TestFoo"}))
            .unwrap();
        assert!(builder.body.is_some());
        assert!(builder
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[test]
    fn request_builder_default_timeout() {
        let client = Client::new().unwrap();
        let builder = client.get("https://ci.example.com");
        assert_eq!(builder.timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn response_status_helpers() {
        let ok = Response {
            status: 201,
            body: Vec::new(),
        };
        assert!(ok.is_success());
        assert!(!ok.is_not_found());

        let gone = Response {
            status: 404,
            body: Vec::new(),
        };
        assert!(gone.is_not_found());
        assert!(gone.success("fetch build").is_err());
    }

    #[test]
    fn response_json_roundtrip() {
        let response = Response {
            status: 200,
            body: br#"{"number": 7}"#.to_vec(),
        };
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["number"], 7);
    }
}
