//! HTTP client for the listings resource on the target

use reqwest::Method;
use serde_json::{Map, Value};
use tracing::debug;

use super::{CheckFailure, LISTINGS_ENDPOINT};

/// Client rooted at `{target}api/listingsAndReviews`
#[derive(Clone)]
pub struct LabClient {
    http: reqwest::Client,
    base: String,
}

impl LabClient {
    /// `target` is a base URL ending in `/`
    pub fn new(http: reqwest::Client, target: &str) -> Self {
        Self {
            http,
            base: format!("{}{}", target, LISTINGS_ENDPOINT),
        }
    }

    /// Absolute URL for a path under the listings resource
    ///
    /// An empty path addresses the resource itself; a path starting with `?`
    /// is appended as a query string.
    pub fn url(&self, path: &str) -> String {
        if path.is_empty() || path.starts_with('?') {
            format!("{}{}", self.base, path)
        } else {
            format!("{}/{}", self.base, path.trim_start_matches('/'))
        }
    }

    pub async fn get(&self, path: &str) -> Result<LabResponse, CheckFailure> {
        self.send(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<LabResponse, CheckFailure> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<LabResponse, CheckFailure> {
        self.send(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<LabResponse, CheckFailure> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<LabResponse, CheckFailure> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Lab request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        Ok(LabResponse { status, body })
    }
}

/// Raw response from the target
#[derive(Debug, Clone)]
pub struct LabResponse {
    pub status: u16,
    pub body: String,
}

impl LabResponse {
    /// Fail unless the status matches the success code for the request
    pub fn expect_status(&self, expected: u16) -> Result<&Self, CheckFailure> {
        if self.status == expected {
            Ok(self)
        } else {
            Err(CheckFailure::Http {
                status: self.status,
                expected,
            })
        }
    }

    pub fn json(&self) -> Result<Value, CheckFailure> {
        serde_json::from_str(&self.body)
            .map_err(|e| CheckFailure::parse(format!("response is not valid JSON: {}", e)))
    }

    /// Body as a JSON array
    pub fn parse_array(&self) -> Result<Vec<Value>, CheckFailure> {
        match self.json()? {
            Value::Array(items) => Ok(items),
            other => Err(CheckFailure::parse(format!(
                "expected a JSON array but got {}",
                kind(&other)
            ))),
        }
    }

    /// Body as a JSON object
    pub fn parse_object(&self) -> Result<Map<String, Value>, CheckFailure> {
        match self.json()? {
            Value::Object(map) => Ok(map),
            other => Err(CheckFailure::parse(format!(
                "expected a JSON object but got {}",
                kind(&other)
            ))),
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn response(status: u16, body: &str) -> LabResponse {
        LabResponse {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_url_joining() {
        let client = LabClient::new(reqwest::Client::new(), "https://svc/");
        assert_eq!(client.url(""), "https://svc/api/listingsAndReviews");
        assert_eq!(client.url("distinct"), "https://svc/api/listingsAndReviews/distinct");
        assert_eq!(client.url("/42"), "https://svc/api/listingsAndReviews/42");
        assert_eq!(
            client.url("?query=%7B%7D"),
            "https://svc/api/listingsAndReviews?query=%7B%7D"
        );
    }

    #[test]
    fn test_expect_status() {
        assert!(response(201, "").expect_status(201).is_ok());
        assert_eq!(
            response(500, "").expect_status(201).unwrap_err(),
            CheckFailure::Http {
                status: 500,
                expected: 201
            }
        );
    }

    #[test]
    fn test_parse_shapes() {
        assert_eq!(response(200, "[1,2]").parse_array().unwrap().len(), 2);
        assert!(matches!(
            response(200, "{}").parse_array(),
            Err(CheckFailure::Parse(_))
        ));
        assert!(matches!(
            response(200, "<html>").parse_object(),
            Err(CheckFailure::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_sends_json_body_and_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/listingsAndReviews/filter"))
            .and(body_json(json!({ "limit": 12 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/listingsAndReviews/distinct"))
            .and(query_param("field", "bedrooms"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;

        let client = LabClient::new(reqwest::Client::new(), &format!("{}/", server.uri()));

        let resp = client.post("filter", &json!({ "limit": 12 })).await.unwrap();
        assert_eq!(resp.status, 201);

        let resp = client.get("distinct?field=bedrooms").await.unwrap();
        assert_eq!(resp.parse_array().unwrap().len(), 2);
    }
}
