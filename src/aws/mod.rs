//! HTTP implementation of the resource client facade.
//!
//! Talks to the provider's REST, JSON-RPC and query-protocol endpoints
//! directly with `reqwest`, signing each request with [`crate::sigv4`].
//! There is no SDK dependency.
//!
//! [`AwsProvider`] implements every facade trait; the per-service request
//! and response shapes live in the submodules.
//!
//! | Module | Service | Protocol |
//! |--------|---------|----------|
//! | [`s3`] | object storage | REST + XML |
//! | [`iam`], [`sts`] | identity, account | query + XML |
//! | [`aoss`] | vector collections, k-NN index | JSON 1.0 + REST |
//! | [`neptune`] | analytics graphs | REST + JSON |
//! | [`bedrock`] | knowledge service | REST + JSON |
//! | [`logs`] | log groups and delivery | JSON 1.1 |
//! | [`lambda`] | transform functions | REST + JSON |
//!
//! Every endpoint can be redirected through `[aws.endpoints]` in the
//! configuration, e.g. to LocalStack.

mod aoss;
mod bedrock;
mod iam;
mod lambda;
mod logs;
mod neptune;
mod s3;
mod sts;

use chrono::Utc;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::config::{AwsConfig, EndpointOverrides};
use crate::error::{KbError, ProviderError, ProviderResult, Result};
use crate::sigv4::{self, Credentials, SigningRequest};
use crate::xml;

/// Region used when neither the configuration nor the environment names one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Configuration region, then `AWS_REGION`, then `AWS_DEFAULT_REGION`.
pub fn resolve_region(config: &AwsConfig) -> String {
    config
        .region
        .clone()
        .or_else(|| std::env::var("AWS_REGION").ok())
        .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| DEFAULT_REGION.to_string())
}

/// Signed HTTP access to every service the orchestrator uses.
pub struct AwsProvider {
    http: reqwest::Client,
    creds: Credentials,
    region: String,
    endpoints: EndpointOverrides,
}

impl AwsProvider {
    /// Build a provider from environment credentials.
    pub fn from_env(config: &AwsConfig) -> Result<Self> {
        let creds = Credentials::from_env()?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("kbctl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| KbError::config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            creds,
            region: resolve_region(config),
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Resolve a service endpoint, honouring configured overrides.
    fn endpoint(&self, service: Service) -> ProviderResult<Endpoint> {
        let (override_url, default_host, signing_name, signing_region) = match service {
            Service::S3 => (
                &self.endpoints.s3,
                format!("s3.{}.amazonaws.com", self.region),
                "s3",
                self.region.as_str(),
            ),
            // IAM is global and signs for us-east-1.
            Service::Iam => (
                &self.endpoints.iam,
                "iam.amazonaws.com".to_string(),
                "iam",
                DEFAULT_REGION,
            ),
            Service::Sts => (
                &self.endpoints.sts,
                format!("sts.{}.amazonaws.com", self.region),
                "sts",
                self.region.as_str(),
            ),
            Service::Aoss => (
                &self.endpoints.aoss,
                format!("aoss.{}.amazonaws.com", self.region),
                "aoss",
                self.region.as_str(),
            ),
            Service::NeptuneGraph => (
                &self.endpoints.neptune_graph,
                format!("neptune-graph.{}.amazonaws.com", self.region),
                "neptune-graph",
                self.region.as_str(),
            ),
            Service::BedrockAgent => (
                &self.endpoints.bedrock_agent,
                format!("bedrock-agent.{}.amazonaws.com", self.region),
                "bedrock",
                self.region.as_str(),
            ),
            Service::Logs => (
                &self.endpoints.logs,
                format!("logs.{}.amazonaws.com", self.region),
                "logs",
                self.region.as_str(),
            ),
            Service::Lambda => (
                &self.endpoints.lambda,
                format!("lambda.{}.amazonaws.com", self.region),
                "lambda",
                self.region.as_str(),
            ),
        };
        let base = match override_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("https://{}", default_host),
        };
        Endpoint::parse(&base, signing_name, signing_region)
    }

    /// Endpoint for an arbitrary URL (collection data planes).
    fn endpoint_at(&self, base: &str, signing_name: &'static str) -> ProviderResult<Endpoint> {
        Endpoint::parse(base.trim_end_matches('/'), signing_name, &self.region)
    }

    /// Sign and send one request. Non-2xx responses become errors.
    async fn send(&self, endpoint: &Endpoint, call: Call) -> ProviderResult<Reply> {
        let reply = self.send_raw(endpoint, call).await?;
        if (200..300).contains(&reply.status) {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }

    /// Sign and send one request, returning any response as-is.
    async fn send_raw(&self, endpoint: &Endpoint, call: Call) -> ProviderResult<Reply> {
        let signed = sigv4::sign(
            &self.creds,
            &SigningRequest {
                method: call.method.as_str(),
                host: &endpoint.host,
                path: &call.path,
                query: &call.query,
                headers: &call.headers,
                payload: &call.body,
                service: endpoint.signing_name,
                region: &endpoint.signing_region,
            },
            Utc::now(),
        );

        let mut url = format!("{}{}", endpoint.base, sigv4::encode_path(&call.path));
        if !call.query.is_empty() {
            url.push('?');
            url.push_str(&sigv4::canonical_query(&call.query));
        }

        tracing::debug!(method = %call.method, url = %url, "provider request");
        let mut request = self.http.request(call.method, &url);
        for (k, v) in signed.iter().chain(call.headers.iter()) {
            request = request.header(k.as_str(), v.as_str());
        }
        let response = request.body(call.body).send().await?;
        let status = response.status().as_u16();
        let error_type = response
            .headers()
            .get("x-amzn-errortype")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?.to_vec();
        tracing::debug!(status, bytes = body.len(), "provider response");
        Ok(Reply {
            status,
            error_type,
            body,
        })
    }

    /// POST a JSON-RPC style request (`X-Amz-Target`) and decode the reply.
    async fn json_rpc<T: DeserializeOwned>(
        &self,
        service: Service,
        content_type: &str,
        target: &str,
        body: &Value,
    ) -> ProviderResult<T> {
        let endpoint = self.endpoint(service)?;
        let call = Call::new(Method::POST, "/")
            .header("content-type", content_type)
            .header("x-amz-target", target)
            .json(body);
        self.send(&endpoint, call).await?.json()
    }

    /// POST a query-protocol request and parse the XML reply.
    async fn query(
        &self,
        service: Service,
        version: &str,
        action: &str,
        params: &[(&str, &str)],
    ) -> ProviderResult<xml::Element> {
        let endpoint = self.endpoint(service)?;
        let mut form = vec![
            format!("Action={}", sigv4::uri_encode(action)),
            format!("Version={}", sigv4::uri_encode(version)),
        ];
        for (k, v) in params {
            form.push(format!("{}={}", sigv4::uri_encode(k), sigv4::uri_encode(v)));
        }
        let call = Call::new(Method::POST, "/")
            .header("content-type", "application/x-www-form-urlencoded; charset=utf-8")
            .body(form.join("&").into_bytes());
        self.send(&endpoint, call).await?.xml()
    }
}

#[derive(Debug, Clone, Copy)]
enum Service {
    S3,
    Iam,
    Sts,
    Aoss,
    NeptuneGraph,
    BedrockAgent,
    Logs,
    Lambda,
}

/// A resolved endpoint: where to send, and how to sign.
#[derive(Debug, Clone)]
struct Endpoint {
    /// Scheme, host and optional port, without a trailing slash.
    base: String,
    /// `host[:port]` as it appears in the `host` header.
    host: String,
    signing_name: &'static str,
    signing_region: String,
}

impl Endpoint {
    fn parse(base: &str, signing_name: &'static str, signing_region: &str) -> ProviderResult<Self> {
        let url = Url::parse(base)
            .map_err(|e| ProviderError::Decode(format!("endpoint '{}': {}", base, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| ProviderError::Decode(format!("endpoint '{}' has no host", base)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok(Self {
            base: format!("{}://{}", url.scheme(), host),
            host,
            signing_name,
            signing_region: signing_region.to_string(),
        })
    }
}

/// One outgoing request before signing.
struct Call {
    method: Method,
    /// Unencoded path.
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Call {
    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    fn json(self, body: &Value) -> Self {
        let has_type = self.headers.iter().any(|(k, _)| k == "content-type");
        let call = if has_type {
            self
        } else {
            self.header("content-type", "application/json")
        };
        call.body(body.to_string().into_bytes())
    }
}

/// A received response.
struct Reply {
    status: u16,
    error_type: Option<String>,
    body: Vec<u8>,
}

impl Reply {
    fn json<T: DeserializeOwned>(&self) -> ProviderResult<T> {
        let body: &[u8] = if self.body.is_empty() { b"{}" } else { &self.body };
        serde_json::from_slice(body)
            .map_err(|e| ProviderError::Decode(format!("json response: {}", e)))
    }

    fn xml(&self) -> ProviderResult<xml::Element> {
        xml::parse(&String::from_utf8_lossy(&self.body))
    }

    fn into_error(self) -> ProviderError {
        let (code, message) = error_code(self.status, self.error_type.as_deref(), &self.body);
        match code {
            Some(code) => ProviderError::from_code(&code, message),
            None => status_error(self.status, message),
        }
    }
}

/// Pull an error code and message out of whichever format the service used.
fn error_code(status: u16, error_type: Option<&str>, body: &[u8]) -> (Option<String>, String) {
    let text = String::from_utf8_lossy(body);
    let fallback = || format!("HTTP {}: {}", status, text.chars().take(300).collect::<String>());

    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        let message = ["message", "Message", "reason"]
            .iter()
            .find_map(|k| json.get(*k).and_then(Value::as_str))
            .or_else(|| json.pointer("/error/reason").and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(fallback);
        let code = json
            .get("__type")
            .and_then(Value::as_str)
            .or(error_type)
            .or_else(|| json.pointer("/error/type").and_then(Value::as_str))
            .map(short_code);
        return (code, message);
    }
    if text.trim_start().starts_with('<') {
        if let Ok(doc) = xml::parse(&text) {
            let code = doc.find_text("Code").map(str::to_string);
            let message = doc
                .find_text("Message")
                .map(str::to_string)
                .unwrap_or_else(fallback);
            return (code, message);
        }
    }
    (error_type.map(short_code), fallback())
}

/// `com.amazonaws.foo#ConflictException` and `ConflictException:http://...`
/// both become `ConflictException`.
fn short_code(raw: &str) -> String {
    let after_hash = raw.rsplit('#').next().unwrap_or(raw);
    after_hash.split(':').next().unwrap_or(after_hash).to_string()
}

fn status_error(status: u16, message: String) -> ProviderError {
    match status {
        403 => ProviderError::AccessDenied(message),
        404 => ProviderError::NotFound(message),
        409 => ProviderError::AlreadyExists(message),
        429 | 500..=599 => ProviderError::Transient(message),
        _ => ProviderError::Service {
            code: status.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_error_uses_type_field() {
        let (code, message) = error_code(
            400,
            None,
            br#"{"__type":"com.amazonaws.logs#ResourceAlreadyExistsException","message":"exists"}"#,
        );
        assert_eq!(code.as_deref(), Some("ResourceAlreadyExistsException"));
        assert_eq!(message, "exists");
    }

    #[test]
    fn rest_error_uses_header() {
        let (code, _) = error_code(
            409,
            Some("ConflictException:http://internal.amazon.com/coral/com.amazon.bedrock/"),
            br#"{"message":"Knowledge base already exists"}"#,
        );
        assert_eq!(code.as_deref(), Some("ConflictException"));
    }

    #[test]
    fn search_engine_error_uses_nested_type() {
        let (code, _) = error_code(
            400,
            None,
            br#"{"error":{"type":"resource_already_exists_exception","reason":"index exists"},"status":400}"#,
        );
        let err = ProviderError::from_code(&code.unwrap(), "x");
        assert!(err.is_already_exists());
    }

    #[test]
    fn xml_error_uses_code_element() {
        let reply = Reply {
            status: 409,
            error_type: None,
            body: br#"<Error><Code>BucketAlreadyExists</Code><Message>taken</Message></Error>"#.to_vec(),
        };
        assert!(matches!(reply.into_error(), ProviderError::NameTaken(_)));
    }

    #[test]
    fn bodiless_errors_fall_back_to_status() {
        let reply = Reply {
            status: 404,
            error_type: None,
            body: Vec::new(),
        };
        assert!(reply.into_error().is_not_found());
    }

    #[test]
    fn endpoint_override_keeps_port() {
        let ep = Endpoint::parse("http://localhost:4566", "s3", "us-east-1").unwrap();
        assert_eq!(ep.host, "localhost:4566");
        assert_eq!(ep.base, "http://localhost:4566");
    }

    #[test]
    fn configured_region_wins() {
        let config = AwsConfig {
            region: Some("eu-central-1".into()),
            endpoints: EndpointOverrides::default(),
        };
        assert_eq!(resolve_region(&config), "eu-central-1");
    }
}
