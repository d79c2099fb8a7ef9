//! The four injection points of the Network Client: endpoint construction,
//! request building, execution, and response parsing. Each is a `dyn`-safe
//! trait (open, extensible — this is where spec.md asks for trait-object
//! style rather than enum-dispatch) with a `reqwest`-backed default, the way
//! `crab_client::client::http::NetworkHttpClient` wraps one `reqwest::Client`
//! for every call.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::IapError;

use super::wire::OrderAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

/// Parameters substituted into an action's path template (currently just
/// `id`, but kept as a map so a custom `EndpointBuilder` can add more).
pub type PathParams = HashMap<&'static str, String>;

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

/// Builds the URL for an action given its path params.
pub trait EndpointBuilder: Send + Sync {
    fn build(&self, action: OrderAction, params: &PathParams) -> String;
}

/// Default endpoint mapping, per the normative action -> path table.
pub struct DefaultEndpointBuilder {
    pub base_url: String,
}

impl EndpointBuilder for DefaultEndpointBuilder {
    fn build(&self, action: OrderAction, params: &PathParams) -> String {
        let base = self.base_url.trim_end_matches('/');
        match action {
            OrderAction::CreateOrder => format!("{base}/orders"),
            OrderAction::QueryOrderStatus => {
                format!("{base}/orders/{}/status", params.get("id").map(String::as_str).unwrap_or(""))
            }
            OrderAction::UpdateOrderStatus => {
                format!("{base}/orders/{}/status", params.get("id").map(String::as_str).unwrap_or(""))
            }
            OrderAction::CancelOrder => {
                format!("{base}/orders/{}", params.get("id").map(String::as_str).unwrap_or(""))
            }
            OrderAction::CleanupExpiredOrders => format!("{base}/orders/cleanup"),
            OrderAction::RecoverPendingOrders => format!("{base}/orders/recovery"),
        }
    }
}

/// Builds the HTTP request for an action.
pub trait RequestBuilder: Send + Sync {
    fn build(
        &self,
        endpoint: &str,
        action: OrderAction,
        body: Option<serde_json::Value>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> HttpRequest;
}

/// Default method mapping, per the normative action -> HTTP method table.
pub struct DefaultRequestBuilder;

impl RequestBuilder for DefaultRequestBuilder {
    fn build(
        &self,
        endpoint: &str,
        action: OrderAction,
        body: Option<serde_json::Value>,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> HttpRequest {
        let method = match action {
            OrderAction::CreateOrder => HttpMethod::Post,
            OrderAction::QueryOrderStatus => HttpMethod::Get,
            OrderAction::UpdateOrderStatus => HttpMethod::Put,
            OrderAction::CancelOrder => HttpMethod::Delete,
            OrderAction::CleanupExpiredOrders => HttpMethod::Post,
            OrderAction::RecoverPendingOrders => HttpMethod::Post,
        };
        HttpRequest {
            method,
            url: endpoint.to_string(),
            body,
            headers,
            timeout,
        }
    }
}

/// Executes an `HttpRequest`, returning the raw body bytes and status.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IapError>;
}

pub struct DefaultRequestExecutor {
    client: reqwest::Client,
}

impl DefaultRequestExecutor {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for DefaultRequestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RequestExecutor for DefaultRequestExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, IapError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url).timeout(request.timeout);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(IapError::from)?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(IapError::from)?.to_vec();
        Ok(HttpResponse { status, bytes })
    }
}

/// Parses an `HttpResponse` into a typed value, applying the fixed
/// HTTP-status-to-error map. This map is normative and must be preserved
/// bit-exact:
///
/// | Status    | Error kind                             |
/// |-----------|-----------------------------------------|
/// | 200-299   | success                                   |
/// | 400       | order_creation_failed("Bad request")      |
/// | 404       | order_not_found                           |
/// | 409       | order_already_completed                   |
/// | 410       | order_expired                             |
/// | 422       | order_validation_failed                   |
/// | 500-599   | network_error                             |
/// | other     | network_error                             |
/// Returns the parsed JSON body on success, after applying the status map.
/// Kept returning `serde_json::Value` (rather than a generic `T`) so the
/// trait stays object-safe; call sites deserialize into a typed request's
/// matching response struct, the same two-layer shape
/// `crab_client::client::http` uses (typed request in, `serde_json::Value`
/// out).
pub trait ResponseParser: Send + Sync {
    fn parse(&self, response: &HttpResponse) -> Result<serde_json::Value, IapError>;
}

pub struct DefaultResponseParser;

impl ResponseParser for DefaultResponseParser {
    fn parse(&self, response: &HttpResponse) -> Result<serde_json::Value, IapError> {
        map_status(response.status)?;
        if response.bytes.is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&response.bytes).map_err(IapError::from)
    }
}

/// Applies the fixed status -> error mapping. `Ok(())` means 2xx.
pub fn map_status(status: u16) -> Result<(), IapError> {
    match status {
        200..=299 => Ok(()),
        400 => Err(IapError::OrderCreationFailed("Bad request".into())),
        404 => Err(IapError::OrderNotFound(String::new())),
        409 => Err(IapError::OrderAlreadyCompleted),
        410 => Err(IapError::OrderExpired),
        422 => Err(IapError::OrderValidationFailed(String::new())),
        500..=599 => Err(IapError::NetworkError(format!("server error {status}"))),
        other => Err(IapError::NetworkError(format!("unexpected status {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_map_matches_normative_table() {
        assert!(map_status(200).is_ok());
        assert!(map_status(204).is_ok());
        assert!(matches!(map_status(400), Err(IapError::OrderCreationFailed(_))));
        assert!(matches!(map_status(404), Err(IapError::OrderNotFound(_))));
        assert!(matches!(map_status(409), Err(IapError::OrderAlreadyCompleted)));
        assert!(matches!(map_status(410), Err(IapError::OrderExpired)));
        assert!(matches!(map_status(422), Err(IapError::OrderValidationFailed(_))));
        assert!(matches!(map_status(500), Err(IapError::NetworkError(_))));
        assert!(matches!(map_status(503), Err(IapError::NetworkError(_))));
        assert!(matches!(map_status(418), Err(IapError::NetworkError(_))));
    }

    #[test]
    fn default_endpoint_builder_matches_normative_paths() {
        let builder = DefaultEndpointBuilder {
            base_url: "https://api.example.com".into(),
        };
        let mut params = PathParams::new();
        params.insert("id", "abc".into());

        assert_eq!(
            builder.build(OrderAction::CreateOrder, &PathParams::new()),
            "https://api.example.com/orders"
        );
        assert_eq!(
            builder.build(OrderAction::QueryOrderStatus, &params),
            "https://api.example.com/orders/abc/status"
        );
        assert_eq!(
            builder.build(OrderAction::UpdateOrderStatus, &params),
            "https://api.example.com/orders/abc/status"
        );
        assert_eq!(
            builder.build(OrderAction::CancelOrder, &params),
            "https://api.example.com/orders/abc"
        );
        assert_eq!(
            builder.build(OrderAction::CleanupExpiredOrders, &PathParams::new()),
            "https://api.example.com/orders/cleanup"
        );
        assert_eq!(
            builder.build(OrderAction::RecoverPendingOrders, &PathParams::new()),
            "https://api.example.com/orders/recovery"
        );
    }

    #[test]
    fn default_request_builder_matches_normative_methods() {
        let builder = DefaultRequestBuilder;
        let req = builder.build("u", OrderAction::CreateOrder, None, HashMap::new(), Duration::from_secs(1));
        assert_eq!(req.method, HttpMethod::Post);
        let req = builder.build("u", OrderAction::QueryOrderStatus, None, HashMap::new(), Duration::from_secs(1));
        assert_eq!(req.method, HttpMethod::Get);
        let req = builder.build("u", OrderAction::UpdateOrderStatus, None, HashMap::new(), Duration::from_secs(1));
        assert_eq!(req.method, HttpMethod::Put);
        let req = builder.build("u", OrderAction::CancelOrder, None, HashMap::new(), Duration::from_secs(1));
        assert_eq!(req.method, HttpMethod::Delete);
    }
}
