//! Composes the four strategies with the Retry Manager into the six typed
//! order RPCs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::IapError;
use crate::retry::RetryManager;

use super::strategies::{
    DefaultEndpointBuilder, DefaultRequestBuilder, DefaultRequestExecutor, DefaultResponseParser,
    EndpointBuilder, PathParams, RequestBuilder, RequestExecutor, ResponseParser,
};
use super::wire::{CreateOrderRequest, CreateOrderResponse, OrderAction, OrderStatusResponse};

/// Typed RPC client over the merchant backend's order endpoints.
pub struct NetworkClient {
    endpoint_builder: Arc<dyn EndpointBuilder>,
    request_builder: Arc<dyn RequestBuilder>,
    executor: Arc<dyn RequestExecutor>,
    parser: Arc<dyn ResponseParser>,
    retry: RetryManager,
    timeout: Duration,
}

impl NetworkClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, retry: RetryManager) -> Self {
        Self {
            endpoint_builder: Arc::new(DefaultEndpointBuilder { base_url: base_url.into() }),
            request_builder: Arc::new(DefaultRequestBuilder),
            executor: Arc::new(DefaultRequestExecutor::new()),
            parser: Arc::new(DefaultResponseParser),
            retry,
            timeout,
        }
    }

    /// Overrides one or more of the four injection points, for testing or
    /// for embedding applications with their own transport.
    pub fn with_strategies(
        mut self,
        endpoint_builder: Option<Arc<dyn EndpointBuilder>>,
        request_builder: Option<Arc<dyn RequestBuilder>>,
        executor: Option<Arc<dyn RequestExecutor>>,
        parser: Option<Arc<dyn ResponseParser>>,
    ) -> Self {
        if let Some(b) = endpoint_builder {
            self.endpoint_builder = b;
        }
        if let Some(b) = request_builder {
            self.request_builder = b;
        }
        if let Some(e) = executor {
            self.executor = e;
        }
        if let Some(p) = parser {
            self.parser = p;
        }
        self
    }

    /// Runs `action` through the retry manager: retries `NetworkError`/
    /// `Timeout`-equivalent failures with exponential backoff up to the
    /// configured max, and resets the attempt counter on success.
    #[tracing::instrument(skip(self, body), fields(action = action.as_str()))]
    async fn execute(
        &self,
        action: OrderAction,
        params: PathParams,
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, IapError> {
        let op_key = action.as_str();
        let endpoint = self.endpoint_builder.build(action, &params);

        loop {
            let request = self.request_builder.build(
                &endpoint,
                action,
                body.clone(),
                HashMap::new(),
                self.timeout,
            );

            let outcome = match self.executor.execute(request).await {
                Ok(response) => self.parser.parse(&response),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    self.retry.reset(op_key).await;
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && self.retry.should_retry(op_key).await => {
                    self.retry.record_attempt(op_key).await;
                    let delay = self.retry.get_delay(op_key).await;
                    tracing::warn!(action = op_key, error = %err, delay_ms = delay.as_millis() as u64, "retrying network action");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if err.is_retryable() {
                        self.retry.record_attempt(op_key).await;
                    }
                    return Err(err);
                }
            }
        }
    }

    pub async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse, IapError> {
        let body = serde_json::to_value(&request)?;
        let value = self.execute(OrderAction::CreateOrder, PathParams::new(), Some(body)).await?;
        serde_json::from_value(value).map_err(IapError::from)
    }

    pub async fn query_order_status(&self, server_order_id: &str) -> Result<OrderStatusResponse, IapError> {
        let mut params = PathParams::new();
        params.insert("id", server_order_id.to_string());
        let value = self.execute(OrderAction::QueryOrderStatus, params, None).await?;
        serde_json::from_value(value).map_err(IapError::from)
    }

    pub async fn update_order_status(
        &self,
        server_order_id: &str,
        status: &str,
    ) -> Result<OrderStatusResponse, IapError> {
        let mut params = PathParams::new();
        params.insert("id", server_order_id.to_string());
        let body = serde_json::json!({ "status": status });
        let value = self.execute(OrderAction::UpdateOrderStatus, params, Some(body)).await?;
        serde_json::from_value(value).map_err(IapError::from)
    }

    pub async fn cancel_order(&self, server_order_id: &str) -> Result<(), IapError> {
        let mut params = PathParams::new();
        params.insert("id", server_order_id.to_string());
        self.execute(OrderAction::CancelOrder, params, None).await?;
        Ok(())
    }

    pub async fn cleanup_expired_orders(&self) -> Result<(), IapError> {
        self.execute(OrderAction::CleanupExpiredOrders, PathParams::new(), None).await?;
        Ok(())
    }

    pub async fn recover_pending_orders(&self) -> Result<serde_json::Value, IapError> {
        self.execute(OrderAction::RecoverPendingOrders, PathParams::new(), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::strategies::{HttpRequest, HttpResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted transport test double: returns one response per call from a
    /// pre-seeded queue, matching the teacher workspace's preference for
    /// hand-written test doubles over a mocking framework.
    struct ScriptedExecutor {
        responses: Mutex<std::collections::VecDeque<Result<HttpResponse, IapError>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RequestExecutor for ScriptedExecutor {
        async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, IapError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses.lock().unwrap().pop_front().expect("no scripted response left")
        }
    }

    fn ok_response(body: serde_json::Value) -> HttpResponse {
        HttpResponse { status: 200, bytes: serde_json::to_vec(&body).unwrap() }
    }

    #[tokio::test]
    async fn retries_transport_failures_then_succeeds() {
        let retry = RetryManager::new(5, Duration::from_millis(0));
        let executor = Arc::new(ScriptedExecutor {
            responses: Mutex::new(
                vec![
                    Err(IapError::NetworkError("flap 1".into())),
                    Err(IapError::NetworkError("flap 2".into())),
                    Ok(ok_response(serde_json::json!({
                        "order_id": "o1", "server_order_id": "s1", "status": "pending"
                    }))),
                ]
                .into(),
            ),
            calls: AtomicUsize::new(0),
        });

        let client = NetworkClient::new("https://example.com", Duration::from_secs(1), retry.clone())
            .with_strategies(None, None, Some(executor.clone()), None);

        let result = client
            .create_order(CreateOrderRequest {
                local_order_id: "l1".into(),
                product_id: "p.pro".into(),
                user_info: None,
                created_at: chrono::Utc::now(),
                amount: None,
                currency: None,
                user_id: None,
                app_account_token: None,
            })
            .await
            .unwrap();

        assert_eq!(result.server_order_id, "s1");
        assert_eq!(executor.calls.load(Ordering::SeqCst), 3);
        assert_eq!(retry.attempts("create_order").await, 0);
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let retry = RetryManager::new(5, Duration::from_millis(0));
        let executor = Arc::new(ScriptedExecutor {
            responses: Mutex::new(vec![Ok(HttpResponse { status: 400, bytes: vec![] })].into()),
            calls: AtomicUsize::new(0),
        });

        let client = NetworkClient::new("https://example.com", Duration::from_secs(1), retry.clone())
            .with_strategies(None, None, Some(executor.clone()), None);

        let err = client
            .create_order(CreateOrderRequest {
                local_order_id: "l1".into(),
                product_id: "p.pro".into(),
                user_info: None,
                created_at: chrono::Utc::now(),
                amount: None,
                currency: None,
                user_id: None,
                app_account_token: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, IapError::OrderCreationFailed(_)));
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    }
}
