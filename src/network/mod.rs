//! Typed RPC over the merchant backend's six well-known order actions,
//! composed from four injectable strategies the way
//! `crab_client::client::http::NetworkHttpClient` wraps a single
//! `reqwest::Client` behind a typed facade.

mod client;
mod strategies;
mod wire;

pub use client::NetworkClient;
pub use strategies::{
    DefaultEndpointBuilder, DefaultRequestBuilder, DefaultRequestExecutor, DefaultResponseParser,
    EndpointBuilder, HttpMethod, HttpRequest, HttpResponse, RequestBuilder, RequestExecutor,
    ResponseParser,
};
pub use wire::{CreateOrderRequest, CreateOrderResponse, OrderAction, OrderStatusResponse};
