//! Token price feed
//!
//! Features:
//! - Retrying, cache-aware HTTP request executor
//! - Adapters for the internal aggregator, the DEX index and the market-data index
//! - Symbol resolution with an independent metadata cache
//! - Fallback-chain orchestrator with a short-TTL price cache and chunked batches
//! - Cancellable polling price streams

pub mod client;
pub mod resolver;
pub mod service;
pub mod sources;
pub mod state;
pub mod stream;

pub use client::{
    HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestExecutor, RequestOptions,
    ReqwestTransport,
};
pub use resolver::MetadataResolver;
pub use service::{ServiceStats, TokenPriceService};
pub use sources::{MetadataSource, PriceSource, QuoteRequest, ServiceHealth};
pub use state::{CacheEntry, CacheStore, TtlCache};
pub use stream::{PriceStreamManager, StreamEvent, StreamHandle};
