//! End-to-end: real adapters and executor over a routing fake transport

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use oracle_core::{
    ChainId, Confidence, OracleConfig, PositionPnLInput, RequestError, RequestResult,
    TokenIdentifier,
};
use oracle_feed::{
    HttpRequest, HttpResponse, HttpTransport, PriceStreamManager, StreamEvent, TokenPriceService,
};

const WETH: &str = "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2";
const PAIR: &str = "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640";

/// Answers by longest matching URL prefix; anything else is refused
#[derive(Default)]
struct Upstream {
    routes: Mutex<Vec<(String, u16, Value)>>,
    log: Mutex<Vec<String>>,
}

impl Upstream {
    /// Replaces any earlier answer for the same prefix
    fn respond(&self, prefix: &str, status: u16, body: Value) {
        let mut routes = self.routes.lock();
        routes.retain(|(p, _, _)| p != prefix);
        routes.push((prefix.to_string(), status, body));
    }

    fn hits(&self, prefix: &str) -> usize {
        self.log.lock().iter().filter(|u| u.starts_with(prefix)).count()
    }
}

#[async_trait]
impl HttpTransport for Upstream {
    async fn execute(&self, request: &HttpRequest) -> RequestResult<HttpResponse> {
        self.log.lock().push(request.url.clone());

        let routes = self.routes.lock();
        let route = routes
            .iter()
            .filter(|(prefix, _, _)| request.url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _, _)| prefix.len());

        match route {
            Some((_, status, body)) => Ok(HttpResponse {
                status: *status,
                body: body.to_string(),
            }),
            None => Err(RequestError::Network {
                endpoint: request.url.clone(),
                message: "connection refused".into(),
            }),
        }
    }
}

const INTERNAL_ETH: &str = "http://localhost:3001/api/price/ethereum";
const DEX_SEARCH: &str = "https://api.dexscreener.com/latest/dex/search";
const DEX_TOKENS: &str = "https://api.dexscreener.com/latest/dex/tokens/";
const MARKET_POOLS: &str = "https://pro-api.coingecko.com/api/v3/onchain/networks/eth/tokens/";

fn config() -> OracleConfig {
    let mut config = OracleConfig::default();
    config.request.max_retries = 1;
    config.request.retry_base_delay_ms = 50;
    config.batch.chunk_size = 2;
    config
}

fn dex_pair(price_usd: &str, liquidity: f64) -> Value {
    json!({
        "chainId": "ethereum",
        "dexId": "uniswap",
        "pairAddress": PAIR,
        "baseToken": {"address": WETH, "name": "Wrapped Ether", "symbol": "WETH"},
        "priceUsd": price_usd,
        "liquidity": {"usd": liquidity},
        "volume": {"h24": 1.0e7}
    })
}

fn upstream_with_search() -> Arc<Upstream> {
    let upstream = Arc::new(Upstream::default());
    upstream.respond(DEX_SEARCH, 200, json!({"pairs": [dex_pair("3500.10", 1.0e8)]}));
    upstream
}

fn internal_body(price: f64) -> Value {
    json!({
        "success": true,
        "data": {
            "symbol": "WETH",
            "address": WETH,
            "priceUsd": price,
            "liquidity": 5.0e8,
            "sources": [
                {"exchange": "binance", "price": price - 1.0, "liquidity": 1.0e9},
                {"exchange": "coinbase", "price": price + 1.0}
            ]
        }
    })
}

#[tokio::test(start_paused = true)]
async fn internal_aggregator_wins_with_high_confidence() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 200, internal_body(3501.0));
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    let price = service.get_price("weth", None, None).await.unwrap().unwrap();
    assert_eq!(price.price_usd, 3501.0);
    assert_eq!(price.confidence, Confidence::High);
    assert_eq!(price.source, "internal-aggregator");
    assert_eq!(upstream.hits(DEX_TOKENS), 0);
}

#[tokio::test(start_paused = true)]
async fn failing_aggregator_falls_back_to_dex_index() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 503, json!({"error": "maintenance"}));
    upstream.respond(
        DEX_TOKENS,
        200,
        json!({"pairs": [dex_pair("3499.00", 2.0e6), dex_pair("3500.10", 1.0e8)]}),
    );
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    let price = service.get_price("WETH", None, Some(ChainId::Ethereum)).await.unwrap().unwrap();
    assert_eq!(price.source, "dex-index");
    assert_eq!(price.confidence, Confidence::Medium);
    assert_eq!(price.price_usd, 3500.10);
    assert_eq!(price.liquidity_usd, Some(1.0e8));
    // One retry on the 503
    assert_eq!(upstream.hits(INTERNAL_ETH), 2);

    // Served from cache within the TTL
    let again = service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(again, price);
    assert_eq!(upstream.hits(DEX_TOKENS), 1);

    // Price TTL is 10s; the fallback chain runs again from the top
    tokio::time::advance(Duration::from_secs(11)).await;
    service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(upstream.hits(INTERNAL_ETH), 4);
    assert_eq!(upstream.hits(DEX_TOKENS), 2);
}

#[tokio::test(start_paused = true)]
async fn price_ttl_expiry_refetches_exactly_once() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 200, internal_body(3501.0));
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    let first = service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(upstream.hits(INTERNAL_ETH), 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    let cached = service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(cached.timestamp_ms, first.timestamp_ms);
    assert_eq!(upstream.hits(INTERNAL_ETH), 1);

    // Upstream moved; the response cache must not hand back the old body
    upstream.respond(INTERNAL_ETH, 200, internal_body(3600.0));
    tokio::time::advance(Duration::from_secs(6)).await;
    let fresh = service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(upstream.hits(INTERNAL_ETH), 2);
    assert_eq!(fresh.price_usd, 3600.0);

    // Metadata keeps its own, longer cache
    assert_eq!(upstream.hits(DEX_SEARCH), 1);
}

#[tokio::test(start_paused = true)]
async fn everything_failing_without_market_key_is_none() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 500, json!({}));
    upstream.respond(DEX_TOKENS, 200, json!({"pairs": []}));
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    assert!(service.get_price("WETH", None, None).await.unwrap().is_none());
    assert_eq!(upstream.hits("https://pro-api.coingecko.com"), 0);
    assert_eq!(service.cache_size(), 0);
}

#[tokio::test(start_paused = true)]
async fn market_data_used_last_when_keyed() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 500, json!({}));
    upstream.respond(DEX_TOKENS, 200, json!({"pairs": null}));
    upstream.respond(
        MARKET_POOLS,
        200,
        json!({"data": [{
            "attributes": {"base_token_price_usd": "3498.5", "reserve_in_usd": "1000000"},
            "relationships": {"base_token": {"data": {"id": format!("eth_{}", WETH.to_lowercase())}}}
        }]}),
    );

    let mut config = config();
    config.market_data.api_key = Some("demo-key".into());
    let service = TokenPriceService::with_transport(&config, upstream.clone());

    let price = service.get_price("WETH", None, None).await.unwrap().unwrap();
    assert_eq!(price.source, "market-data");
    assert_eq!(price.confidence, Confidence::Low);
    assert_eq!(price.price_usd, 3498.5);
}

#[tokio::test(start_paused = true)]
async fn unresolvable_symbol_is_none() {
    let upstream = Arc::new(Upstream::default());
    upstream.respond(DEX_SEARCH, 200, json!({"pairs": []}));
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    assert!(service.get_price("NOPE", None, None).await.unwrap().is_none());
    assert_eq!(upstream.hits(INTERNAL_ETH), 0);
}

#[tokio::test(start_paused = true)]
async fn aggregated_price_merges_every_source() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 200, internal_body(3500.0));
    upstream.respond(DEX_TOKENS, 200, json!({"pairs": [dex_pair("3520.00", 3.0e7)]}));
    let service = TokenPriceService::with_transport(&config(), upstream.clone());

    let aggregated = service.get_aggregated_price("WETH", None).await.unwrap().unwrap();
    let sources: Vec<_> = aggregated.quotes.iter().map(|q| q.source.as_str()).collect();
    assert_eq!(sources, vec!["internal-aggregator", "binance", "coinbase", "dex-index"]);

    // binance reports the deepest book
    assert_eq!(aggregated.best.as_ref().unwrap().source, "binance");
    assert_eq!(aggregated.statistics.count, 4);
    assert!(aggregated.weighted_average.unwrap() > 3499.0);
    // dex-index trades ~0.6% above binance
    let widest = &aggregated.arbitrage[0];
    assert_eq!(widest.buy_from, "binance");
    assert_eq!(widest.sell_to, "dex-index");
}

#[tokio::test(start_paused = true)]
async fn batch_and_pnl_through_the_stack() {
    let upstream = upstream_with_search();
    upstream.respond(INTERNAL_ETH, 200, internal_body(3600.0));
    let service = Arc::new(TokenPriceService::with_transport(&config(), upstream.clone()));

    let ids: Vec<TokenIdentifier> = vec![
        "WETH".parse().unwrap(),
        format!("WETH:{PAIR}").parse().unwrap(),
        "WETH@ethereum".parse().unwrap(),
    ];
    let prices = service.get_multiple_prices(&ids).await;
    assert_eq!(prices.len(), 3);
    assert_eq!(prices[&format!("WETH:{PAIR}")].pair_address.as_deref(), Some(PAIR));

    let input = PositionPnLInput::new("WETH", "$3,000.00", "$500", "5x", false);
    let pnl = service.calculate_position_pnl(&input).await.unwrap().unwrap();
    // short: (3600-3000)/3000 * 2500 * -1
    assert!((pnl.unrealized_pnl + 500.0).abs() < 1e-9);
    assert_eq!(pnl.display().unrealized_pnl, "-500.00");
    assert_eq!(pnl.display().unrealized_pnl_percentage, "-100.00%");

    let manager = PriceStreamManager::new(Arc::clone(&service), config().stream);
    let (handle, mut events) = manager.start_stream(vec!["WETH".parse().unwrap()], None);
    match events.recv().await.unwrap() {
        StreamEvent::Update { price, .. } => assert_eq!(price.price_usd, 3600.0),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(manager.stop_stream(handle));
    assert!(events.recv().await.is_none());
}
