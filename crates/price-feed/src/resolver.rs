//! Symbol -> on-chain token resolution
//!
//! Sources are consulted in order and the first match wins. Resolved
//! metadata is cached independently of prices; misses are not cached.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use oracle_core::{ChainId, TokenMetadata};

use crate::sources::MetadataSource;
use crate::state::TtlCache;

pub struct MetadataResolver {
    sources: Vec<Arc<dyn MetadataSource>>,
    cache: TtlCache<String, TokenMetadata>,
}

impl MetadataResolver {
    pub fn new(sources: Vec<Arc<dyn MetadataSource>>, ttl: Duration) -> Self {
        Self {
            sources,
            cache: TtlCache::new(ttl),
        }
    }

    fn cache_key(symbol: &str, chain: ChainId) -> String {
        format!("{}:{}", symbol.trim().to_ascii_uppercase(), chain.name())
    }

    /// Resolve `symbol` on `chain`, or `None` when no source knows it
    pub async fn resolve(&self, symbol: &str, chain: ChainId) -> Option<TokenMetadata> {
        let key = Self::cache_key(symbol, chain);
        if let Some(token) = self.cache.get_fresh(&key) {
            debug!(symbol = %symbol, chain = %chain, "Metadata cache hit");
            return Some(token);
        }

        for source in &self.sources {
            if !source.is_enabled() {
                debug!(source = source.name(), "Metadata source not configured, skipping");
                continue;
            }

            match source.find_token(symbol, chain).await {
                Ok(Some(token)) => {
                    debug!(
                        source = source.name(),
                        symbol = %token.symbol,
                        address = %token.address,
                        chain = %chain,
                        "Resolved token"
                    );
                    self.cache.insert(key, token.clone());
                    return Some(token);
                }
                Ok(None) => {
                    debug!(source = source.name(), symbol = %symbol, "No match");
                }
                Err(e) => {
                    warn!(
                        source = source.name(),
                        symbol = %symbol,
                        kind = %e.kind(),
                        error = %e,
                        "Metadata lookup failed, advancing to next source"
                    );
                }
            }
        }

        None
    }

    pub fn clear_cache(&self) {
        self.cache.clear_all();
    }

    pub fn cache_size(&self) -> usize {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use oracle_core::{SourceError, SourceResult};
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Answer {
        Found(&'static str),
        Missing,
        Broken,
    }

    struct StubSource {
        name: &'static str,
        enabled: bool,
        answer: Answer,
        calls: AtomicUsize,
    }

    impl StubSource {
        fn new(name: &'static str, answer: Answer) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled: true,
                answer,
                calls: AtomicUsize::new(0),
            })
        }

        fn disabled(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                enabled: false,
                answer: Answer::Found("0x0000000000000000000000000000000000000001"),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MetadataSource for StubSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn find_token(&self, symbol: &str, chain: ChainId) -> SourceResult<Option<TokenMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.answer {
                Answer::Found(address) => Ok(Some(TokenMetadata::new(symbol, self.name, address, chain))),
                Answer::Missing => Ok(None),
                Answer::Broken => Err(SourceError::upstream("stub", "boom")),
            }
        }
    }

    fn resolver(sources: Vec<Arc<StubSource>>) -> MetadataResolver {
        let sources = sources
            .into_iter()
            .map(|s| s as Arc<dyn MetadataSource>)
            .collect();
        MetadataResolver::new(sources, Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let first = StubSource::new("first", Answer::Found("0x0000000000000000000000000000000000000001"));
        let second = StubSource::new("second", Answer::Found("0x0000000000000000000000000000000000000002"));
        let resolver = resolver(vec![first.clone(), second.clone()]);

        let token = resolver.resolve("weth", ChainId::Ethereum).await.unwrap();
        assert_eq!(token.name, "first");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_errors_and_misses_fall_through() {
        let broken = StubSource::new("broken", Answer::Broken);
        let missing = StubSource::new("missing", Answer::Missing);
        let last = StubSource::new("last", Answer::Found("0x0000000000000000000000000000000000000003"));
        let resolver = resolver(vec![broken.clone(), missing.clone(), last]);

        let token = resolver.resolve("ARB", ChainId::Arbitrum).await.unwrap();
        assert_eq!(token.name, "last");
        assert_eq!(broken.calls(), 1);
        assert_eq!(missing.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_sources_skipped() {
        let disabled = StubSource::disabled("keyed");
        let resolver = resolver(vec![disabled.clone()]);

        assert!(resolver.resolve("LINK", ChainId::Ethereum).await.is_none());
        assert_eq!(disabled.calls(), 0);
    }

    #[tokio::test]
    async fn test_hits_cached_and_misses_not() {
        let source = StubSource::new("only", Answer::Found("0x0000000000000000000000000000000000000001"));
        let resolver = resolver(vec![source.clone()]);

        resolver.resolve("usdc", ChainId::Base).await.unwrap();
        resolver.resolve("USDC", ChainId::Base).await.unwrap();
        assert_eq!(source.calls(), 1);
        assert_eq!(resolver.cache_size(), 1);

        // Different chain is a different key
        resolver.resolve("USDC", ChainId::Polygon).await.unwrap();
        assert_eq!(source.calls(), 2);

        let missing = StubSource::new("missing", Answer::Missing);
        let resolver = self::resolver(vec![missing.clone()]);
        assert!(resolver.resolve("NOPE", ChainId::Base).await.is_none());
        assert!(resolver.resolve("NOPE", ChainId::Base).await.is_none());
        assert_eq!(missing.calls(), 2);
        assert_eq!(resolver.cache_size(), 0);
    }
}
