// DANS : src/state/decimals_cache.rs

use crate::monitoring::metrics;
use crate::subscription::transport::AssetMetadataSource;
use solana_sdk::pubkey::Pubkey;
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Le résultat mis en cache pour un mint. `Unresolved` est distinct de
/// "zéro décimale" même s'il se lit comme 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachedDecimals {
    Resolved(u8),
    Unresolved,
}

impl CachedDecimals {
    pub fn value(self) -> u8 {
        match self {
            CachedDecimals::Resolved(decimals) => decimals,
            CachedDecimals::Unresolved => 0,
        }
    }
}

/// Cache des décimales par mint, propre à une instance de moniteur.
///
/// Les entrées n'expirent jamais. Un échec de lookup est mis en cache
/// (`Unresolved`) : un mint introuvable coûte au plus un appel par durée de vie
/// du processus, sauf invalidation explicite. Les lookups concurrents d'un même
/// mint partagent un seul appel.
pub struct DecimalsCache {
    source: Arc<dyn AssetMetadataSource>,
    entries: RwLock<HashMap<Pubkey, Arc<OnceCell<CachedDecimals>>>>,
    lookup_timeout: Duration,
}

impl DecimalsCache {
    pub fn new(source: Arc<dyn AssetMetadataSource>, lookup_timeout: Duration) -> Self {
        Self {
            source,
            entries: RwLock::new(HashMap::new()),
            lookup_timeout,
        }
    }

    /// Les décimales du mint, 0 si elles n'ont pas pu être résolues.
    pub async fn resolve_decimals(&self, mint: &Pubkey) -> u8 {
        self.resolve(mint).await.value()
    }

    pub async fn resolve(&self, mint: &Pubkey) -> CachedDecimals {
        let cell = self.cell_for(mint);
        if let Some(cached) = cell.get() {
            metrics::DECIMALS_CACHE_HITS.inc();
            return *cached;
        }

        *cell
            .get_or_init(|| async {
                metrics::DECIMALS_LOOKUPS.inc();
                match tokio::time::timeout(self.lookup_timeout, self.source.fetch_decimals(mint)).await {
                    Ok(Ok(decimals)) => {
                        debug!(mint = %mint, decimals, "[DecimalsCache] Décimales résolues.");
                        CachedDecimals::Resolved(decimals)
                    }
                    Ok(Err(e)) => {
                        warn!(mint = %mint, error = %e, "[DecimalsCache] Lookup échoué, repli sur 0 décimale.");
                        CachedDecimals::Unresolved
                    }
                    Err(_) => {
                        warn!(mint = %mint, timeout_ms = self.lookup_timeout.as_millis() as u64, "[DecimalsCache] Lookup expiré, repli sur 0 décimale.");
                        CachedDecimals::Unresolved
                    }
                }
            })
            .await
    }

    /// Enregistre des décimales connues par ailleurs (ex : embarquées dans une transaction).
    /// La dernière résolution réussie l'emporte.
    pub fn record(&self, mint: Pubkey, decimals: u8) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cell) = entries.get(&mint) {
            if cell.get() == Some(&CachedDecimals::Resolved(decimals)) {
                return;
            }
        }
        entries.insert(mint, Arc::new(OnceCell::new_with(Some(CachedDecimals::Resolved(decimals)))));
    }

    /// Lecture sans lookup.
    pub fn peek(&self, mint: &Pubkey) -> Option<CachedDecimals> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(mint).and_then(|cell| cell.get().copied())
    }

    /// Oublie l'entrée du mint pour forcer une nouvelle résolution.
    pub fn invalidate(&self, mint: &Pubkey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(mint).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cell_for(&self, mint: &Pubkey) -> Arc<OnceCell<CachedDecimals>> {
        if let Some(cell) = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(mint)
        {
            return cell.clone();
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.entry(*mint).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SwapWatchError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        calls: AtomicUsize,
        answer: Option<u8>,
        delay: Duration,
    }

    impl CountingSource {
        fn new(answer: Option<u8>) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), answer, delay: Duration::ZERO })
        }

        fn slow(answer: Option<u8>, delay: Duration) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), answer, delay })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssetMetadataSource for CountingSource {
        async fn fetch_decimals(&self, mint: &Pubkey) -> Result<u8> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.answer
                .ok_or_else(|| SwapWatchError::Rpc(format!("mint {mint} introuvable")))
        }
    }

    #[tokio::test]
    async fn failing_source_is_queried_once_and_yields_zero() {
        let source = CountingSource::new(None);
        let cache = DecimalsCache::new(source.clone(), Duration::from_secs(1));
        let mint = Pubkey::new_unique();

        for _ in 0..5 {
            assert_eq!(cache.resolve_decimals(&mint).await, 0);
        }

        assert_eq!(source.calls(), 1);
        assert_eq!(cache.peek(&mint), Some(CachedDecimals::Unresolved));
    }

    #[tokio::test]
    async fn successful_lookup_is_cached() {
        let source = CountingSource::new(Some(9));
        let cache = DecimalsCache::new(source.clone(), Duration::from_secs(1));
        let mint = Pubkey::new_unique();

        assert_eq!(cache.resolve_decimals(&mint).await, 9);
        assert_eq!(cache.resolve_decimals(&mint).await, 9);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_lookup() {
        let source = CountingSource::new(None);
        let cache = DecimalsCache::new(source.clone(), Duration::from_secs(1));
        let mint = Pubkey::new_unique();

        cache.resolve_decimals(&mint).await;
        assert!(cache.invalidate(&mint));
        cache.resolve_decimals(&mint).await;

        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_lookup() {
        let source = CountingSource::slow(Some(6), Duration::from_millis(50));
        let cache = Arc::new(DecimalsCache::new(source.clone(), Duration::from_secs(1)));
        let mint = Pubkey::new_unique();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.resolve_decimals(&mint).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 6);
        }

        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn timed_out_lookup_is_cached_as_unresolved() {
        let source = CountingSource::slow(Some(6), Duration::from_millis(200));
        let cache = DecimalsCache::new(source.clone(), Duration::from_millis(10));
        let mint = Pubkey::new_unique();

        assert_eq!(cache.resolve(&mint).await, CachedDecimals::Unresolved);
        assert_eq!(cache.resolve_decimals(&mint).await, 0);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn recorded_decimals_replace_unresolved_entry() {
        let source = CountingSource::new(None);
        let cache = DecimalsCache::new(source.clone(), Duration::from_secs(1));
        let mint = Pubkey::new_unique();

        assert_eq!(cache.resolve_decimals(&mint).await, 0);
        cache.record(mint, 6);

        assert_eq!(cache.resolve_decimals(&mint).await, 6);
        assert_eq!(source.calls(), 1);
        assert_eq!(cache.len(), 1);
    }
}
