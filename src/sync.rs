use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::etherscan::TransactionSource;
use crate::models::{Direction, Transaction};
use crate::storage::{TransactionStore, TxCache};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub cached_at_start: usize,
    pub pages_fetched: usize,
    pub inserted: usize,
    pub resume_block: u64,
}

/// Brings `store` up to date with the upstream history of `address`.
///
/// Pages are requested from the highest block already known. The boundary
/// block is always returned again, so every page is filtered by hash before
/// it is stored. The loop ends at the first page that contains nothing new.
pub async fn synchronize<S, F>(
    store: &mut S,
    source: &mut F,
    address: &str,
    initial_block: u64,
) -> Result<SyncOutcome>
where
    S: TransactionStore + Send,
    F: TransactionSource + Send,
{
    let existing = store.all().await?;
    let mut known: HashSet<String> = existing.iter().map(|tx| tx.hash.clone()).collect();
    let mut max_block = existing.iter().map(|tx| tx.block_number).max();

    let mut outcome = SyncOutcome {
        cached_at_start: existing.len(),
        ..SyncOutcome::default()
    };
    info!(
        %address,
        count = outcome.cached_at_start,
        "found transactions in local cache"
    );

    loop {
        let resume_block = max_block.unwrap_or(initial_block);
        outcome.resume_block = resume_block;

        let page = source.fetch_page(address, resume_block).await?;
        outcome.pages_fetched += 1;

        let fresh: Vec<Transaction> = page
            .into_iter()
            .filter(|tx| known.insert(tx.hash.clone()))
            .collect();

        if fresh.is_empty() {
            info!(%address, "all new transactions fetched");
            break;
        }

        store.insert_many(&fresh).await?;
        outcome.inserted += fresh.len();
        info!(
            %address,
            new = fresh.len(),
            block = resume_block,
            "fetched new transactions"
        );

        max_block = fresh
            .iter()
            .map(|tx| tx.block_number)
            .chain(max_block)
            .max();
    }

    Ok(outcome)
}

/// Synchronizes the on-disk cache of `address` and returns the cached
/// transactions travelling in `direction`.
pub async fn sync_address<F>(
    cache_dir: &Path,
    source: &mut F,
    address: &str,
    direction: Direction,
    initial_block: u64,
) -> Result<(Vec<Transaction>, SyncOutcome)>
where
    F: TransactionSource + Send,
{
    let mut cache = TxCache::open(cache_dir, address).await?;
    let outcome = synchronize(&mut cache, source, address, initial_block).await?;
    let all = cache.all().await?;
    cache.close().await?;

    Ok((direction.select(all, address), outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::etherscan::PAGE_SIZE;
    use async_trait::async_trait;

    #[derive(Default)]
    struct MemoryStore {
        rows: Vec<Transaction>,
    }

    #[async_trait]
    impl TransactionStore for MemoryStore {
        async fn all(&self) -> Result<Vec<Transaction>> {
            Ok(self.rows.clone())
        }

        async fn insert_many(&mut self, txs: &[Transaction]) -> Result<()> {
            self.rows.extend_from_slice(txs);
            Ok(())
        }
    }

    /// Serves `history` the way Etherscan paginates: everything at or above
    /// the start block, ascending, capped at one page.
    struct FakeUpstream {
        history: Vec<Transaction>,
        requests: Vec<u64>,
        fail_after: Option<usize>,
    }

    impl FakeUpstream {
        fn new(history: Vec<Transaction>) -> Self {
            Self {
                history,
                requests: Vec::new(),
                fail_after: None,
            }
        }
    }

    #[async_trait]
    impl TransactionSource for FakeUpstream {
        async fn fetch_page(&mut self, _address: &str, start_block: u64) -> Result<Vec<Transaction>> {
            if self.fail_after == Some(self.requests.len()) {
                return Err(Error::upstream("status message \"NOTOK\"", None));
            }
            self.requests.push(start_block);
            let mut page: Vec<Transaction> = self
                .history
                .iter()
                .filter(|tx| tx.block_number >= start_block)
                .cloned()
                .collect();
            page.sort_by_key(|tx| tx.block_number);
            page.truncate(PAGE_SIZE);
            Ok(page)
        }
    }

    fn tx(n: usize, block_number: u64) -> Transaction {
        Transaction {
            hash: format!("0x{n:064x}"),
            block_number,
            timestamp: 1_600_000_000 + block_number as i64,
            from: "0xaaa".to_string(),
            to: "0xbbb".to_string(),
            gas_used: 21_000,
            gas_price: 1_000_000_000,
            receipt_status: "1".to_string(),
        }
    }

    /// Three transactions per block, so page edges land mid-block.
    fn history(count: usize) -> Vec<Transaction> {
        (0..count).map(|n| tx(n, 1_000 + (n / 3) as u64)).collect()
    }

    fn hashes(txs: &[Transaction]) -> HashSet<String> {
        txs.iter().map(|tx| tx.hash.clone()).collect()
    }

    #[tokio::test]
    async fn converges_to_full_history_across_pages() {
        let upstream_txs = history(250);
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(upstream_txs.clone());

        let outcome = synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        assert_eq!(store.rows.len(), 250);
        assert_eq!(hashes(&store.rows), hashes(&upstream_txs));
        assert_eq!(outcome.inserted, 250);
        assert_eq!(upstream.requests[0], 0);
        assert!(upstream.requests.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn second_run_is_idempotent() {
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(history(120));
        synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();
        let before = hashes(&store.rows);

        let mut upstream = FakeUpstream::new(history(120));
        let outcome = synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.pages_fetched, 1);
        assert_eq!(outcome.cached_at_start, 120);
        assert_eq!(hashes(&store.rows), before);
        assert_eq!(store.rows.len(), 120);
    }

    #[tokio::test]
    async fn growing_history_is_never_double_counted() {
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(history(40));
        synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        // New transactions land in the boundary block and after it.
        let mut grown = history(40);
        let boundary = grown.last().unwrap().block_number;
        grown.push(tx(1_000, boundary));
        grown.extend((0..150).map(|n| tx(2_000 + n, boundary + 1 + (n / 2) as u64)));

        let mut upstream = FakeUpstream::new(grown.clone());
        let outcome = synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        assert_eq!(outcome.inserted, 151);
        assert_eq!(store.rows.len(), grown.len());
        assert_eq!(hashes(&store.rows), hashes(&grown));
        assert_eq!(upstream.requests[0], boundary);
    }

    #[tokio::test]
    async fn boundary_block_refetch_terminates_without_reinsert() {
        let mut store = MemoryStore {
            rows: vec![tx(1, 500), tx(2, 500)],
        };
        let mut upstream = FakeUpstream::new(vec![tx(1, 500), tx(2, 500)]);

        let outcome = synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        assert_eq!(upstream.requests, vec![500]);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(store.rows.len(), 2);
    }

    #[tokio::test]
    async fn duplicate_hashes_within_a_page_are_stored_once() {
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(vec![tx(1, 10), tx(1, 10), tx(2, 11)]);

        synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap();

        assert_eq!(store.rows.len(), 2);
    }

    #[tokio::test]
    async fn empty_cache_starts_at_initial_block() {
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(Vec::new());

        let outcome = synchronize(&mut store, &mut upstream, "0xaaa", 13_268_736)
            .await
            .unwrap();

        assert_eq!(upstream.requests, vec![13_268_736]);
        assert_eq!(outcome.resume_block, 13_268_736);
        assert!(store.rows.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_aborts_and_keeps_earlier_pages() {
        let mut store = MemoryStore::default();
        let mut upstream = FakeUpstream::new(history(150));
        upstream.fail_after = Some(1);

        let err = synchronize(&mut store, &mut upstream, "0xaaa", 0)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Upstream { .. }));
        assert_eq!(store.rows.len(), PAGE_SIZE);
    }

    #[tokio::test]
    async fn sync_address_filters_by_direction() {
        let dir = tempfile::tempdir().unwrap();
        let mut txs = history(6);
        txs[1].from = "0xccc".to_string();
        txs[1].to = "0xAAA".to_string();
        let mut upstream = FakeUpstream::new(txs);

        let (outgoing, outcome) =
            sync_address(dir.path(), &mut upstream, "0xAAA", Direction::Outgoing, 0)
                .await
                .unwrap();
        assert_eq!(outcome.inserted, 6);
        assert_eq!(outgoing.len(), 5);

        let (incoming, outcome) =
            sync_address(dir.path(), &mut upstream, "0xaaa", Direction::Incoming, 0)
                .await
                .unwrap();
        assert_eq!(outcome.inserted, 0);
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].from, "0xccc");
    }
}
