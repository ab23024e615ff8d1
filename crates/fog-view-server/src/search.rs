//! Search adapter: turns a key batch into fixed-size outcomes
//!
//! Sits between the reconciler and a [`TxOutIndex`]. Per-key problems never
//! fail the batch; only a whole-index failure does.
//!
//! Classification order for each key position:
//! 1. batch shed (no search permit) or position past `max_keys_per_call` → `RateLimited`
//! 2. key not `SEARCH_KEY_LEN` bytes → `BadSearchKey`
//! 3. index lookup → `Found` / `NotFound` / `InternalError`
//!
//! Every payload except a well-formed `Found` is `ciphertext_len` zero bytes.

use std::sync::Arc;

use fog_view_core::constants::SEARCH_KEY_LEN;
use fog_view_core::{SearchKey, TxOutSearchResult, TxOutSearchResultCode};
use tokio::sync::Semaphore;

use crate::collaborator::{CollaboratorError, IndexProgress, KeyLookup, TxOutIndex};
use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchBatch {
    /// Aligned 1:1 with the input keys
    pub results: Vec<TxOutSearchResult>,
    pub progress: IndexProgress,
}

pub struct SearchAdapter {
    index: Arc<dyn TxOutIndex>,
    ciphertext_len: usize,
    max_keys_per_call: usize,
    permits: Semaphore,
}

enum Plan {
    Lookup,
    Skip(TxOutSearchResultCode),
}

impl SearchAdapter {
    pub fn new(
        index: Arc<dyn TxOutIndex>,
        ciphertext_len: usize,
        rate_limit: &RateLimitConfig,
    ) -> Self {
        Self {
            index,
            ciphertext_len,
            max_keys_per_call: rate_limit.max_keys_per_call,
            permits: Semaphore::new(rate_limit.max_concurrent_searches),
        }
    }

    /// Resolve `keys` in order.
    ///
    /// The index is consulted even when no key needs a lookup, so progress is
    /// always current.
    pub async fn search(&self, keys: &[SearchKey]) -> Result<SearchBatch, CollaboratorError> {
        let permit = self.permits.try_acquire().ok();
        let shed = permit.is_none();

        let plans: Vec<Plan> = keys
            .iter()
            .enumerate()
            .map(|(position, key)| {
                if shed || position >= self.max_keys_per_call {
                    Plan::Skip(TxOutSearchResultCode::RateLimited)
                } else if key.len() != SEARCH_KEY_LEN {
                    Plan::Skip(TxOutSearchResultCode::BadSearchKey)
                } else {
                    Plan::Lookup
                }
            })
            .collect();

        let lookup_keys: Vec<SearchKey> = keys
            .iter()
            .zip(&plans)
            .filter(|(_, plan)| matches!(plan, Plan::Lookup))
            .map(|(key, _)| key.clone())
            .collect();

        let batch = self.index.lookup(&lookup_keys).await?;
        drop(permit);

        if batch.lookups.len() != lookup_keys.len() {
            return Err(CollaboratorError::Misaligned {
                expected: lookup_keys.len(),
                actual: batch.lookups.len(),
            });
        }

        let mut lookups = batch.lookups.into_iter();
        let mut failed = 0usize;
        let results = keys
            .iter()
            .zip(plans)
            .map(|(key, plan)| {
                let code = match plan {
                    Plan::Skip(code) => code,
                    Plan::Lookup => match lookups.next() {
                        Some(KeyLookup::Found(ciphertext))
                            if ciphertext.len() == self.ciphertext_len =>
                        {
                            return TxOutSearchResult::found(key.clone(), ciphertext);
                        }
                        Some(KeyLookup::Found(ciphertext)) => {
                            tracing::error!(
                                expected = self.ciphertext_len,
                                actual = ciphertext.len(),
                                "Stored ciphertext has wrong length"
                            );
                            failed += 1;
                            TxOutSearchResultCode::InternalError
                        }
                        Some(KeyLookup::NotFound) => TxOutSearchResultCode::NotFound,
                        Some(KeyLookup::Failed(reason)) => {
                            tracing::warn!(%reason, "Key lookup failed");
                            failed += 1;
                            TxOutSearchResultCode::InternalError
                        }
                        // Length checked above
                        None => TxOutSearchResultCode::InternalError,
                    },
                };
                TxOutSearchResult::padded(key.clone(), code, self.ciphertext_len)
            })
            .collect();

        tracing::debug!(
            keys = keys.len(),
            looked_up = lookup_keys.len(),
            failed,
            shed,
            "Search batch resolved"
        );

        Ok(SearchBatch {
            results,
            progress: batch.progress,
        })
    }
}
