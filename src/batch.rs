//! Batch synthesis.
//!
//! A batch is checked as a whole first (size and identifiers); after that
//! every item goes through [`Synthesizer::speak`] on its own and a failing
//! item never affects the others. Outcomes come back in input order.

use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Instant;

use serde::Serialize;

use crate::error::{ErrorKind, Result, TtsError};
use crate::request::{BatchItem, SpeechRequest};
use crate::synthesizer::Synthesizer;
use crate::SynthesisResult;

/// Hard upper bound on items per batch call.
pub const MAX_BATCH_ITEMS: usize = 50;

const MAX_ID_LEN: usize = 64;

/// Why one batch item produced no audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&TtsError> for ItemFailure {
    fn from(err: &TtsError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Success(SynthesisResult),
    Failure(ItemFailure),
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn result(&self) -> Option<&SynthesisResult> {
        match self {
            Self::Success(result) => Some(result),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Caller-supplied id, or the item's 0-based position.
    pub id: String,
    pub outcome: ItemOutcome,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Usable as a file stem inside an archive.
fn is_safe_id(id: &str) -> bool {
    (1..=MAX_ID_LEN).contains(&id.len())
        && !id.starts_with('.')
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
}

impl Synthesizer {
    /// Synthesize every item, isolating failures per item.
    ///
    /// Only batch-level problems (size, identifiers) fail the whole call.
    pub fn batch_speak(&self, items: Vec<BatchItem>) -> Result<Vec<BatchOutcome>> {
        let ids = self.check_batch(&items)?;
        let started = Instant::now();

        let workers = self.engines().device_count().min(items.len());
        let outcomes = if workers <= 1 {
            items
                .iter()
                .zip(&ids)
                .map(|(item, id)| self.run_item(id, &item.request))
                .collect()
        } else {
            self.run_parallel(&items, &ids, workers)
        };

        let batch: Vec<BatchOutcome> = ids
            .into_iter()
            .zip(outcomes)
            .map(|(id, outcome)| BatchOutcome { id, outcome })
            .collect();

        log::info!(
            "Batch finished: {}/{} items succeeded in {:?}",
            batch.iter().filter(|b| b.outcome.is_success()).count(),
            batch.len(),
            started.elapsed()
        );
        Ok(batch)
    }

    /// Reject the whole batch up front; returns the item identifiers.
    fn check_batch(&self, items: &[BatchItem]) -> Result<Vec<String>> {
        let limit = self.config().max_batch_items.min(MAX_BATCH_ITEMS);
        if items.is_empty() {
            return Err(TtsError::validation("batch contains no items"));
        }
        if items.len() > limit {
            return Err(TtsError::validation(format!(
                "batch has {} items, at most {limit} allowed",
                items.len()
            )));
        }

        let mut seen = HashSet::with_capacity(items.len());
        let mut ids = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let id = item.identifier(position);
            if !is_safe_id(&id) {
                return Err(TtsError::validation(format!(
                    "item {position}: id {id:?} must be 1-{MAX_ID_LEN} characters of [A-Za-z0-9._-] and not start with '.'"
                )));
            }
            if !seen.insert(id.clone()) {
                return Err(TtsError::validation(format!("duplicate item id {id:?}")));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Run one item. A panic inside the engine is contained to this item;
    /// the device lease is released while unwinding.
    fn run_item(&self, id: &str, request: &SpeechRequest) -> ItemOutcome {
        match panic::catch_unwind(AssertUnwindSafe(|| self.speak(request))) {
            Ok(Ok(result)) => ItemOutcome::Success(result),
            Ok(Err(e)) => {
                log::warn!("Batch item {id} failed: {e}");
                ItemOutcome::Failure(ItemFailure::from(&e))
            }
            Err(payload) => {
                self.record_panic();
                let reason = panic_message(payload.as_ref());
                log::error!("Batch item {id} panicked: {reason}");
                ItemOutcome::Failure(ItemFailure {
                    kind: ErrorKind::EngineError,
                    message: format!("Engine failed: panicked during synthesis: {reason}"),
                })
            }
        }
    }

    /// One worker per device, pulling items from a shared cursor.
    fn run_parallel(
        &self,
        items: &[BatchItem],
        ids: &[String],
        workers: usize,
    ) -> Vec<ItemOutcome> {
        let cursor = AtomicUsize::new(0);
        let cursor = &cursor;

        let finished: Vec<(usize, ItemOutcome)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    scope.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let i = cursor.fetch_add(1, Ordering::Relaxed);
                            let Some(item) = items.get(i) else { break };
                            done.push((i, self.run_item(&ids[i], &item.request)));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| {
                    handle.join().unwrap_or_else(|_| {
                        log::error!("Batch worker panicked");
                        Vec::new()
                    })
                })
                .collect()
        });

        let mut slots: Vec<Option<ItemOutcome>> = vec![None; items.len()];
        for (i, outcome) in finished {
            slots[i] = Some(outcome);
        }
        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    ItemOutcome::Failure(ItemFailure {
                        kind: ErrorKind::EngineError,
                        message: "synthesis worker stopped before finishing this item".to_string(),
                    })
                })
            })
            .collect()
    }
}
