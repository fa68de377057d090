//! Batch scheduler for bounded-concurrency dispatch
//!
//! This module handles:
//! - Partitioning work items into fixed-size batches
//! - Running each batch concurrently, one batch at a time
//! - Pausing between batches to stay polite to the source
//!
//! Results are yielded lazily, in item order within each batch. A batch is
//! only started once the consumer has taken every output of the previous one,
//! so dropping the stream after a batch boundary leaves the remaining items
//! untouched.

use async_stream::stream;
use futures::stream::{FuturesOrdered, Stream, StreamExt};
use std::future::Future;
use std::time::Duration;

/// One worker output tagged with its position in the batch schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched<O> {
    /// Zero-based batch number
    pub batch_index: usize,
    /// Total number of batches in this schedule
    pub batch_count: usize,
    /// Whether this is the final output of its batch
    pub last_in_batch: bool,
    pub output: O,
}

impl<O> Dispatched<O> {
    /// Whether this output closes the final batch
    pub fn ends_schedule(&self) -> bool {
        self.last_in_batch && self.batch_index + 1 == self.batch_count
    }
}

/// Splits `items` into consecutive groups of at most `size` items
///
/// A size of zero is treated as one.
pub fn partition<T>(items: Vec<T>, size: usize) -> Vec<Vec<T>> {
    let size = size.max(1);
    let mut batches = Vec::with_capacity(items.len().div_ceil(size));
    let mut current = Vec::with_capacity(size);

    for item in items {
        current.push(item);
        if current.len() == size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(size)));
        }
    }
    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// Runs `worker` over `items`, at most `concurrency` at a time
///
/// # Arguments
///
/// * `items` - Work in dispatch order
/// * `concurrency` - Batch size; zero is treated as one
/// * `delay` - Pause between consecutive batches, never after the last
/// * `worker` - Per-item operation; its failures must be part of `O`
pub fn run_batches<T, O, F, Fut>(
    items: Vec<T>,
    concurrency: usize,
    delay: Duration,
    worker: F,
) -> impl Stream<Item = Dispatched<O>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = O>,
{
    stream! {
        let batches = partition(items, concurrency);
        let batch_count = batches.len();

        for (batch_index, batch) in batches.into_iter().enumerate() {
            if batch_index > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let batch_len = batch.len();
            tracing::debug!(batch = batch_index + 1, batch_count, size = batch_len, "dispatching batch");

            let mut in_flight: FuturesOrdered<Fut> = batch.into_iter().map(&worker).collect();
            let mut position = 0;
            while let Some(output) = in_flight.next().await {
                position += 1;
                yield Dispatched {
                    batch_index,
                    batch_count,
                    last_in_batch: position == batch_len,
                    output,
                };
            }
        }
    }
}
