//! Bounded-concurrency task runner

use futures::stream::{self, StreamExt};
use std::future::Future;

/// Drive `tasks` with at most `limit` in flight. Results keep task order.
/// A limit of zero is treated as one.
pub async fn run_bounded<I, F>(tasks: I, limit: usize) -> Vec<F::Output>
where
    I: IntoIterator<Item = F>,
    F: Future,
{
    stream::iter(tasks).buffered(limit.max(1)).collect().await
}
