//! Bounded Concurrent Mapper
//!
//! Applies an async transform to every element of a collection with at most
//! `limit` transforms in flight. All futures are polled on the calling task,
//! so fan-out interleaves I/O without spawning. Output order always matches
//! input order.

use std::convert::Infallible;
use std::future::Future;

use futures_util::future::try_join_all;
use tokio::sync::Semaphore;

/// Map `items` through `f`, failing the whole map on the first error.
///
/// `f` receives each element together with its index. A `limit` of 0 is
/// treated as 1.
pub async fn map_bounded<T, U, E, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Result<Vec<U>, E>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = Result<U, E>>,
{
    let semaphore = Semaphore::new(limit.max(1));
    let semaphore = &semaphore;
    let f = &f;

    let tasks = items.into_iter().enumerate().map(|(index, item)| async move {
        // The semaphore is never closed, so acquisition only waits.
        let _permit = semaphore.acquire().await.ok();
        f(index, item).await
    });

    try_join_all(tasks).await
}

/// Map `items` through a transform that absorbs its own failures.
pub async fn map_bounded_infallible<T, U, F, Fut>(items: Vec<T>, limit: usize, f: F) -> Vec<U>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = U>,
{
    let f = &f;
    let result: Result<Vec<U>, Infallible> =
        map_bounded(items, limit, |index, item| async move { Ok(f(index, item).await) }).await;
    match result {
        Ok(values) => values,
        Err(never) => match never {},
    }
}
