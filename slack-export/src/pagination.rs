//! Cursor pagination over Slack listing methods.
//!
//! Every listing (`users.list`, `conversations.list`, `conversations.history`,
//! `conversations.replies`) goes through [`pages`], which is the only place
//! that waits on the rate limiter and retries throttled requests.

use std::{collections::HashSet, future::Future};

use futures::{Stream, TryStreamExt, stream};
use log::{debug, warn};

use crate::{
    error::{Result, SlackError},
    models::Page,
    rate_limit::RateLimiter,
};

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Lazily walks the pages of one listing, yielding each page's items.
///
/// `fetch` receives the cursor of the page to load (`None` for the first
/// page). The stream ends after the first page without a next cursor and
/// cannot be restarted.
pub fn pages<'a, T, F, Fut>(
    limiter: &'a RateLimiter,
    fetch: F,
) -> impl Stream<Item = Result<Vec<T>>> + 'a
where
    T: 'a,
    F: FnMut(Option<String>) -> Fut + 'a,
    Fut: Future<Output = Result<Page<T>>> + 'a,
{
    stream::try_unfold(
        (Cursor::Start, HashSet::new(), fetch),
        move |(cursor, mut seen, mut fetch)| async move {
            let cursor = match cursor {
                Cursor::Start => None,
                Cursor::Next(cursor) => Some(cursor),
                Cursor::Done => return Ok(None),
            };

            let page = fetch_page(limiter, &mut fetch, cursor).await?;

            let next = match page.next_cursor {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(SlackError::Format(format!(
                        "pagination cursor '{next}' was returned twice"
                    )));
                }
                Some(next) => Cursor::Next(next),
                None => Cursor::Done,
            };

            Ok(Some((page.items, (next, seen, fetch))))
        },
    )
}

async fn fetch_page<T, F, Fut>(
    limiter: &RateLimiter,
    fetch: &mut F,
    cursor: Option<String>,
) -> Result<Page<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    loop {
        limiter.acquire().await;

        match fetch(cursor.clone()).await {
            Err(SlackError::RateLimited { retry_after }) => {
                let delay = limiter.back_off(retry_after).await;
                warn!("rate limited, retrying in {:?}", delay);
            }
            Ok(page) => {
                debug!(
                    "fetched page of {} items (cursor {:?})",
                    page.items.len(),
                    cursor
                );
                return Ok(page);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Drains every page, concatenating items in request order.
pub async fn collect_all<'a, T, F, Fut>(limiter: &'a RateLimiter, fetch: F) -> Result<Vec<T>>
where
    T: 'a,
    F: FnMut(Option<String>) -> Fut + 'a,
    Fut: Future<Output = Result<Page<T>>> + 'a,
{
    pages(limiter, fetch).try_concat().await
}
