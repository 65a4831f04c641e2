//! Lazy iteration over paginated listings
//!
//! A [`Listing`] fetches one page at a time and only when the consumer asks
//! for more items. Each call to [`Listing::stream`] starts over from the
//! first page, so a listing can be walked more than once.

use super::error::ApiError;
use super::model::OrgEntity;
use super::protocol::ListOperation;
use super::OrganizationsApi;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::collections::VecDeque;
use tracing::{debug, warn};

pub struct Listing<'a> {
    api: &'a dyn OrganizationsApi,
    operation: ListOperation,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

struct State {
    buffer: VecDeque<OrgEntity>,
    cursor: Cursor,
    seen_tokens: Vec<String>,
}

impl<'a> Listing<'a> {
    pub fn new(api: &'a dyn OrganizationsApi, operation: ListOperation) -> Self {
        Self { api, operation }
    }

    /// Items of the listing in provider order, fetched page by page
    pub fn stream(&self) -> BoxStream<'a, Result<OrgEntity, ApiError>> {
        let api = self.api;
        let operation = self.operation.clone();
        let initial = State {
            buffer: VecDeque::new(),
            cursor: Cursor::Start,
            seen_tokens: Vec::new(),
        };

        stream::try_unfold(initial, move |state| next_item(api, operation.clone(), state)).boxed()
    }

    /// Drain the whole listing
    pub async fn collect_all(&self) -> Result<Vec<OrgEntity>, ApiError> {
        self.stream().try_collect().await
    }

    /// First item of the listing; later pages are never requested
    pub async fn first(&self) -> Result<Option<OrgEntity>, ApiError> {
        let mut items = self.stream();
        items.try_next().await
    }
}

/// Pop the next buffered item, fetching pages until one is available
async fn next_item(
    api: &dyn OrganizationsApi,
    operation: ListOperation,
    mut state: State,
) -> Result<Option<(OrgEntity, State)>, ApiError> {
    loop {
        if let Some(item) = state.buffer.pop_front() {
            return Ok(Some((item, state)));
        }

        let token = match &state.cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token.clone()),
        };

        let page = api.list_page(&operation, token.as_deref()).await?;
        debug!(
            "{:?}: fetched {} items, more: {}",
            operation,
            page.items.len(),
            page.next_token.is_some()
        );
        state.buffer.extend(page.items);

        state.cursor = match page.next_token {
            Some(next) if state.seen_tokens.contains(&next) => {
                warn!("{:?}: page token repeated, stopping listing", operation);
                Cursor::Done
            }
            Some(next) => {
                state.seen_tokens.push(next.clone());
                Cursor::Next(next)
            }
            None => Cursor::Done,
        };
    }
}
