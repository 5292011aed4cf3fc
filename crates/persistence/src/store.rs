//! Shared helpers for the in-memory repositories.

use chrono::{DateTime, Utc};
use domain::StoreError;
use shared::pagination::{encode_cursor, Page, PageRequest};
use uuid::Uuid;

/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 1000;

/// Orders `items` by `(created_at, id)` and cuts the page after the request cursor.
pub fn paginate<T, K>(mut items: Vec<T>, key: K, page: &PageRequest) -> Result<Page<T>, StoreError>
where
    K: Fn(&T) -> (DateTime<Utc>, Uuid),
{
    let position = page
        .position()
        .map_err(|e| StoreError::InvalidCursor(e.to_string()))?;
    let limit = page.limit.clamp(1, MAX_PAGE_SIZE);

    items.sort_by_key(|item| key(item));
    if let Some(after) = position {
        items.retain(|item| key(item) > after);
    }

    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = if has_more {
        items.last().map(|last| {
            let (created_at, id) = key(last);
            encode_cursor(created_at, id)
        })
    } else {
        None
    };

    Ok(Page { items, next_cursor })
}
