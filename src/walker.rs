//! Cursor-following traversal of paginated listings.

use std::future::Future;

/// Fetches every page starting at `start` and concatenates their items.
///
/// `fetch` receives the query of the page to load (`None` for the first
/// page when no starting query is given) and returns the page items and
/// the query of the following page. The walk ends at the first page
/// without a next query. Any error aborts the walk and drops everything
/// accumulated so far; callers never see a partial listing.
pub async fn walk<T, E, F, Fut>(start: Option<String>, mut fetch: F) -> Result<Vec<T>, E>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<(Vec<T>, Option<String>), E>>,
{
    let mut items = Vec::new();
    let mut cursor = start;
    let mut pages = 0usize;
    loop {
        let (page, next) = fetch(cursor).await?;
        pages += 1;
        items.extend(page);
        match next {
            Some(next) if !next.is_empty() => cursor = Some(next),
            _ => break,
        }
    }
    log::debug!("Walked {} pages, {} items", pages, items.len());
    Ok(items)
}
