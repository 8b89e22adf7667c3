//! Identity resolution
//!
//! Nominal kinds are looked up by identifier. Structural kinds have no
//! caller-visible identifier, so the remote collection is paged through
//! (narrowed by a server-side filter) and the first candidate that satisfies
//! the match predicate wins.

use crate::context::CancelToken;
use crate::error::RemoteError;
use serde::{Deserialize, Serialize};

/// One page of a remote collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` or empty when exhausted
    pub next_page: Option<String>,
}

impl<T> Page<T> {
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page: None,
        }
    }
}

/// Look up a nominal resource, mapping expected negatives to `None`
///
/// Not-found, invalid identifiers, and archived resources all mean absent.
pub fn find_by_id<T>(
    fetch: impl FnOnce() -> Result<T, RemoteError>,
    is_archived: impl FnOnce(&T) -> bool,
) -> Result<Option<T>, RemoteError> {
    match fetch() {
        Ok(found) if is_archived(&found) => Ok(None),
        Ok(found) => Ok(Some(found)),
        Err(e) if e.is_absent() => {
            log::debug!("lookup reported absent: {e}");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// Page through a collection and return the first match
///
/// Candidates are tested in page order. Further matches on the same page are
/// logged, not treated as errors. Pages after the first match are not
/// fetched. Cancellation is checked before every page.
pub fn find_first<T>(
    cancel: &CancelToken,
    mut list: impl FnMut(Option<&str>) -> Result<Page<T>, RemoteError>,
    mut matches: impl FnMut(&T) -> bool,
) -> Result<Option<T>, RemoteError> {
    let mut token: Option<String> = None;
    let mut pages = 0usize;

    loop {
        cancel.check()?;
        let page = list(token.as_deref())?;
        pages += 1;

        let mut found = None;
        let mut ties = 0usize;
        for item in page.items {
            if matches(&item) {
                if found.is_none() {
                    found = Some(item);
                } else {
                    ties += 1;
                }
            }
        }

        if let Some(item) = found {
            if ties > 0 {
                log::warn!(
                    "{ties} additional remote resource(s) match the same declaration; using the first"
                );
            }
            log::debug!("structural match found on page {pages}");
            return Ok(Some(item));
        }

        match page.next_page.filter(|t| !t.is_empty()) {
            Some(next) => token = Some(next),
            None => {
                log::debug!("no structural match after {pages} page(s)");
                return Ok(None);
            }
        }
    }
}
