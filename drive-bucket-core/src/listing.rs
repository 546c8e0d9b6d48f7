//! Remote listing: one parameterized entry point over [`RemoteStore::list`].
//!
//! Folder selection uses a lexicographic lower bound on the folder name as a date
//! filter. Folder names are expected to sort like `YYYYMMDD...`; other names are not
//! validated and simply compare as strings.

use tracing::{debug, info};

use crate::contract::{EntryKind, ListQuery, RemoteEntry, RemoteStore, Session};
use crate::error::ListingError;

/// True when `name` passes the minimum-name bound. An empty bound admits everything.
pub fn passes_bound(name: &str, min_name_bound: &str) -> bool {
    min_name_bound.is_empty() || name >= min_name_bound
}

/// Child folders of `root_id` whose names are `>= min_name_bound`, in listing order.
pub async fn list_child_folders<S>(
    store: &S,
    session: &Session,
    root_id: &str,
    min_name_bound: &str,
) -> Result<Vec<RemoteEntry>, ListingError>
where
    S: RemoteStore + ?Sized,
{
    let query = ListQuery::children(root_id, EntryKind::Folder);
    let listed = run_query(store, session, &query).await?;
    let total = listed.len();
    let selected: Vec<RemoteEntry> = listed
        .into_iter()
        .filter(|entry| passes_bound(&entry.name, min_name_bound))
        .collect();
    info!(
        root_id,
        min_name_bound,
        listed = total,
        selected = selected.len(),
        "Selected candidate folders"
    );
    Ok(selected)
}

/// Non-folder children of `folder_id`, optionally restricted to names containing a substring.
pub async fn list_child_files<S>(
    store: &S,
    session: &Session,
    folder_id: &str,
    name_contains: Option<&str>,
) -> Result<Vec<RemoteEntry>, ListingError>
where
    S: RemoteStore + ?Sized,
{
    let mut query = ListQuery::children(folder_id, EntryKind::File);
    if let Some(needle) = name_contains.filter(|n| !n.is_empty()) {
        query = query.name_contains(needle);
    }
    run_query(store, session, &query).await
}

async fn run_query<S>(
    store: &S,
    session: &Session,
    query: &ListQuery,
) -> Result<Vec<RemoteEntry>, ListingError>
where
    S: RemoteStore + ?Sized,
{
    debug!(?query, "Listing remote entries");
    let entries: Vec<RemoteEntry> = store
        .list(session, query)
        .await?
        .into_iter()
        // Stores are trusted for parent membership only; kind and name are re-checked.
        .filter(|entry| query.matches(entry))
        .collect();
    if entries.is_empty() {
        info!(parent = query.parent().unwrap_or_default(), "No matches");
    }
    Ok(entries)
}
