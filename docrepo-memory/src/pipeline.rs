//! The in-memory read pipeline: filter, composition stages, projection and paging.
//!
//! Reads operate on a snapshot of deep copies taken under the repository lock. Paging
//! keeps no cursor state in the store: a continuation token is the base64-encoded JSON
//! array of the items that remain after the page it came with, and resuming from a token
//! decodes it instead of querying the store again.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::future::Future;

use docrepo_core::{
    error::{RepositoryError, RepositoryResult},
    page::Page,
    query::{Condition, Query, Stage},
};

use crate::evaluator::{DocumentEvaluator, compare_by_field};

fn retain<T: Serialize>(items: Vec<T>, condition: &Condition<T>) -> RepositoryResult<Vec<T>> {
    match condition {
        Condition::Predicate(predicate) => Ok(
            items
                .into_iter()
                .filter(|item| predicate(item))
                .collect()
        ),
        Condition::Expr(expr) => {
            let mut kept = Vec::with_capacity(items.len());

            for item in items {
                let document = serde_json::to_value(&item)?;

                if DocumentEvaluator::new(&document).evaluate(expr)? {
                    kept.push(item);
                }
            }

            Ok(kept)
        }
    }
}

/// Runs the filter and every composition stage of `query` over `items`.
pub(crate) fn apply_query<T: Serialize>(items: Vec<T>, query: Query<T>) -> RepositoryResult<Vec<T>> {
    let mut items = match &query.filter {
        Some(condition) => retain(items, condition)?,
        None => items,
    };

    for stage in query.stages {
        items = match stage {
            Stage::Where(condition) => retain(items, &condition)?,
            Stage::OrderBy(compare) => {
                items.sort_by(|a, b| compare(a, b));
                items
            }
            Stage::SortField(sort) => {
                let mut keyed = items
                    .into_iter()
                    .map(|item| Ok((serde_json::to_value(&item)?, item)))
                    .collect::<RepositoryResult<Vec<(Value, T)>>>()?;

                keyed.sort_by(|(a, _), (b, _)| compare_by_field(a, b, &sort));
                keyed.into_iter().map(|(_, item)| item).collect()
            }
            Stage::Skip(count) => items.into_iter().skip(count).collect(),
            Stage::Take(count) => items.into_iter().take(count).collect(),
            Stage::Shape(shaper) => shaper(items),
        };
    }

    Ok(items)
}

/// Decodes the items carried by a continuation token.
///
/// Returns `None` for a missing or empty token, meaning the read starts from the store.
pub(crate) fn resume<U: DeserializeOwned>(continuation_token: Option<String>) -> RepositoryResult<Option<Vec<U>>> {
    let token = match continuation_token {
        Some(token) if !token.is_empty() => token,
        _ => return Ok(None),
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|e| RepositoryError::InvalidContinuationToken(e.to_string()))?;

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| RepositoryError::InvalidContinuationToken(e.to_string()))
}

fn encode_token<U: Serialize>(remaining: &[U]) -> RepositoryResult<String> {
    Ok(URL_SAFE_NO_PAD.encode(serde_json::to_vec(remaining)?))
}

/// Cuts one page off `items`.
///
/// A `page_size` of zero returns everything. Otherwise the page holds up to `page_size`
/// items and carries a token only if items remain after it.
pub(crate) fn paginate<U: Serialize>(mut items: Vec<U>, page_size: usize) -> RepositoryResult<Page<U>> {
    if page_size == 0 || items.len() <= page_size {
        return Ok(Page::builder(items).build());
    }

    let remaining = items.split_off(page_size);

    Ok(Page::builder(items)
        .with_continuation_token(Some(encode_token(&remaining)?))
        .build())
}

/// Produces one page of projected results.
///
/// With a non-empty token the page is cut from the items the token carries and `load`
/// is dropped without being polled, so the store is not read. Otherwise `load` supplies
/// the query results and `project` maps them before paging.
pub(crate) async fn read_page<T, U, L, P>(
    page_size: usize,
    continuation_token: Option<String>,
    load: L,
    project: P,
) -> RepositoryResult<Page<U>>
where
    U: Serialize + DeserializeOwned,
    L: Future<Output = RepositoryResult<Vec<T>>>,
    P: FnOnce(Vec<T>) -> Vec<U>,
{
    if let Some(remaining) = resume::<U>(continuation_token)? {
        return paginate(remaining, page_size);
    }

    paginate(project(load.await?), page_size)
}

pub(crate) fn project<T, U>(items: Vec<T>, selector: impl Fn(T) -> U) -> Vec<U> {
    items.into_iter().map(selector).collect()
}

pub(crate) fn project_many<T, U, I>(items: Vec<T>, selector: impl Fn(T) -> I) -> Vec<U>
where
    I: IntoIterator<Item = U>,
{
    items.into_iter().flat_map(selector).collect()
}

pub(crate) fn project_shaped<T, M, U>(
    items: Vec<T>,
    shaper: impl FnOnce(Vec<T>) -> Vec<M>,
    selector: impl Fn(M) -> U,
) -> Vec<U> {
    shaper(items).into_iter().map(selector).collect()
}
