//! Element resolution across the frames of a page

use crate::session::traits::{ElementHandle, FrameHandle, PageHandle, Query};
use crate::{Error, Result};
use futures::future::{select_ok, BoxFuture};
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Queries tried in order for a raw pattern.
///
/// The pattern itself first, then an element whose text equals it, then an
/// element with any attribute equal to it.
pub fn candidate_queries(pattern: &str) -> Vec<Query> {
    let primary = Query::parse(pattern);
    let mut queries = vec![primary.clone()];
    if matches!(primary, Query::Text(_)) {
        return queries;
    }
    if !pattern.contains('"') {
        queries.push(Query::XPath(format!("//*[text()=\"{}\"]", pattern)));
        queries.push(Query::XPath(format!("//*[@*=\"{}\"]", pattern)));
    }
    queries
}

/// Drop elements that are not rendered, unless hidden ones are wanted
pub async fn filter_visible(
    elements: Vec<Arc<dyn ElementHandle>>,
    match_hidden: bool,
) -> Result<Vec<Arc<dyn ElementHandle>>> {
    if match_hidden {
        return Ok(elements);
    }
    let mut visible = Vec::with_capacity(elements.len());
    for element in elements {
        if element.is_visible().await.unwrap_or(false) {
            visible.push(element);
        }
    }
    Ok(visible)
}

fn query_frame(
    frame: Arc<dyn FrameHandle>,
    query: Query,
    match_hidden: bool,
) -> BoxFuture<'static, Result<Vec<Arc<dyn ElementHandle>>>> {
    Box::pin(async move {
        // an engine rejecting the query (bad CSS, bad XPath) is simply no match here
        let found = match frame.query_all(&query).await {
            Ok(found) => found,
            Err(e) => {
                trace!("Query {} failed in frame {}: {}", query, frame.id(), e);
                Vec::new()
            }
        };
        let found = filter_visible(found, match_hidden).await?;
        if found.is_empty() {
            Err(Error::element_not_found(query.to_string()))
        } else {
            Ok(found)
        }
    })
}

/// Every match of one query in the first frame that has any.
///
/// Frame lookups run concurrently and the first frame to report matches wins.
pub async fn query_frames(
    frames: &[Arc<dyn FrameHandle>],
    query: &Query,
    match_hidden: bool,
) -> Result<Vec<Arc<dyn ElementHandle>>> {
    if frames.is_empty() {
        return Err(Error::element_not_found(query.to_string()));
    }
    let lookups = frames
        .iter()
        .map(|frame| query_frame(Arc::clone(frame), query.clone(), match_hidden));
    let (found, _pending) = select_ok(lookups).await?;
    Ok(found)
}

/// Resolve a pattern against every frame of `page`, trying each candidate query in turn
#[instrument(skip(page))]
pub async fn resolve_all(
    page: &Arc<dyn PageHandle>,
    pattern: &str,
    match_hidden: bool,
) -> Result<Vec<Arc<dyn ElementHandle>>> {
    let frames = page.frames().await?;
    for query in candidate_queries(pattern) {
        match query_frames(&frames, &query, match_hidden).await {
            Ok(found) => {
                debug!("Resolved {} via {} ({} match(es))", pattern, query, found.len());
                return Ok(found);
            }
            Err(e) if e.is_not_found() => continue,
            Err(e) => return Err(e),
        }
    }
    Err(Error::element_not_found(pattern))
}

/// Resolve a pattern relative to a parent element
pub async fn resolve_within(
    parent: &Arc<dyn ElementHandle>,
    pattern: &str,
    match_hidden: bool,
) -> Result<Vec<Arc<dyn ElementHandle>>> {
    let query = Query::parse(pattern);
    let found = filter_visible(parent.query_all(&query).await?, match_hidden).await?;
    if found.is_empty() {
        Err(Error::element_not_found(pattern))
    } else {
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_queries_fallback_chain() {
        assert_eq!(
            candidate_queries("Sign in"),
            vec![
                Query::Css("Sign in".into()),
                Query::XPath("//*[text()=\"Sign in\"]".into()),
                Query::XPath("//*[@*=\"Sign in\"]".into()),
            ]
        );
    }

    #[test]
    fn test_candidate_queries_text_has_no_fallback() {
        assert_eq!(candidate_queries("text=Hello"), vec![Query::Text("Hello".into())]);
    }

    #[test]
    fn test_candidate_queries_skip_unquotable() {
        assert_eq!(candidate_queries("a[title=\"x\"]").len(), 1);
    }
}
