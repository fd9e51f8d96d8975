//! Result types for query execution

use std::fmt;
use std::sync::Arc;

use super::sorter::ResultSorter;
use crate::schema::Record;

/// Paginated, sorted view over the matches of one query.
///
/// Records are extracted from the heap on demand; the first `offset`
/// are discarded on the first call to `next`.
pub struct QueryIterator<R> {
    sorter: ResultSorter<R>,
    skip: usize,
    remaining: usize,
    size: usize,
}

impl<R: Record> QueryIterator<R> {
    pub(crate) fn new(sorter: ResultSorter<R>, offset: usize, limit: Option<usize>) -> Self {
        let size = window(sorter.len(), offset, limit);
        Self {
            sorter,
            skip: offset,
            remaining: size,
            size,
        }
    }

    /// Number of records in the page: `min(limit, total - offset)`
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<R: Record> Iterator for QueryIterator<R> {
    type Item = Arc<R>;

    fn next(&mut self) -> Option<Arc<R>> {
        if self.remaining == 0 {
            return None;
        }
        while self.skip > 0 {
            self.sorter.pop();
            self.skip -= 1;
        }
        self.remaining -= 1;
        self.sorter.pop()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<R: Record> ExactSizeIterator for QueryIterator<R> {}

impl<R> fmt::Debug for QueryIterator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryIterator")
            .field("size", &self.size)
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Page plus the total number of matches
#[derive(Debug)]
pub struct QueryOutput<R> {
    pub iterator: QueryIterator<R>,
    /// Matches before pagination
    pub total: usize,
}

/// Page size for `total` matches
pub fn window(total: usize, offset: usize, limit: Option<usize>) -> usize {
    let rest = total.saturating_sub(offset);
    limit.map_or(rest, |limit| limit.min(rest))
}
