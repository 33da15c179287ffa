//! Buffered, bidirectional paging over a server query.
//!
//! Each direction keeps one in-flight page future. A new page call chains onto
//! the previous one and computes its anchor from the buffer only when it
//! starts executing, so rapid repeated calls never request overlapping pages.
//! `refresh` bumps a generation counter; page calls issued before the refresh
//! resolve to `[]` and leave the new window alone.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use shared::domain::{QueryDirection, RecordId};
use tracing::debug;

use crate::{
    error::ClientError,
    model::{Record, RecordSet},
};

#[async_trait]
pub trait QueryProvider: Send + Sync {
    /// Fetches up to `page_size` records after (forward) or before (backward)
    /// `anchor`, exclusive. Backward pages arrive nearest-first.
    async fn fetch_page(
        &self,
        page_size: usize,
        direction: QueryDirection,
        anchor: Option<RecordId>,
    ) -> Result<RecordSet, ClientError>;
}

pub type PageResult = Result<Vec<Record>, ClientError>;
pub type PageFuture = Shared<BoxFuture<'static, PageResult>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMarkerOption {
    IsEmpty,
    HasMore,
}

/// An item of [`QueryScroller::buffer_with_markers`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollEntry {
    Record(Record),
    Marker(QueryMarkerOption),
}

impl ScrollEntry {
    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Marker(_))
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Record(record) => Some(record),
            Self::Marker(_) => None,
        }
    }
}

struct ScrollState {
    buffer: Vec<Record>,
    has_more_backward: bool,
    has_more_forward: bool,
    first_result_id: Option<RecordId>,
    generation: u64,
}

impl ScrollState {
    fn initial(first_object_id: Option<&RecordId>, generation: u64) -> Self {
        Self {
            buffer: Vec::new(),
            has_more_backward: first_object_id.is_some(),
            has_more_forward: true,
            first_result_id: None,
            generation,
        }
    }

    fn has_more(&self, direction: QueryDirection) -> bool {
        match direction {
            QueryDirection::Forward => self.has_more_forward,
            QueryDirection::Backward => self.has_more_backward,
        }
    }

    fn anchor(&self, direction: QueryDirection) -> Option<RecordId> {
        match direction {
            QueryDirection::Forward => self.buffer.last(),
            QueryDirection::Backward => self.buffer.first(),
        }
        .map(|record| record.id.clone())
    }
}

struct ScrollerInner {
    query: Arc<dyn QueryProvider>,
    first_object_id: Option<RecordId>,
    marker_options: Vec<QueryMarkerOption>,
    state: Mutex<ScrollState>,
    forward: Mutex<Option<PageFuture>>,
    backward: Mutex<Option<PageFuture>>,
}

impl ScrollerInner {
    fn slot(&self, direction: QueryDirection) -> &Mutex<Option<PageFuture>> {
        match direction {
            QueryDirection::Forward => &self.forward,
            QueryDirection::Backward => &self.backward,
        }
    }

    async fn run_page(
        &self,
        direction: QueryDirection,
        page_size: usize,
        generation: u64,
        marks_first_result: bool,
    ) -> PageResult {
        let anchor = {
            let state = self.state.lock();
            if state.generation != generation {
                debug!(%direction, "page request superseded by refresh; skipping");
                return Ok(Vec::new());
            }
            if !state.has_more(direction) {
                return Ok(Vec::new());
            }
            // An empty window, fresh or trimmed, starts from the scroller's anchor.
            state
                .anchor(direction)
                .or_else(|| self.first_object_id.clone())
        };

        debug!(%direction, page_size, anchor = ?anchor, "requesting page");
        let page = self.query.fetch_page(page_size, direction, anchor).await?;

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(
                %direction,
                discarded = page.records.len(),
                "page completed after refresh; discarding"
            );
            return Ok(Vec::new());
        }

        match direction {
            QueryDirection::Forward => {
                state.has_more_forward = page.has_more;
                state.buffer.extend(page.records.iter().cloned());
            }
            QueryDirection::Backward => {
                state.has_more_backward = page.has_more;
                let mut buffer: Vec<Record> = page.records.iter().rev().cloned().collect();
                buffer.append(&mut state.buffer);
                state.buffer = buffer;
            }
        }
        if marks_first_result {
            if let Some(first) = page.records.first() {
                state.first_result_id = Some(first.id.clone());
            }
        }
        debug!(
            %direction,
            received = page.records.len(),
            buffered = state.buffer.len(),
            has_more = page.has_more,
            "page applied"
        );
        Ok(page.records)
    }
}

/// Paged window over a [`QueryProvider`]. Cloning shares the same window.
///
/// Page futures are lazy like any future, but once created they hold their
/// place in the direction's queue: a later call drives every earlier one.
#[derive(Clone)]
pub struct QueryScroller {
    inner: Arc<ScrollerInner>,
}

impl QueryScroller {
    pub fn new(query: Arc<dyn QueryProvider>, first_object_id: Option<RecordId>) -> Self {
        Self::with_markers(query, first_object_id, Vec::new())
    }

    pub fn with_markers(
        query: Arc<dyn QueryProvider>,
        first_object_id: Option<RecordId>,
        marker_options: Vec<QueryMarkerOption>,
    ) -> Self {
        let state = ScrollState::initial(first_object_id.as_ref(), 0);
        Self {
            inner: Arc::new(ScrollerInner {
                query,
                first_object_id,
                marker_options,
                state: Mutex::new(state),
                forward: Mutex::new(None),
                backward: Mutex::new(None),
            }),
        }
    }

    /// Appends the next page. Resolves to the records received, in server order.
    ///
    /// While the window is empty the page is requested from the scroller's
    /// first object id.
    pub fn page_forward(&self, page_size: usize) -> PageFuture {
        self.request(QueryDirection::Forward, page_size)
    }

    /// Prepends the previous page. Resolves to the records received,
    /// nearest-first as the server sends them.
    pub fn page_backward(&self, page_size: usize) -> PageFuture {
        self.request(QueryDirection::Backward, page_size)
    }

    /// Resets the window and loads one forward page from the scroller's
    /// first object id.
    pub fn refresh(&self, page_size: usize) -> PageFuture {
        let generation = {
            let mut state = self.inner.state.lock();
            let generation = state.generation + 1;
            *state = ScrollState::initial(self.inner.first_object_id.as_ref(), generation);
            debug!(generation, "scroller refreshed");
            generation
        };
        self.enqueue(QueryDirection::Forward, page_size, generation, true)
    }

    fn request(&self, direction: QueryDirection, page_size: usize) -> PageFuture {
        let generation = {
            let state = self.inner.state.lock();
            if !state.has_more(direction) {
                debug!(%direction, "no more records; page request is a no-op");
                return future::ready(Ok(Vec::new())).boxed().shared();
            }
            state.generation
        };
        self.enqueue(direction, page_size, generation, false)
    }

    /// Chains a page onto the direction's slot. `generation` is the one the
    /// caller observed, so a refresh racing this call supersedes it.
    fn enqueue(
        &self,
        direction: QueryDirection,
        page_size: usize,
        generation: u64,
        marks_first_result: bool,
    ) -> PageFuture {
        let mut slot = self.inner.slot(direction).lock();
        let previous = slot.take();
        let inner = Arc::clone(&self.inner);
        let page = async move {
            if let Some(previous) = previous {
                // The predecessor's outcome belongs to its own caller.
                let _ = previous.await;
            }
            inner
                .run_page(direction, page_size, generation, marks_first_result)
                .await
        }
        .boxed()
        .shared();
        *slot = Some(page.clone());
        page
    }

    pub fn trim_first(&self, count: usize) {
        let mut state = self.inner.state.lock();
        let count = count.min(state.buffer.len());
        state.buffer.drain(..count);
        state.has_more_backward = true;
        if state.buffer.is_empty() {
            state.first_result_id = None;
        }
    }

    pub fn trim_last(&self, count: usize) {
        let mut state = self.inner.state.lock();
        let keep = state.buffer.len().saturating_sub(count);
        state.buffer.truncate(keep);
        state.has_more_forward = true;
        if state.buffer.is_empty() {
            state.first_result_id = None;
        }
    }

    pub fn buffer(&self) -> Vec<Record> {
        self.inner.state.lock().buffer.clone()
    }

    /// The buffer plus sentinel entries for the configured marker options.
    pub fn buffer_with_markers(&self) -> Vec<ScrollEntry> {
        let state = self.inner.state.lock();
        let mut entries: Vec<ScrollEntry> = state
            .buffer
            .iter()
            .cloned()
            .map(ScrollEntry::Record)
            .collect();
        let wants = |option| self.inner.marker_options.contains(&option);

        if !state.has_more_backward && !state.has_more_forward {
            if wants(QueryMarkerOption::IsEmpty) && entries.is_empty() {
                entries.push(ScrollEntry::Marker(QueryMarkerOption::IsEmpty));
            }
        } else if wants(QueryMarkerOption::HasMore) {
            if entries.is_empty() {
                entries.push(ScrollEntry::Marker(QueryMarkerOption::HasMore));
            } else {
                if state.has_more_backward {
                    entries.insert(0, ScrollEntry::Marker(QueryMarkerOption::HasMore));
                }
                if state.has_more_forward {
                    entries.push(ScrollEntry::Marker(QueryMarkerOption::HasMore));
                }
            }
        }
        entries
    }

    pub fn has_more_forward(&self) -> bool {
        self.inner.state.lock().has_more_forward
    }

    pub fn has_more_backward(&self) -> bool {
        self.inner.state.lock().has_more_backward
    }

    pub fn is_complete(&self) -> bool {
        let state = self.inner.state.lock();
        !state.has_more_backward && !state.has_more_forward
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.lock().buffer.is_empty()
    }

    pub fn is_complete_and_empty(&self) -> bool {
        self.is_complete() && self.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().buffer.len()
    }

    /// The anchor the scroller was created with.
    pub fn first_object_id(&self) -> Option<&RecordId> {
        self.inner.first_object_id.as_ref()
    }

    /// Id of the first record loaded by the latest refresh.
    pub fn first_result_id(&self) -> Option<RecordId> {
        self.inner.state.lock().first_result_id.clone()
    }
}

impl fmt::Debug for QueryScroller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("QueryScroller")
            .field("buffered", &state.buffer.len())
            .field("has_more_backward", &state.has_more_backward)
            .field("has_more_forward", &state.has_more_forward)
            .field("generation", &state.generation)
            .finish()
    }
}

#[cfg(test)]
#[path = "tests/scroller_tests.rs"]
mod tests;
