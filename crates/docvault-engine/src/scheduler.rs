//! Page scheduler: drives the cursor and dispatches each page.
//!
//! State machine per run:
//!
//! ```text
//! Init -> Fetching -> Dispatching -> Fetching ... -> Done
//!            |             |
//!            +-> Failed <--+
//! ```
//!
//! The page boundary is a barrier in both modes: no document of page k+1
//! is dispatched until every document of page k has settled.

use std::sync::Arc;

use docvault_types::{Document, JobName, QuerySpec, RunMode, StatsSnapshot};
use tokio::task::JoinSet;

use crate::cursor::{CursorSource, Page};
use crate::errors::EngineError;
use crate::pipeline::DocumentPipeline;
use crate::stats::StatsAccumulator;

enum State {
    Init,
    Fetching,
    Dispatching { documents: Vec<Document>, has_more: bool },
    Done,
    Failed(EngineError),
}

/// Runs one pass of the cursor through the document pipeline.
pub struct PageScheduler {
    cursor: CursorSource,
    pipeline: DocumentPipeline,
    stats: Arc<StatsAccumulator>,
    query: QuerySpec,
    page_size: u32,
    mode: RunMode,
    job: JobName,
}

impl PageScheduler {
    pub(crate) fn new(
        cursor: CursorSource,
        pipeline: DocumentPipeline,
        stats: Arc<StatsAccumulator>,
        query: QuerySpec,
        page_size: u32,
        mode: RunMode,
        job: JobName,
    ) -> Self {
        Self {
            cursor,
            pipeline,
            stats,
            query,
            page_size,
            mode,
            job,
        }
    }

    /// Drive the run to `Done` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns the first error observed. In multi mode that error is only
    /// returned after every document of the failing page has settled.
    pub async fn run(mut self) -> Result<StatsSnapshot, EngineError> {
        let mut state = State::Init;
        loop {
            state = match state {
                State::Init => match self.cursor.open(&self.query, self.page_size) {
                    Ok(()) => State::Fetching,
                    Err(e) => State::Failed(e),
                },
                State::Fetching => match self.fetch().await {
                    Ok(page) => State::Dispatching {
                        documents: page.documents,
                        has_more: page.has_more,
                    },
                    Err(e) => State::Failed(e),
                },
                State::Dispatching {
                    documents,
                    has_more,
                } => {
                    let dispatched = match self.mode {
                        RunMode::Single => self.dispatch_single(documents).await,
                        RunMode::Multi => self.dispatch_multi(documents).await,
                    };
                    match dispatched {
                        Err(e) => State::Failed(e),
                        Ok(()) if has_more => State::Fetching,
                        Ok(()) => State::Done,
                    }
                }
                State::Done => return Ok(self.stats.snapshot()),
                State::Failed(e) => {
                    tracing::error!(
                        job = %self.job,
                        page = self.stats.snapshot().pages,
                        error = %e,
                        "Run failed"
                    );
                    return Err(e);
                }
            };
        }
    }

    async fn fetch(&mut self) -> Result<Page, EngineError> {
        let page = self.cursor.next().await?;
        let page_number = self.stats.begin_page();
        self.stats.record_cost(page.cost);
        tracing::info!(
            job = %self.job,
            page = page_number,
            documents = page.documents.len(),
            has_more = page.has_more,
            cost = page.cost,
            "Fetched page"
        );
        Ok(page)
    }

    async fn dispatch_single(&self, documents: Vec<Document>) -> Result<(), EngineError> {
        for doc in documents {
            let ordinal = self.stats.next_ordinal();
            self.pipeline.process(doc, ordinal).await?;
        }
        Ok(())
    }

    async fn dispatch_multi(&self, documents: Vec<Document>) -> Result<(), EngineError> {
        let mut join_set: JoinSet<Result<(), EngineError>> = JoinSet::new();
        for doc in documents {
            let ordinal = self.stats.next_ordinal();
            let pipeline = self.pipeline.clone();
            join_set.spawn(async move { pipeline.process(doc, ordinal).await.map(|_| ()) });
        }
        collect_page_results(join_set).await
    }
}

/// Join every task of a page. Siblings are never aborted; the first error
/// observed is returned once the set is empty.
async fn collect_page_results(
    mut join_set: JoinSet<Result<(), EngineError>>,
) -> Result<(), EngineError> {
    let mut first_error: Option<EngineError> = None;
    let mut failed = 0u64;

    while let Some(joined) = join_set.join_next().await {
        let error = match joined {
            Ok(Ok(())) => continue,
            Ok(Err(error)) => error,
            Err(join_err) => EngineError::TaskFailed(join_err.to_string()),
        };
        failed += 1;
        tracing::error!(error = %error, "Document pipeline failed");
        if first_error.is_none() {
            first_error = Some(error);
        }
    }

    match first_error {
        Some(error) => {
            if failed > 1 {
                tracing::warn!(failed, "Multiple documents failed in page, surfacing first");
            }
            Err(error)
        }
        None => Ok(()),
    }
}
