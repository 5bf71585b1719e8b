//! Viewport/everywhere search sessions
//!
//! A session walks `Idle -> Started -> {ViewportOnly, Everywhere} -> Finished | Cancelled |
//! Failed`. Every transition the caller can see is also an ordered [`SearchEvent`]:
//!
//! ```text
//! Started -> (ModeChanged)? -> Results* -> Finished | Cancelled | Failed
//! ```
//!
//! Results are only delivered for the phase that wins the quality gate, so a delivered match
//! is never retracted by a later mode switch.

use super::{
    SearchBackend, SearchConfig, SearchError, SearchEvent, SearchMode, SearchQuery,
    SearchRequest, SearchResult, SessionState,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Starts interactive search sessions against a backend
#[derive(Clone)]
pub struct SearchModeController {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
}

impl SearchModeController {
    pub fn new(backend: Arc<dyn SearchBackend>, config: SearchConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Start a session
    ///
    /// `Started` is queued before this returns; the rest of the session runs as a task on
    /// the current tokio runtime. Dropping the returned handle cancels the session.
    pub fn start(&self, query: SearchQuery) -> SearchHandle {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        state_tx.send_replace(SessionState::Started);
        // Receiver is still held locally, so this cannot fail
        let _ = event_tx.send(SearchEvent::Started);
        tracing::debug!("Search session started for {:?}", query.query);

        let task = SessionTask {
            backend: self.backend.clone(),
            config: self.config.clone(),
            query,
            events: event_tx,
            state: state_tx,
            cancel: cancel_rx,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(task.run());
            }
            Err(e) => task.fail(SearchError::TaskFailed(e.to_string())),
        }

        SearchHandle {
            events: event_rx,
            state: state_rx,
            cancel: cancel_tx,
        }
    }
}

impl std::fmt::Debug for SearchModeController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchModeController")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Caller's side of a running session
#[derive(Debug)]
pub struct SearchHandle {
    events: mpsc::UnboundedReceiver<SearchEvent>,
    state: watch::Receiver<SessionState>,
    cancel: watch::Sender<bool>,
}

impl SearchHandle {
    /// Next session event, `None` once the session is over and every event was taken
    ///
    /// After [`Self::cancel`] only the terminal event is surfaced.
    pub async fn next_event(&mut self) -> Option<SearchEvent> {
        loop {
            let event = self.events.recv().await?;
            if self.is_cancelled() && !event.is_terminal() {
                continue;
            }
            return Some(event);
        }
    }

    /// Every remaining event up to and including the terminal one
    pub async fn collect_events(mut self) -> Vec<SearchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        events
    }

    /// Ask the session to stop
    ///
    /// The session stops at its next checkpoint; no results are observed through this
    /// handle from now on.
    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!("Search session cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        let state = *self.state.borrow();
        if self.is_cancelled() && !state.is_terminal() {
            SessionState::Cancelled
        } else {
            state
        }
    }
}

/// The running half of a session
struct SessionTask {
    backend: Arc<dyn SearchBackend>,
    config: SearchConfig,
    query: SearchQuery,
    events: mpsc::UnboundedSender<SearchEvent>,
    state: watch::Sender<SessionState>,
    cancel: watch::Receiver<bool>,
}

impl SessionTask {
    async fn run(self) {
        match self.execute().await {
            Ok(Some((mode, total))) => {
                tracing::debug!("Search session finished in {mode:?} mode with {total} results");
                self.state.send_replace(SessionState::Finished);
                self.emit(SearchEvent::Finished { mode, total });
            }
            Ok(None) => {
                tracing::debug!("Search session observed cancellation");
                self.state.send_replace(SessionState::Cancelled);
                self.emit(SearchEvent::Cancelled);
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(self, error: SearchError) {
        tracing::warn!("Search session failed: {error}");
        self.state.send_replace(SessionState::Failed);
        self.emit(SearchEvent::Failed(error));
    }

    /// `Ok(None)` when cancelled
    async fn execute(&self) -> Result<Option<(SearchMode, usize)>, SearchError> {
        self.state.send_replace(SessionState::ViewportOnly);
        let Some(viewport_results) = self.round_trip(SearchMode::Viewport).await? else {
            return Ok(None);
        };

        let (mode, results) = if self.config.viewport_sufficient(&viewport_results)
            || !self.config.everywhere_fallback
        {
            (SearchMode::Viewport, viewport_results)
        } else {
            if self.is_cancelled() {
                return Ok(None);
            }
            self.state.send_replace(SessionState::Everywhere);
            self.emit(SearchEvent::ModeChanged {
                from: SearchMode::Viewport,
                to: SearchMode::Everywhere,
            });
            let Some(everywhere_results) = self.round_trip(SearchMode::Everywhere).await? else {
                return Ok(None);
            };
            (SearchMode::Everywhere, everywhere_results)
        };

        let mut delivered = 0;
        for batch in results.chunks(self.config.batch_size.max(1)) {
            if self.is_cancelled() {
                return Ok(None);
            }
            delivered += batch.len();
            self.emit(SearchEvent::Results {
                batch: batch.to_vec(),
                delivered,
            });
            tokio::task::yield_now().await;
        }

        if self.is_cancelled() {
            return Ok(None);
        }
        Ok(Some((mode, delivered)))
    }

    /// One backend call raced against cancellation; `Ok(None)` when cancelled first
    async fn round_trip(
        &self,
        mode: SearchMode,
    ) -> Result<Option<Vec<SearchResult>>, SearchError> {
        if self.is_cancelled() {
            return Ok(None);
        }

        let request = SearchRequest {
            query: self.query.query.clone(),
            locale: self.query.locale.clone(),
            viewport: self.query.viewport,
            mode,
            max_results: self.config.max_results,
        };

        tokio::select! {
            biased;

            _ = cancelled(self.cancel.clone()) => Ok(None),

            result = self.backend.search(request) => result.map(Some),
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.has_changed().is_err() || *self.cancel.borrow()
    }

    fn emit(&self, event: SearchEvent) {
        // Nobody listening any more is not an error
        let _ = self.events.send(event);
    }
}

/// Resolves once cancel is requested or the handle is dropped
async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}
