use super::events::{StageSink, TabEvent, TabEventKind, TabState, TabStatus};
use super::{Pipeline, SemanticAnalysis, TransformRoute};
use crate::error::PipelineError;
use crate::styles::Style;
use anyhow::Result;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An in-flight request that can be torn down.
pub trait CancelRequest: Send {
    fn cancel(&mut self) -> Result<()>;
}

/// Handle to a spawned tab pipeline.
pub struct TaskHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl CancelRequest for TaskHandle {
    fn cancel(&mut self) -> Result<()> {
        self.token.cancel();
        self.task.abort();
        Ok(())
    }
}

/// What a dispatch needs from the session.
pub struct DispatchContext<'a> {
    pub pipeline: &'a Arc<Pipeline>,
    pub source: &'a Arc<str>,
    pub events: &'a mpsc::UnboundedSender<TabEvent>,
}

/// Snapshot handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TabView {
    pub name: String,
    pub state: TabState,
    pub status: TabStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Effect of applying a [`TabEvent`] to its tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabChange {
    Progressed,
    ResultReady,
    Failed,
}

/// Owns one tab: its state, in-flight request and outcome.
pub struct TabController {
    index: usize,
    style: Arc<Style>,
    state: TabState,
    dispatch_id: u64,
    request: Option<Box<dyn CancelRequest>>,
    analysis: Option<SemanticAnalysis>,
    route: Option<TransformRoute>,
    result: Option<String>,
    error: Option<String>,
}

impl TabController {
    pub fn new(index: usize, style: Style) -> Self {
        Self {
            index,
            style: Arc::new(style),
            state: TabState::Idle,
            dispatch_id: 0,
            request: None,
            analysis: None,
            route: None,
            result: None,
            error: None,
        }
    }

    /// Starts the pipeline if the tab has never run. Returns whether a
    /// request was issued.
    pub fn dispatch(&mut self, ctx: &DispatchContext<'_>) -> bool {
        if self.state != TabState::Idle {
            return false;
        }
        self.start(ctx);
        true
    }

    /// Cancels an in-flight run and starts over. Settled and idle tabs are
    /// left alone.
    pub fn restart(&mut self, ctx: &DispatchContext<'_>) -> bool {
        if !self.state.is_in_flight() {
            return false;
        }
        if let Err(error) = self.cancel_request() {
            tracing::warn!(tab = %self.style.name, %error, "cancelling before restart failed");
        }
        self.start(ctx);
        true
    }

    fn start(&mut self, ctx: &DispatchContext<'_>) {
        self.dispatch_id += 1;
        self.state = TabState::Dispatched;
        self.analysis = None;
        self.route = None;
        self.result = None;
        self.error = None;
        tracing::info!(tab = %self.style.name, dispatch = self.dispatch_id, "dispatching");

        let sink = StageSink::new(self.index, self.dispatch_id, ctx.events.clone());
        let token = CancellationToken::new();
        let task = tokio::spawn(run_tab(
            Arc::clone(ctx.pipeline),
            Arc::clone(&self.style),
            Arc::clone(ctx.source),
            sink,
            token.clone(),
        ));
        self.request = Some(Box::new(TaskHandle { token, task }));
    }

    /// Folds a pipeline report into the tab. Reports from superseded runs and
    /// anything arriving after a terminal state are dropped.
    pub fn apply(&mut self, event: TabEvent) -> Option<TabChange> {
        if event.dispatch != self.dispatch_id
            || self.state.is_terminal()
            || self.state == TabState::Idle
        {
            return None;
        }

        match event.kind {
            TabEventKind::Stage(state) => {
                self.state = state;
                Some(TabChange::Progressed)
            }
            TabEventKind::Finished(Ok(outcome)) => {
                self.request = None;
                self.state = TabState::Cached;
                self.analysis = outcome.analysis;
                self.route = Some(outcome.route);
                self.result = Some(outcome.text);
                tracing::info!(tab = %self.style.name, route = ?outcome.route, "tab cached");
                Some(TabChange::ResultReady)
            }
            TabEventKind::Finished(Err(error)) => {
                self.request = None;
                self.state = TabState::Error;
                tracing::warn!(tab = %self.style.name, %error, "tab failed");
                self.error = Some(error.to_string());
                Some(TabChange::Failed)
            }
        }
    }

    /// Best-effort teardown of the outstanding request, if any.
    pub fn cancel_request(&mut self) -> Result<()> {
        match self.request.take() {
            Some(mut request) => request.cancel(),
            None => Ok(()),
        }
    }

    /// Marks an in-flight tab as failed after its request was torn down.
    /// Returns whether the tab changed.
    pub fn mark_aborted(&mut self, reason: &str) -> bool {
        if !self.state.is_in_flight() {
            return false;
        }
        self.request = None;
        self.state = TabState::Error;
        self.error = Some(PipelineError::Aborted(reason.to_string()).to_string());
        tracing::info!(tab = %self.style.name, reason, "tab aborted");
        true
    }

    pub fn has_request(&self) -> bool {
        self.request.is_some()
    }

    #[cfg(test)]
    pub(crate) fn replace_request(&mut self, request: Box<dyn CancelRequest>) {
        if let Some(mut previous) = self.request.replace(request) {
            let _ = previous.cancel();
        }
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn name(&self) -> &str {
        &self.style.name
    }

    pub fn state(&self) -> TabState {
        self.state
    }

    pub fn status(&self) -> TabStatus {
        self.state.status()
    }

    pub fn analysis(&self) -> Option<&SemanticAnalysis> {
        self.analysis.as_ref()
    }

    pub fn route(&self) -> Option<TransformRoute> {
        self.route
    }

    pub fn result(&self) -> Option<&str> {
        self.result.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn view(&self) -> TabView {
        TabView {
            name: self.style.name.clone(),
            state: self.state,
            status: self.status(),
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }
}

async fn run_tab(
    pipeline: Arc<Pipeline>,
    style: Arc<Style>,
    source: Arc<str>,
    sink: StageSink,
    token: CancellationToken,
) {
    let run = AssertUnwindSafe(pipeline.run(&style, &source, &sink)).catch_unwind();
    let outcome = tokio::select! {
        _ = token.cancelled() => {
            tracing::debug!(tab = %style.name, "pipeline cancelled");
            return;
        }
        outcome = run => outcome,
    };

    match outcome {
        Ok(outcome) => sink.finish(outcome),
        Err(_) => sink.finish(Err(PipelineError::Aborted(format!(
            "pipeline for '{}' panicked",
            style.name
        )))),
    }
}
