use super::TransformOutcome;
use crate::error::PipelineError;
use tokio::sync::mpsc;

/// Lifecycle of one tab's pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabState {
    Idle,
    Dispatched,
    SinglePass,
    FirstPass,
    RetryStrict,
    Fallback,
    SecondPass,
    Cached,
    Error,
}

/// Coarse state exposed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabStatus {
    Idle,
    Processing,
    Cached,
    Error,
}

impl TabState {
    pub fn status(self) -> TabStatus {
        match self {
            Self::Idle => TabStatus::Idle,
            Self::Cached => TabStatus::Cached,
            Self::Error => TabStatus::Error,
            Self::Dispatched
            | Self::SinglePass
            | Self::FirstPass
            | Self::RetryStrict
            | Self::Fallback
            | Self::SecondPass => TabStatus::Processing,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cached | Self::Error)
    }

    pub fn is_in_flight(self) -> bool {
        self.status() == TabStatus::Processing
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Dispatched => "dispatched",
            Self::SinglePass => "rewriting",
            Self::FirstPass => "analysing",
            Self::RetryStrict => "re-analysing",
            Self::Fallback => "rewriting without analysis",
            Self::SecondPass => "rewriting with analysis",
            Self::Cached => "done",
            Self::Error => "failed",
        }
    }
}

#[derive(Debug)]
pub enum TabEventKind {
    Stage(TabState),
    Finished(Result<TransformOutcome, PipelineError>),
}

/// Completion or progress report from a tab's pipeline task.
///
/// `dispatch` identifies which run of the tab produced the event so that
/// reports from a cancelled run can be discarded.
#[derive(Debug)]
pub struct TabEvent {
    pub tab: usize,
    pub dispatch: u64,
    pub kind: TabEventKind,
}

/// Where a running pipeline reports its stage transitions.
#[derive(Debug, Clone)]
pub struct StageSink {
    tab: usize,
    dispatch: u64,
    tx: Option<mpsc::UnboundedSender<TabEvent>>,
}

impl StageSink {
    pub fn new(tab: usize, dispatch: u64, tx: mpsc::UnboundedSender<TabEvent>) -> Self {
        Self {
            tab,
            dispatch,
            tx: Some(tx),
        }
    }

    /// A sink that reports nowhere, for running a transform on its own.
    pub fn detached() -> Self {
        Self {
            tab: 0,
            dispatch: 0,
            tx: None,
        }
    }

    pub fn enter(&self, state: TabState) {
        tracing::debug!(tab = self.tab, dispatch = self.dispatch, stage = state.label(), "tab stage");
        self.send(TabEventKind::Stage(state));
    }

    pub fn finish(&self, outcome: Result<TransformOutcome, PipelineError>) {
        self.send(TabEventKind::Finished(outcome));
    }

    fn send(&self, kind: TabEventKind) {
        if let Some(tx) = &self.tx {
            // The receiver only goes away once the session is torn down.
            let _ = tx.send(TabEvent {
                tab: self.tab,
                dispatch: self.dispatch,
                kind,
            });
        }
    }
}
