use crate::api::Transport;
use crate::config::{PipelineSettings, ReselectPolicy};
use crate::error::StartupError;
use crate::pipeline::{
    DispatchContext, Pipeline, TabChange, TabController, TabEvent, TabState, TabView,
};
use crate::store::SessionStore;
use crate::styles::Style;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Presentation-layer hooks. Called on the session's thread, in the order
/// completions arrive.
pub trait TabObserver {
    fn on_state_changed(&mut self, _index: usize, _view: &TabView) {}
    fn on_result_ready(&mut self, index: usize, text: &str);
}

/// Observer that ignores everything.
pub struct NullObserver;

impl TabObserver for NullObserver {
    fn on_result_ready(&mut self, _index: usize, _text: &str) {}
}

/// Collaborators a session is built from.
pub struct SessionDeps {
    pub transport: Arc<dyn Transport>,
    pub settings: PipelineSettings,
    pub store: Box<dyn SessionStore>,
    pub observer: Box<dyn TabObserver>,
}

/// Outcome of selecting a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// First selection: the pipeline was started.
    Dispatched,
    /// The tab was mid-flight and the reselect policy restarted it.
    Restarted,
    /// Already processing; nothing was sent.
    InProgress,
    /// Already cached or failed; nothing was sent.
    Settled,
}

/// Owns every tab, the shared source text and the selection.
pub struct SessionManager {
    source: Arc<str>,
    tabs: Vec<TabController>,
    selected: usize,
    pipeline: Arc<Pipeline>,
    reselect: ReselectPolicy,
    store: Box<dyn SessionStore>,
    observer: Box<dyn TabObserver>,
    events_tx: mpsc::UnboundedSender<TabEvent>,
    events_rx: mpsc::UnboundedReceiver<TabEvent>,
    shut_down: bool,
}

impl SessionManager {
    /// Builds one idle tab per style, restores the last used style (or the
    /// alphabetically first one) and dispatches it.
    ///
    /// Must be called inside a tokio runtime.
    pub fn initialize(
        deps: SessionDeps,
        styles: Vec<Style>,
        source_text: String,
    ) -> Result<Self, StartupError> {
        if styles.is_empty() {
            return Err(StartupError::NoStylesFound("the loaded style list".to_string()));
        }
        if source_text.trim().is_empty() {
            return Err(StartupError::ClipboardEmpty);
        }

        let last_style = deps.store.load();
        let selected = styles
            .iter()
            .position(|style| !last_style.is_empty() && style.name == last_style)
            .unwrap_or_else(|| alphabetically_first(&styles));
        let tabs = styles
            .into_iter()
            .enumerate()
            .map(|(index, style)| TabController::new(index, style))
            .collect();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut session = Self {
            source: Arc::from(source_text),
            tabs,
            selected,
            reselect: deps.settings.reselect,
            pipeline: Arc::new(Pipeline::new(deps.transport, deps.settings)),
            store: deps.store,
            observer: deps.observer,
            events_tx,
            events_rx,
            shut_down: false,
        };
        tracing::info!(
            tabs = session.tabs.len(),
            selected = %session.tabs[selected].name(),
            "session initialised"
        );
        session.activate(selected);
        Ok(session)
    }

    /// Selects a tab, persisting its style name. Only the first selection of
    /// a tab issues requests, unless the reselect policy restarts in-flight
    /// tabs. Returns `None` for an out-of-range index.
    pub fn select_tab(&mut self, index: usize) -> Option<Selection> {
        if index >= self.tabs.len() || self.shut_down {
            return None;
        }
        self.selected = index;
        self.store.save(self.tabs[index].name());
        Some(self.activate(index))
    }

    pub fn select_style(&mut self, name: &str) -> Option<Selection> {
        let index = self.tabs.iter().position(|tab| tab.name() == name)?;
        self.select_tab(index)
    }

    fn activate(&mut self, index: usize) -> Selection {
        let ctx = DispatchContext {
            pipeline: &self.pipeline,
            source: &self.source,
            events: &self.events_tx,
        };
        let tab = &mut self.tabs[index];
        let selection = match tab.state() {
            TabState::Idle => {
                tab.dispatch(&ctx);
                Selection::Dispatched
            }
            state if state.is_terminal() => Selection::Settled,
            _ if self.reselect == ReselectPolicy::CancelInFlight => {
                tab.restart(&ctx);
                Selection::Restarted
            }
            _ => Selection::InProgress,
        };
        if matches!(selection, Selection::Dispatched | Selection::Restarted) {
            self.observer.on_state_changed(index, &tab.view());
        }
        selection
    }

    /// Waits for the next pipeline report and applies it. Returns the tab it
    /// concerned, or `None` once the session is shut down.
    pub async fn next_event(&mut self) -> Option<usize> {
        if self.shut_down {
            return None;
        }
        let event = self.events_rx.recv().await?;
        let index = event.tab;
        self.apply_event(event);
        Some(index)
    }

    /// Drives the event loop until no tab is processing.
    pub async fn run_until_settled(&mut self) {
        while self.has_in_flight() {
            if self.next_event().await.is_none() {
                break;
            }
        }
    }

    fn apply_event(&mut self, event: TabEvent) {
        let index = event.tab;
        let Some(tab) = self.tabs.get_mut(index) else {
            tracing::warn!(tab = index, "event for unknown tab");
            return;
        };
        let Some(change) = tab.apply(event) else {
            return;
        };
        self.observer.on_state_changed(index, &tab.view());
        if change == TabChange::ResultReady {
            if let Some(text) = tab.result() {
                self.observer.on_result_ready(index, text);
            }
        }
    }

    /// Cancels every outstanding request and fails the tabs that were still
    /// processing. A failure on one tab does not stop the others. Only the
    /// first call does anything.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        for (index, tab) in self.tabs.iter_mut().enumerate() {
            if let Err(error) = tab.cancel_request() {
                tracing::warn!(tab = %tab.name(), %error, "cancellation failed during shutdown");
            }
            if tab.mark_aborted("cancelled at shutdown") {
                self.observer.on_state_changed(index, &tab.view());
            }
        }
        self.events_rx.close();
        tracing::info!("session shut down");
    }

    pub fn has_in_flight(&self) -> bool {
        self.tabs.iter().any(|tab| tab.state().is_in_flight())
    }

    pub fn tabs(&self) -> &[TabController] {
        &self.tabs
    }

    pub fn tab(&self, index: usize) -> Option<&TabController> {
        self.tabs.get(index)
    }

    pub fn view(&self, index: usize) -> Option<TabView> {
        self.tabs.get(index).map(TabController::view)
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected_tab(&self) -> &TabController {
        &self.tabs[self.selected]
    }

    #[cfg(test)]
    pub(crate) fn tab_mut(&mut self, index: usize) -> &mut TabController {
        &mut self.tabs[index]
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn alphabetically_first(styles: &[Style]) -> usize {
    styles
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.name.cmp(&b.name))
        .map(|(index, _)| index)
        .unwrap_or(0)
}
