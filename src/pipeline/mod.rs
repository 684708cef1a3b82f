mod analysis;
mod controller;
mod events;
mod extract;
mod prompts;
mod single_pass;
mod two_pass;

pub use analysis::{
    keeps_original_wording, AmbiguityDirective, AmbiguityResolution, SemanticAnalysis,
};
pub use controller::{CancelRequest, DispatchContext, TabChange, TabController, TabView, TaskHandle};
pub use events::{StageSink, TabEvent, TabEventKind, TabState, TabStatus};
pub use extract::extract_balanced_json;
pub use prompts::{analysis_prompt, delimited_source, second_pass_prompt};
pub use single_pass::single_pass;
pub use two_pass::two_pass;

use crate::api::Transport;
use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::styles::Style;
use std::sync::Arc;

const EM_DASH: char = '\u{2014}';

/// Which path produced a tab's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformRoute {
    SinglePass,
    TwoPass,
    Fallback,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutcome {
    pub text: String,
    pub analysis: Option<SemanticAnalysis>,
    pub route: TransformRoute,
}

/// Em-dashes never survive into final text.
pub fn normalize_dashes(text: &str) -> String {
    text.replace(EM_DASH, " - ")
}

/// The transform every tab runs: single pass or two pass, depending on
/// settings. Shared across tabs.
pub struct Pipeline {
    transport: Arc<dyn Transport>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(transport: Arc<dyn Transport>, settings: PipelineSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub async fn run(
        &self,
        style: &Style,
        source: &str,
        stages: &StageSink,
    ) -> Result<TransformOutcome, PipelineError> {
        if self.settings.two_pass {
            return two_pass(self.transport.as_ref(), &self.settings, style, source, stages).await;
        }

        stages.enter(TabState::SinglePass);
        let text = single_pass(self.transport.as_ref(), &style.prompt, source)
            .await
            .map_err(|error| PipelineError::transport("single pass", error))?;
        Ok(TransformOutcome {
            text,
            analysis: None,
            route: TransformRoute::SinglePass,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockReply, MockTransport};
    use tokio::sync::mpsc;

    #[test]
    fn test_normalize_dashes_replaces_every_em_dash() {
        assert_eq!(normalize_dashes("a\u{2014}b"), "a - b");
        assert_eq!(normalize_dashes("one\u{2014}two\u{2014}three"), "one - two - three");
        assert_eq!(normalize_dashes("en\u{2013}dash stays"), "en\u{2013}dash stays");
        assert!(!normalize_dashes("\u{2014}\u{2014}").contains(EM_DASH));
    }

    #[tokio::test]
    async fn test_single_pass_mode_issues_one_request() {
        let mock = MockTransport::new(vec![MockReply::text("Hello\u{2014}world")]);
        let settings = PipelineSettings {
            two_pass: false,
            ..PipelineSettings::default()
        };
        let pipeline = Pipeline::new(Arc::new(mock.clone()), settings);
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = pipeline
            .run(&Style::new("plain", "Be plain."), "hi", &StageSink::new(0, 1, tx))
            .await
            .unwrap();

        assert_eq!(outcome.text, "Hello - world");
        assert_eq!(outcome.route, TransformRoute::SinglePass);
        assert!(outcome.analysis.is_none());
        assert_eq!(mock.call_count(), 1);
        assert!(matches!(
            rx.try_recv().unwrap().kind,
            TabEventKind::Stage(TabState::SinglePass)
        ));
    }
}
