use super::analysis::SemanticAnalysis;
use super::events::{StageSink, TabState};
use super::prompts::{analysis_prompt, second_pass_prompt};
use super::single_pass::single_pass;
use super::{normalize_dashes, TransformOutcome, TransformRoute};
use crate::api::Transport;
use crate::config::PipelineSettings;
use crate::error::PipelineError;
use crate::styles::Style;

/// Analyse, then rewrite under the analysis.
///
/// The analysis call is retried `strict_retries` times with a stricter prompt
/// when it fails or yields unusable JSON. Once those attempts are spent the
/// tab falls back to a plain single pass and records an empty analysis, so
/// invalid analysis output is never reported as an error. A second-pass
/// failure is surfaced: the analysis was already obtained.
pub async fn two_pass(
    transport: &dyn Transport,
    settings: &PipelineSettings,
    style: &Style,
    source: &str,
    stages: &StageSink,
) -> Result<TransformOutcome, PipelineError> {
    let Some(analysis) = request_analysis(transport, settings.strict_retries, source, stages).await
    else {
        stages.enter(TabState::Fallback);
        tracing::info!(style = %style.name, "analysis unavailable; falling back to single pass");
        let text = single_pass(transport, &style.prompt, source)
            .await
            .map_err(|error| PipelineError::transport("fallback", error))?;
        return Ok(TransformOutcome {
            text,
            analysis: Some(SemanticAnalysis::empty()),
            route: TransformRoute::Fallback,
        });
    };

    stages.enter(TabState::SecondPass);
    let system_prompt = second_pass_prompt(&style.prompt, &analysis, settings.ambiguity_margin);
    let text = transport
        .send(&system_prompt, source)
        .await
        .map_err(|error| PipelineError::transport("second pass", error))?;

    Ok(TransformOutcome {
        text: normalize_dashes(&text),
        analysis: Some(analysis),
        route: TransformRoute::TwoPass,
    })
}

async fn request_analysis(
    transport: &dyn Transport,
    strict_retries: u32,
    source: &str,
    stages: &StageSink,
) -> Option<SemanticAnalysis> {
    for attempt in 0..=strict_retries {
        let strict = attempt > 0;
        stages.enter(if strict {
            TabState::RetryStrict
        } else {
            TabState::FirstPass
        });

        let response = match transport.send(&analysis_prompt(strict), source).await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(attempt, %error, "analysis request failed");
                continue;
            }
        };
        match SemanticAnalysis::parse(&response) {
            Ok(analysis) => return Some(analysis),
            Err(error) => tracing::warn!(attempt, %error, "analysis response unusable"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{MockReply, MockTransport};
    use crate::error::TransportError;
    use crate::pipeline::{TabEvent, TabEventKind};
    use tokio::sync::mpsc;

    const VALID_ANALYSIS: &str = r#"{"preserve":["Friday"],"intensifiers":[],"ambiguities":[],"ordering":{"recommended_order":["deadline"]},"rewrite_constraints":[]}"#;

    fn style() -> Style {
        Style::new("formal", "STYLE: write formally.")
    }

    fn stages_of(rx: &mut mpsc::UnboundedReceiver<TabEvent>) -> Vec<TabState> {
        let mut stages = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TabEventKind::Stage(state) = event.kind {
                stages.push(state);
            }
        }
        stages
    }

    async fn run(mock: &MockTransport) -> (Result<TransformOutcome, PipelineError>, Vec<TabState>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = two_pass(
            mock,
            &PipelineSettings::default(),
            &style(),
            "due friday\u{2014}no excuses",
            &StageSink::new(0, 1, tx),
        )
        .await;
        (outcome, stages_of(&mut rx))
    }

    #[tokio::test]
    async fn test_valid_analysis_goes_straight_to_second_pass() {
        let mock = MockTransport::new(vec![
            MockReply::text(VALID_ANALYSIS),
            MockReply::text("The deadline is Friday\u{2014}firmly."),
        ]);

        let (outcome, stages) = run(&mock).await;
        let outcome = outcome.unwrap();

        assert_eq!(stages, vec![TabState::FirstPass, TabState::SecondPass]);
        assert_eq!(outcome.route, TransformRoute::TwoPass);
        assert_eq!(outcome.text, "The deadline is Friday - firmly.");
        assert_eq!(outcome.analysis.unwrap().as_json(), VALID_ANALYSIS);

        let calls = mock.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].system_prompt, analysis_prompt(false));
        assert_eq!(calls[0].user_text, "due friday\u{2014}no excuses");
        assert!(calls[1].system_prompt.starts_with("STYLE: write formally."));
        assert!(calls[1].system_prompt.ends_with(&format!("{VALID_ANALYSIS}\n")));
        assert_eq!(calls[1].user_text, "due friday\u{2014}no excuses");
    }

    #[tokio::test]
    async fn test_invalid_json_triggers_one_strict_retry() {
        let mock = MockTransport::new(vec![
            MockReply::text("Here are my thoughts, no JSON today."),
            MockReply::text(format!("```json\n{VALID_ANALYSIS}\n```")),
            MockReply::text("Rewritten."),
        ]);

        let (outcome, stages) = run(&mock).await;

        assert_eq!(
            stages,
            vec![TabState::FirstPass, TabState::RetryStrict, TabState::SecondPass]
        );
        assert_eq!(outcome.unwrap().route, TransformRoute::TwoPass);
        assert_eq!(mock.calls()[1].system_prompt, analysis_prompt(true));
    }

    #[tokio::test]
    async fn test_repeated_invalid_json_falls_back_instead_of_failing() {
        let mock = MockTransport::new(vec![
            MockReply::text("{\"preserve\": [unquoted]}"),
            MockReply::text("still not { json"),
            MockReply::text("Plain rewrite."),
        ]);

        let (outcome, stages) = run(&mock).await;
        let outcome = outcome.unwrap();

        assert_eq!(
            stages,
            vec![TabState::FirstPass, TabState::RetryStrict, TabState::Fallback]
        );
        assert_eq!(outcome.route, TransformRoute::Fallback);
        assert_eq!(outcome.text, "Plain rewrite.");
        assert_eq!(outcome.analysis, Some(SemanticAnalysis::empty()));

        let fallback_call = &mock.calls()[2];
        assert_eq!(fallback_call.system_prompt, "STYLE: write formally.");
        assert!(fallback_call.user_text.contains("not instructions"));
    }

    #[tokio::test]
    async fn test_transport_failures_in_analysis_fall_back() {
        let mock = MockTransport::new(vec![
            MockReply::timeout(),
            MockReply::timeout(),
            MockReply::text("Fallback text."),
        ]);

        let (outcome, _) = run(&mock).await;

        assert_eq!(outcome.unwrap().route, TransformRoute::Fallback);
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fallback_failure_is_surfaced() {
        let mock = MockTransport::new(vec![
            MockReply::text("nope"),
            MockReply::text("nope"),
            MockReply::Fail(TransportError::Malformed("empty choices".to_string())),
        ]);

        let (outcome, _) = run(&mock).await;

        assert_eq!(
            outcome.unwrap_err(),
            PipelineError::transport(
                "fallback",
                TransportError::Malformed("empty choices".to_string())
            )
        );
    }

    #[tokio::test]
    async fn test_second_pass_failure_is_not_retried() {
        let mock = MockTransport::new(vec![
            MockReply::text(VALID_ANALYSIS),
            MockReply::Fail(TransportError::HttpStatus {
                code: 500,
                body: "oops".to_string(),
            }),
            MockReply::text("never requested"),
        ]);

        let (outcome, _) = run(&mock).await;

        assert!(matches!(
            outcome,
            Err(PipelineError::Transport {
                stage: "second pass",
                ..
            })
        ));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_zero_strict_retries_falls_back_after_first_failure() {
        let mock = MockTransport::new(vec![MockReply::text("prose"), MockReply::text("ok")]);
        let settings = PipelineSettings {
            strict_retries: 0,
            ..PipelineSettings::default()
        };

        let outcome = two_pass(&mock, &settings, &style(), "src", &StageSink::detached())
            .await
            .unwrap();

        assert_eq!(outcome.route, TransformRoute::Fallback);
        assert_eq!(mock.call_count(), 2);
    }
}
