use super::extract::extract_balanced_json;
use crate::error::AnalysisError;
use serde_json::{json, Value};

/// First-pass output: a JSON object forwarded verbatim into the second pass.
///
/// Only top-level well-formedness is checked; the nested shape is the
/// model's business.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticAnalysis {
    raw: String,
    value: Value,
}

impl SemanticAnalysis {
    /// Extracts the first balanced object from a model response and parses it.
    pub fn parse(response: &str) -> Result<Self, AnalysisError> {
        let candidate = extract_balanced_json(response).trim();
        let value: Value = serde_json::from_str(candidate)?;
        if !value.is_object() {
            return Err(AnalysisError::NotAnObject);
        }
        Ok(Self {
            raw: candidate.to_string(),
            value,
        })
    }

    /// The analysis recorded when the first pass could not produce one.
    pub fn empty() -> Self {
        let value = json!({
            "preserve": [],
            "intensifiers": [],
            "ambiguities": [],
            "rewrite_constraints": [],
        });
        Self {
            raw: value.to_string(),
            value,
        }
    }

    /// The JSON exactly as the model produced it.
    pub fn as_json(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        let arrays_empty = ["preserve", "intensifiers", "ambiguities", "rewrite_constraints"]
            .iter()
            .all(|key| {
                self.value
                    .get(key)
                    .and_then(Value::as_array)
                    .map_or(true, Vec::is_empty)
            });
        let ordering_empty = self
            .value
            .get("ordering")
            .and_then(|ordering| ordering.get("recommended_order"))
            .and_then(Value::as_array)
            .map_or(true, Vec::is_empty);
        arrays_empty && ordering_empty
    }

    /// One directive per ambiguity that carries usable probabilities.
    pub fn ambiguity_directives(&self, margin_points: u8) -> Vec<AmbiguityDirective> {
        let Some(entries) = self.value.get("ambiguities").and_then(Value::as_array) else {
            return Vec::new();
        };
        entries
            .iter()
            .filter_map(|entry| AmbiguityDirective::from_entry(entry, margin_points))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AmbiguityResolution {
    KeepOriginal,
    Use(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguityDirective {
    pub span: String,
    pub resolution: AmbiguityResolution,
    /// Top and runner-up probabilities in percentage points.
    pub top: f64,
    pub runner_up: Option<f64>,
}

impl AmbiguityDirective {
    fn from_entry(entry: &Value, margin_points: u8) -> Option<Self> {
        let span = first_str(entry, &["span", "text", "phrase"])?.to_string();
        let interpretations = ["interpretations", "readings", "options"]
            .iter()
            .find_map(|key| entry.get(key).and_then(Value::as_array))?;

        let mut scored: Vec<(String, f64)> = interpretations
            .iter()
            .filter_map(|item| {
                let label = first_str(item, &["meaning", "reading", "interpretation", "text"])?;
                let probability = ["probability", "likelihood", "confidence"]
                    .iter()
                    .find_map(|key| item.get(key).and_then(Value::as_f64))?;
                Some((label.to_string(), probability))
            })
            .collect();
        if scored.is_empty() {
            return None;
        }

        // Models mix 0-1 and 0-100 scales.
        if scored.iter().all(|(_, p)| *p <= 1.0) {
            for (_, p) in &mut scored {
                *p *= 100.0;
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let top = scored[0].1;
        let runner_up = scored.get(1).map(|(_, p)| *p);
        let resolution = if keeps_original_wording(top, runner_up, margin_points) {
            AmbiguityResolution::KeepOriginal
        } else {
            AmbiguityResolution::Use(scored[0].0.clone())
        };
        Some(Self {
            span,
            resolution,
            top,
            runner_up,
        })
    }

    pub fn instruction(&self) -> String {
        let odds = match self.runner_up {
            Some(runner_up) => format!("{:.0}/{:.0}", self.top, runner_up),
            None => format!("{:.0}", self.top),
        };
        match &self.resolution {
            AmbiguityResolution::KeepOriginal => format!(
                "\"{}\": keep the original wording verbatim ({odds}, too close to call)",
                self.span
            ),
            AmbiguityResolution::Use(reading) => {
                format!("\"{}\": write it as \"{reading}\" ({odds})", self.span)
            }
        }
    }
}

/// True when the original wording must be kept: the top two readings are
/// within `margin_points` percentage points of each other (inclusive).
pub fn keeps_original_wording(top: f64, runner_up: Option<f64>, margin_points: u8) -> bool {
    let Some(runner_up) = runner_up else {
        return false;
    };
    // Round away float noise such as 0.6 * 100 - 0.4 * 100 = 20.000000000000007.
    let gap = ((top - runner_up) * 1000.0).round() / 1000.0;
    gap <= f64::from(margin_points)
}

fn first_str<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_raw_span_verbatim() {
        let response = "Analysis follows.\n{\"preserve\": [\"ACME\"],  \"intensifiers\": []}\nThanks";
        let analysis = SemanticAnalysis::parse(response).unwrap();
        assert_eq!(analysis.as_json(), "{\"preserve\": [\"ACME\"],  \"intensifiers\": []}");
        assert_eq!(analysis.value()["preserve"][0], "ACME");
        assert!(!analysis.is_empty());
    }

    #[test]
    fn test_parse_rejects_prose_and_non_objects() {
        assert!(matches!(
            SemanticAnalysis::parse("I could not analyse this."),
            Err(AnalysisError::InvalidJson(_))
        ));
        assert!(matches!(
            SemanticAnalysis::parse("{\"preserve\": [\"unterminated\""),
            Err(AnalysisError::InvalidJson(_))
        ));
        assert!(matches!(
            SemanticAnalysis::parse("[1, 2, 3]"),
            Err(AnalysisError::InvalidJson(_)) | Err(AnalysisError::NotAnObject)
        ));
    }

    #[test]
    fn test_empty_analysis_has_empty_arrays() {
        let analysis = SemanticAnalysis::empty();
        assert!(analysis.is_empty());
        for key in ["preserve", "intensifiers", "ambiguities", "rewrite_constraints"] {
            assert_eq!(analysis.value()[key], json!([]), "{key}");
        }
        let reparsed: Value = serde_json::from_str(analysis.as_json()).unwrap();
        assert_eq!(&reparsed, analysis.value());
    }

    fn ambiguity(first: f64, second: f64) -> SemanticAnalysis {
        let raw = json!({
            "ambiguities": [{
                "span": "run the numbers",
                "interpretations": [
                    {"meaning": "calculate", "probability": first},
                    {"meaning": "publish", "probability": second}
                ]
            }]
        })
        .to_string();
        SemanticAnalysis::parse(&raw).unwrap()
    }

    #[test]
    fn test_close_probabilities_keep_original_wording() {
        let directives = ambiguity(0.55, 0.45).ambiguity_directives(20);
        assert_eq!(directives.len(), 1);
        assert_eq!(directives[0].resolution, AmbiguityResolution::KeepOriginal);
        assert!(directives[0].instruction().contains("keep the original wording verbatim"));
    }

    #[test]
    fn test_clear_winner_is_selected() {
        let directives = ambiguity(80.0, 20.0).ambiguity_directives(20);
        assert_eq!(
            directives[0].resolution,
            AmbiguityResolution::Use("calculate".to_string())
        );
        assert!(directives[0].instruction().contains("\"calculate\" (80/20)"));
    }

    #[test]
    fn test_margin_boundary_is_inclusive_and_configurable() {
        assert_eq!(
            ambiguity(0.6, 0.4).ambiguity_directives(20)[0].resolution,
            AmbiguityResolution::KeepOriginal
        );
        assert_eq!(
            ambiguity(0.6, 0.4).ambiguity_directives(10)[0].resolution,
            AmbiguityResolution::Use("calculate".to_string())
        );
    }

    #[test]
    fn test_unordered_interpretations_pick_highest() {
        let analysis = ambiguity(0.1, 0.9);
        assert_eq!(
            analysis.ambiguity_directives(20)[0].resolution,
            AmbiguityResolution::Use("publish".to_string())
        );
    }

    #[test]
    fn test_entries_without_probabilities_are_skipped() {
        let analysis = SemanticAnalysis::parse(
            r#"{"ambiguities":[{"span":"it","interpretations":[{"meaning":"the report"}]},"loose note"]}"#,
        )
        .unwrap();
        assert!(analysis.ambiguity_directives(20).is_empty());
    }

    #[test]
    fn test_single_interpretation_is_used() {
        assert!(!keeps_original_wording(70.0, None, 20));
        assert!(keeps_original_wording(55.0, Some(45.0), 20));
        assert!(!keeps_original_wording(80.0, Some(20.0), 20));
    }
}
