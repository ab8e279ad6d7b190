//! Narrative strategies
//!
//! Tried in order until one yields a narrative:
//! structured parse of the remote reply, heuristic extraction from
//! free-form remote text, then the deterministic template.

use serde::{Deserialize, Serialize};

use crate::classifier::Intent;
use crate::models::{FinancialGoal, UserProfile};

use super::narrative;
use super::ContextBundle;

const MAX_RECOMMENDATIONS: usize = 4;
const MAX_RECOMMENDATION_LINE: usize = 200;
const MIN_RECOMMENDATION_CHARS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeSource {
    Remote,
    RemoteUnstructured,
    Template,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Narrative {
    pub response: String,
    pub recommendations: Vec<String>,
    pub source: NarrativeSource,
}

/// Everything a strategy may draw on
pub struct NarrativeInput<'a> {
    /// Raw remote reply, None when the call failed or no model is configured
    pub raw: Option<&'a str>,
    pub intent: Intent,
    pub profile: &'a UserProfile,
    pub goals: &'a [FinancialGoal],
    pub bundle: &'a ContextBundle,
}

pub trait NarrativeStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn compose(&self, input: &NarrativeInput<'_>) -> Option<Narrative>;
}

#[derive(Deserialize)]
struct RemoteReply {
    response: String,
    #[serde(default)]
    recommendations: Vec<String>,
}

/// The requested `{response, recommendations}` document
pub struct StructuredParse;

impl NarrativeStrategy for StructuredParse {
    fn name(&self) -> &'static str {
        "structured_parse"
    }

    fn compose(&self, input: &NarrativeInput<'_>) -> Option<Narrative> {
        let raw = input.raw?;
        let reply: RemoteReply = serde_json::from_str(strip_json_fence(raw)).ok()?;
        let response = reply.response.trim().to_string();
        if response.is_empty() {
            return None;
        }

        let mut recommendations: Vec<String> = reply
            .recommendations
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .take(MAX_RECOMMENDATIONS)
            .collect();
        if recommendations.is_empty() {
            recommendations = extract_recommendations(&response);
        }

        Some(Narrative {
            response,
            recommendations,
            source: NarrativeSource::Remote,
        })
    }
}

/// Free-form remote prose; recommendations pulled from its list lines
pub struct HeuristicExtract;

impl NarrativeStrategy for HeuristicExtract {
    fn name(&self) -> &'static str {
        "heuristic_extract"
    }

    fn compose(&self, input: &NarrativeInput<'_>) -> Option<Narrative> {
        let text = input.raw?.trim();
        // a JSON document that failed the structured parse is not prose
        if text.is_empty() || text.starts_with('{') || text.starts_with("```") {
            return None;
        }

        Some(Narrative {
            response: text.to_string(),
            recommendations: extract_recommendations(text),
            source: NarrativeSource::RemoteUnstructured,
        })
    }
}

/// Deterministic template keyed by intent. Always succeeds.
pub struct Template;

impl NarrativeStrategy for Template {
    fn name(&self) -> &'static str {
        "template"
    }

    fn compose(&self, input: &NarrativeInput<'_>) -> Option<Narrative> {
        let response = narrative::render(input.intent, input.profile, input.goals, input.bundle);
        let recommendations = extract_recommendations(&response);
        Some(Narrative {
            response,
            recommendations,
            source: NarrativeSource::Template,
        })
    }
}

pub fn default_strategies() -> Vec<Box<dyn NarrativeStrategy>> {
    vec![
        Box::new(StructuredParse),
        Box::new(HeuristicExtract),
        Box::new(Template),
    ]
}

/// Remove a markdown ```json ... ``` fence if present
fn strip_json_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Bulleted and numbered lines of a reply, at most four
pub fn extract_recommendations(text: &str) -> Vec<String> {
    let mut found: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| line.chars().count() < MAX_RECOMMENDATION_LINE)
        .filter_map(strip_list_marker)
        .filter(|item| item.chars().count() > MIN_RECOMMENDATION_CHARS)
        .map(str::to_string)
        .take(MAX_RECOMMENDATIONS)
        .collect();

    if found.is_empty() {
        found = vec![
            "Создайте бюджет согласно исламским принципам распределения".to_string(),
            "Регулярно откладывайте 20% дохода на сбережения".to_string(),
            "Выделяйте 2.5% на закят для очищения имущества".to_string(),
        ];
    }
    found
}

fn strip_list_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix("• ").or_else(|| line.strip_prefix("- ")) {
        return Some(rest.trim());
    }

    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        return line[digits..].strip_prefix(". ").map(str::trim);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_json_fence() {
        assert_eq!(strip_json_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_extract_recommendations() {
        let text = "Совет:\n• Откройте счет Мудараба\n- коротко\n2. Выделяйте закят ежемесячно\nтекст";
        assert_eq!(
            extract_recommendations(text),
            vec![
                "Откройте счет Мудараба".to_string(),
                "Выделяйте закят ежемесячно".to_string()
            ]
        );
    }

    #[test]
    fn test_extract_recommendations_defaults() {
        let recs = extract_recommendations("Просто текст без списка");
        assert_eq!(recs.len(), 3);
        assert!(recs[2].contains("закят"));
    }

    #[test]
    fn test_extract_caps_at_four() {
        let text = (1..=6)
            .map(|i| format!("{}. Рекомендация номер {}", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(extract_recommendations(&text).len(), 4);
    }
}
