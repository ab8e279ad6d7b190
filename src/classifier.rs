//! Intent Classifier
//!
//! Maps a user message to the advisory topic it asks about. The detected
//! intent selects the template narrative when the remote model is unavailable.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    GoalSetting,
    Advice,
    Housing,
    Hajj,
    SpendingCuts,
    StressSpending,
    Investment,
    Zakat,
    Budgeting,
    General,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Greeting => "greeting",
            Intent::GoalSetting => "goal_setting",
            Intent::Advice => "advice",
            Intent::Housing => "housing",
            Intent::Hajj => "hajj",
            Intent::SpendingCuts => "spending_cuts",
            Intent::StressSpending => "stress_spending",
            Intent::Investment => "investment",
            Intent::Zakat => "zakat",
            Intent::Budgeting => "budgeting",
            Intent::General => "general",
        };
        write!(f, "{}", s)
    }
}

/// Static keyword lists, Russian stems first. Checked in this order; the
/// first list with a hit wins.
const INTENT_KEYWORDS: &[(Intent, &[&str])] = &[
    (
        Intent::Greeting,
        &["привет", "салам", "здравств", "начать", "hello", "salam"],
    ),
    (
        Intent::GoalSetting,
        &["цель", "накопить", "сбереж", "goal", "save up"],
    ),
    (
        Intent::Advice,
        &["совет", "рекомендац", "что делать", "advice", "recommend"],
    ),
    (
        Intent::Housing,
        &["жилье", "жильё", "квартир", "дом", "housing", "apartment", "house"],
    ),
    (Intent::Hajj, &["хадж", "умра", "мекк", "hajj", "umrah", "mecca"]),
    (
        Intent::SpendingCuts,
        &["экономия", "траты", "расходы", "сэкономить", "spending", "cut costs"],
    ),
    (
        Intent::StressSpending,
        &["стресс", "нервы", "успокои", "покупк", "stress", "shopping"],
    ),
    (
        Intent::Investment,
        &["инвестиц", "вложить", "приумнож", "invest"],
    ),
    (
        Intent::Zakat,
        &["закят", "благотворительность", "садака", "zakat", "charity", "sadaqa"],
    ),
    (
        Intent::Budgeting,
        &["бюджет", "планирован", "распределен", "budget"],
    ),
];

pub struct IntentClassifier;

impl IntentClassifier {
    pub fn classify(message: &str) -> Intent {
        let text = message.to_lowercase();

        INTENT_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|kw| text.contains(kw)))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::General)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_russian_messages() {
        let cases = vec![
            ("Привет!", Intent::Greeting),
            ("Хочу накопить на машину", Intent::GoalSetting),
            ("Дай совет по финансам", Intent::Advice),
            ("Как купить квартиру?", Intent::Housing),
            ("Планирую Хадж через два года", Intent::Hajj),
            ("Как сэкономить?", Intent::SpendingCuts),
            ("У меня стресс", Intent::StressSpending),
            ("Куда вложить деньги", Intent::Investment),
            ("Сколько платить закят", Intent::Zakat),
            ("Помоги с бюджетом", Intent::Budgeting),
        ];

        for (message, expected) in cases {
            assert_eq!(IntentClassifier::classify(message), expected, "{}", message);
        }
    }

    #[test]
    fn test_first_matching_list_wins() {
        // greeting outranks hajj
        assert_eq!(
            IntentClassifier::classify("Салам, расскажи про хадж"),
            Intent::Greeting
        );
    }

    #[test]
    fn test_english_and_fallback() {
        assert_eq!(IntentClassifier::classify("How should I invest?"), Intent::Investment);
        assert_eq!(IntentClassifier::classify("zakat on gold"), Intent::Zakat);
        assert_eq!(IntentClassifier::classify("???"), Intent::General);
        assert_eq!(IntentClassifier::classify(""), Intent::General);
    }
}
