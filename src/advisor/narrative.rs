//! Deterministic Russian-language narratives
//!
//! Used when the remote model is unavailable, and for the fixed parts of
//! plans and spending analyses.

use crate::classifier::Intent;
use crate::models::{BudgetCategory, FinancialGoal, GoalCategory, UserProfile};

use super::ContextBundle;

pub const COULD_NOT_TRANSCRIBE_REPLY: &str =
    "Не удалось распознать речь. Пожалуйста, повторите запрос или напишите сообщение.";

const ISLAMIC_PRINCIPLES: &str = "Принципы исламских финансов:
1. Запрет риба (процентов)
2. Запрет гарар (чрезмерной неопределенности)
3. Запрет майсир (азартных игр и спекуляций)
4. Реальная экономическая деятельность
5. Справедливое разделение прибыли и убытков

Разрешенные инструменты: Мурабаха, Мудараба, Мушарака, Иджара, Салам, Истисна, Вадиа.
Закят: 2.5% от сбережений выше нисаба. Садака: добровольная благотворительность.";

/// 1234567.8 -> "1 234 568"
pub fn format_money(amount: f64) -> String {
    let rounded = amount.round();
    let digits = format!("{:.0}", rounded.abs());

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    if rounded < 0.0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// System instruction for the remote model: principles, client profile and
/// the numeric context bundle.
pub fn system_instruction(profile: &UserProfile, bundle_json: &str) -> String {
    format!(
        "Вы исламский финансовый консультант банка. Отвечайте на русском языке, \
         дружелюбно и конкретно, опираясь на цифры клиента.\n\n\
         {}\n\n\
         Клиент:\n\
         Имя: {}\n\
         Возраст: {}\n\
         Риск-профиль: {:?}\n\
         Знание исламских финансов: {:?}\n\
         Размер семьи: {}\n\
         Валюта: {}\n\n\
         Расчеты (JSON):\n{}\n\n\
         Верните JSON-документ вида \
         {{\"response\": \"текст ответа\", \"recommendations\": [\"короткий совет\", ...]}}.",
        ISLAMIC_PRINCIPLES,
        profile.display_name(),
        profile.age,
        profile.risk_profile,
        profile.islamic_knowledge,
        profile.family_size,
        profile.currency,
        bundle_json
    )
}

/// Template reply for an intent
pub fn render(
    intent: Intent,
    profile: &UserProfile,
    goals: &[FinancialGoal],
    bundle: &ContextBundle,
) -> String {
    let name = profile.display_name();
    let cur = profile.currency_symbol();
    let income = profile.monthly_income;
    let expenses = profile.monthly_expenses;
    let money = |amount: f64| format!("{} {}", format_money(amount), cur);
    let budget = |category: BudgetCategory| {
        bundle
            .metrics
            .recommended_budget
            .get(&category)
            .copied()
            .unwrap_or(0.0)
    };

    match intent {
        Intent::Greeting => format!(
            "Ассаламу алейкум, {}! Я ваш персональный исламский финансовый помощник. \
             Ваш доход {} в месяц. Чем могу помочь с финансами в соответствии с принципами ислама?",
            name,
            money(income)
        ),

        Intent::GoalSetting if !goals.is_empty() => {
            let names: Vec<&str> = goals.iter().take(3).map(|g| g.goal_name.as_str()).collect();
            let total: f64 = goals.iter().map(|g| g.target_amount).sum();
            let monthly: f64 = bundle.savings_plan.total_required;
            format!(
                "{}, работаем над вашими целями: {}.\n\n\
                 Общая сумма целей: {}\n\
                 Для их достижения в рамках исламских финансов:\n\n\
                 1. Сберегательный счет Мудараба для накоплений\n\
                 2. Регулярные отчисления {} в месяц\n\
                 3. Планирование сроков для каждой цели\n\n\
                 Какую цель обсудим первой?",
                name,
                names.join(", "),
                money(total),
                money(monthly.max(budget(BudgetCategory::Savings)))
            )
        }
        Intent::GoalSetting => format!(
            "{}, давайте поставим финансовые цели! Какую сумму хотите накопить и за какой срок? \
             В исламских финансах мы используем только дозволенные инструменты.",
            name
        ),

        Intent::Advice => format!(
            "{}, вот персональные рекомендации:\n\n\
             Доход: {}, расходы: {}, сбережения: {} в месяц.\n\n\
             1. Основные нужды: {} (сейчас {})\n\
             2. Сбережения: {} через счет Мудараба с участием в прибыли\n\
             3. Инвестиции: {} в реальный сектор, например через Мушарака\n\
             4. Закят и садака: {} в месяц",
            name,
            money(income),
            money(expenses),
            money(bundle.metrics.monthly_savings),
            money(budget(BudgetCategory::Essential)),
            money(expenses),
            money(budget(BudgetCategory::Savings)),
            money(budget(BudgetCategory::Investment)),
            money(budget(BudgetCategory::Charity))
        ),

        Intent::Housing => match goals.iter().find(|g| g.category == GoalCategory::Housing) {
            Some(goal) => {
                let monthly = goal.monthly_saving();
                format!(
                    "{}, для покупки жилья за {}:\n\n\
                     План на {} мес.: откладывайте {} в месяц ({} от дохода).\n\n\
                     1. Мурабаха Жилье: финансирование без процентов\n\
                     2. Поэтапное накопление через Мудараба\n\
                     3. Вариант с партнерством (Мушарака)\n\n\
                     Рекомендую начать с {} в месяц.",
                    name,
                    money(goal.target_amount),
                    goal.timeline_months,
                    money(monthly),
                    share_of_income(monthly, income),
                    money(monthly.max(budget(BudgetCategory::Investment)))
                )
            }
            None => format!(
                "{}, для покупки жилья рекомендую программу Мурабаха Жилье: финансирование без процентов. \
                 Какая сумма нужна и за какой срок планируете покупку?",
                name
            ),
        },

        Intent::Hajj => match goals.iter().find(|g| g.category == GoalCategory::Hajj) {
            Some(goal) => {
                let monthly = goal.monthly_saving();
                format!(
                    "{}, для благородной цели Хаджа:\n\n\
                     Цель: {} за {} мес., ежемесячно {} ({} от дохода).\n\n\
                     1. Откройте целевой счет Мудараба\n\
                     2. Автоматизируйте переводы\n\
                     3. Участвуйте в благотворительности во время подготовки\n\n\
                     ИншаАллах, ваше намерение будет принято!",
                    name,
                    money(goal.target_amount),
                    goal.timeline_months,
                    money(monthly),
                    share_of_income(monthly, income)
                )
            }
            None => format!(
                "{}, для накопления на Хадж рекомендую начать с {} в месяц. \
                 Хотите поставить эту цель?",
                name,
                money(budget(BudgetCategory::Investment).max(62_500.0))
            ),
        },

        Intent::SpendingCuts => {
            let potential = expenses * 0.15;
            format!(
                "{}, ваши расходы {} в месяц.\n\n\
                 Потенциал экономии: {} в месяц ({} в год).\n\n\
                 1. Питание: готовьте дома и планируйте меню на неделю\n\
                 2. Транспорт: общественный транспорт и совместные поездки\n\
                 3. Развлечения: семейные вечера вместо ресторанов, избегайте исрафа",
                name,
                money(expenses),
                money(potential),
                money(potential * 12.0)
            )
        }

        Intent::StressSpending => format!(
            "{}, вместо покупок от стресса попробуйте:\n\n\
             • Намаз, дуа и зикр для спокойствия души\n\
             • Время с семьей и помощь родителям\n\
             • Спорт, прогулки и изучение новых навыков\n\
             • Волонтерство и помощь другим\n\n\
             Эти занятия дают долгое удовлетворение вместо короткой радости от покупки.",
            name
        ),

        Intent::Investment => {
            let available = budget(BudgetCategory::Investment);
            format!(
                "{}, для инвестиций по шариату доступно {} в месяц.\n\n\
                 1. Мудараба: участие в прибыли банка, от {}\n\
                 2. Мушарака: совместное предприятие с разделением прибыли и убытков, от {}\n\
                 3. Мурабаха: торговое финансирование с фиксированной наценкой, от {}\n\n\
                 Начните с Мудараба на {} в месяц.",
                name,
                money(available),
                money((available * 3.0).max(50_000.0)),
                money((available * 12.0).max(500_000.0)),
                money((available * 6.0).max(100_000.0)),
                money(available)
            )
        }

        Intent::Zakat => format!(
            "{}, по вашему доходу {} в месяц:\n\n\
             Годовой закят: {}, ежемесячно {}.\n\n\
             1. Выплачивайте ежегодно одной суммой или ежемесячно\n\
             2. Направляйте близким в нужде, мечети или благотворительным фондам\n\
             3. Рамадан приносит большее воздаяние\n\n\
             Кроме закята регулярная садака очищает имущество и приносит баракат.",
            name,
            money(income),
            money(bundle.zakat_annual),
            money(bundle.zakat_monthly)
        ),

        Intent::Budgeting => {
            let lines: Vec<String> = BudgetCategory::ALL
                .iter()
                .enumerate()
                .map(|(i, c)| format!("{}. {}: {}", i + 1, c.label(), money(budget(*c))))
                .collect();
            format!(
                "{}, бюджет по исламским принципам при доходе {} в месяц:\n\n{}\n\n\
                 Этот баланс обеспечит успех в дунье и ахирате!",
                name,
                money(income),
                lines.join("\n")
            )
        }

        Intent::General => {
            let total: f64 = goals.iter().map(|g| g.target_amount).sum();
            format!(
                "Ассаламу алейкум, {}!\n\n\
                 Возраст: {}, доход: {} в месяц, активных целей: {} на сумму {}.\n\n\
                 1. Оптимизируйте расходы {} для увеличения сбережений\n\
                 2. Откладывайте на цели {} в месяц\n\
                 3. Рассмотрите Мудараба на {} в месяц\n\
                 4. Выделяйте {} на закят\n\n\
                 Чем конкретно могу помочь?",
                name,
                profile.age,
                money(income),
                goals.len(),
                money(total),
                money(expenses),
                money(bundle.savings_plan.total_required.max(budget(BudgetCategory::Savings))),
                money(budget(BudgetCategory::Investment)),
                money(budget(BudgetCategory::Charity))
            )
        }
    }
}

fn share_of_income(amount: f64, income: f64) -> String {
    if income > 0.0 {
        format!("{:.1}%", amount / income * 100.0)
    } else {
        "н/д".to_string()
    }
}

/// Plan recommendations around the canonical budget
pub fn plan_recommendations(profile: &UserProfile, bundle: &ContextBundle, goal_count: usize) -> Vec<String> {
    let cur = profile.currency_symbol();
    let budget = &bundle.metrics.recommended_budget;
    let get = |c: BudgetCategory| budget.get(&c).copied().unwrap_or(0.0);

    vec![
        format!(
            "Оптимизируйте расходы с {} {} до {} {}",
            format_money(profile.monthly_expenses),
            cur,
            format_money(get(BudgetCategory::Essential)),
            cur
        ),
        format!(
            "Целевые сбережения: {} {} в месяц для {} целей",
            format_money(bundle.savings_plan.total_required),
            cur,
            goal_count
        ),
        format!(
            "Инвестируйте {} {} в месяц в реальный сектор",
            format_money(get(BudgetCategory::Investment)),
            cur
        ),
        format!(
            "Выделяйте {} {} в месяц на закят",
            format_money(get(BudgetCategory::Charity)),
            cur
        ),
    ]
}

pub fn timeline_analysis(profile: &UserProfile, goals: &[FinancialGoal], feasible: bool) -> String {
    let longest = goals.iter().map(|g| g.timeline_months).max().unwrap_or(0);
    let outlook = if feasible {
        "текущих сбережений достаточно для всех целей"
    } else {
        "сбережений пока не хватает на все цели, приоритетные цели финансируются первыми"
    };
    format!(
        "В {} лет у вас хороший потенциал для роста. С доходом {} {} {}; \
         самая длинная цель рассчитана на {} мес.",
        profile.age,
        format_money(profile.monthly_income),
        profile.currency_symbol(),
        outlook,
        longest
    )
}

pub fn islamic_recommendations(profile: &UserProfile) -> Vec<String> {
    vec![
        format!(
            "Выделяйте {} {} на закят ежемесячно",
            format_money(profile.monthly_income * 0.025),
            profile.currency_symbol()
        ),
        "Избегайте излишеств (исраф) в расходах на развлечения".to_string(),
        "Инвестируйте в реальный сектор экономики вместо спекуляций".to_string(),
    ]
}

pub fn charity_suggestions(profile: &UserProfile) -> Vec<String> {
    vec![
        format!(
            "Регулярная садака от {} {} в месяц",
            format_money(profile.monthly_income * 0.01),
            profile.currency_symbol()
        ),
        "Поддержка местных мечетей и исламских учебных заведений".to_string(),
        "Помощь нуждающимся членам общины".to_string(),
    ]
}

pub fn stress_alternatives() -> Vec<String> {
    [
        "Намаз и дуа для духовного успокоения",
        "Чтение Корана и исламской литературы",
        "Семейное время и общение с близкими",
        "Прогулки на природе и физическая активность",
        "Волонтерство и помощь другим",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(0.0), "0");
        assert_eq!(format_money(999.4), "999");
        assert_eq!(format_money(1_000.0), "1 000");
        assert_eq!(format_money(1_234_567.8), "1 234 568");
        assert_eq!(format_money(-75_000.0), "-75 000");
    }

    #[test]
    fn test_system_instruction_embeds_bundle() {
        let profile = UserProfile {
            name: Some("Асан".to_string()),
            monthly_income: 300_000.0,
            monthly_expenses: 200_000.0,
            age: 28,
            risk_profile: Default::default(),
            islamic_knowledge: Default::default(),
            family_size: 1,
            currency: "KZT".to_string(),
        };
        let text = system_instruction(&profile, "{\"savings_rate\":0.33}");
        assert!(text.contains("Имя: Асан"));
        assert!(text.contains("savings_rate"));
        assert!(text.contains("\"recommendations\""));
    }
}
