//! Built-in validation rules.
//!
//! Markers are matched case-insensitively as substrings, except methodology
//! abbreviations, which must appear as whole upper-case words.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Rejection, StepContext, Validator, ValidatorKind, Verdict};
use crate::registry::Audience;

fn char_len(text: &str) -> usize {
    text.trim().chars().count()
}

fn contains_any<'m>(text: &str, markers: &[&'m str]) -> Vec<&'m str> {
    let lower = text.to_lowercase();
    markers
        .iter()
        .copied()
        .filter(|m| lower.contains(&m.to_lowercase()))
        .collect()
}

fn verdict(kind: ValidatorKind, text: &str, issues: Vec<String>, suggestions: &[&str]) -> Verdict {
    if issues.is_empty() {
        Verdict::Accept {
            text: text.to_string(),
        }
    } else {
        Verdict::Reject(Rejection {
            validator: kind,
            issues,
            suggestions: suggestions.iter().map(|s| (*s).to_string()).collect(),
        })
    }
}

/// Rejects problem statements that look trivial, solved or non-existent.
pub struct FalsenessCheck;

impl FalsenessCheck {
    const MIN_LEN: usize = 50;
    const MARKERS: &'static [&'static str] = &[
        "простое решение",
        "уже решена",
        "не существует",
        "очевидно",
        "тривиально",
        "стандартное решение",
    ];
}

impl Validator for FalsenessCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::FalsenessCheck
    }

    fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
        let mut issues = Vec::new();
        if char_len(text) < Self::MIN_LEN {
            issues.push(format!(
                "Формулировка задачи слишком короткая (менее {} символов).",
                Self::MIN_LEN
            ));
        }
        for marker in contains_any(text, Self::MARKERS) {
            issues.push(format!(
                "Обнаружен индикатор ложности: '{marker}'. Проверьте, не является ли задача ложной."
            ));
        }
        verdict(
            self.kind(),
            text,
            issues,
            &[
                "Переформулируйте задачу, убрав указания на тривиальность.",
                "Убедитесь, что задача не решается стандартными методами.",
            ],
        )
    }
}

/// Rejects methodology jargon in output meant for a lay audience.
pub struct TermsCheck;

impl TermsCheck {
    const TERMS: &'static [&'static str] = &[
        "вепольный",
        "веполь",
        "полисистема",
        "моносистема",
        "бисистема",
        "антисистема",
        "суперсистема",
        "оператор РВС",
        "метод ММЧ",
    ];
}

static ABBREVIATIONS: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"\b(ИКР|ОП|УП|ПП|ГФ|ТП|ФП)\b").ok());

impl Validator for TermsCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::TermsCheck
    }

    fn check(&self, ctx: &StepContext<'_>, text: &str) -> Verdict {
        if ctx.audience == Audience::Professional {
            return Verdict::Accept {
                text: text.to_string(),
            };
        }

        let mut found: Vec<String> = contains_any(text, Self::TERMS)
            .into_iter()
            .map(str::to_string)
            .collect();
        if let Some(re) = ABBREVIATIONS.as_ref() {
            for m in re.find_iter(text) {
                if !found.iter().any(|f| f == m.as_str()) {
                    found.push(m.as_str().to_string());
                }
            }
        }

        if found.is_empty() {
            return Verdict::Accept {
                text: text.to_string(),
            };
        }

        Verdict::Reject(Rejection {
            validator: self.kind(),
            issues: vec![format!(
                "Обнаружены специальные термины: {}. Их нужно заменить простым описанием.",
                found.join(", ")
            )],
            suggestions: found
                .iter()
                .take(5)
                .map(|term| format!("Замените '{term}' описанием его сути простым языком."))
                .collect(),
        })
    }
}

/// Requires two opposing requirements to the same element.
pub struct ContradictionCheck;

impl ContradictionCheck {
    const MIN_LEN: usize = 30;
    const MARKERS: &'static [&'static str] = &[
        "но при этом",
        "однако",
        "с одной стороны",
        "с другой стороны",
        "если увеличить",
        "если уменьшить",
        "должен быть",
        "не должен быть",
        "необходимо",
        "невозможно",
    ];
}

impl Validator for ContradictionCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::ContradictionCheck
    }

    fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
        let mut issues = Vec::new();
        if contains_any(text, Self::MARKERS).is_empty() {
            issues.push(
                "Формулировка не содержит явного противоречия: нужны два противоположных требования к одному элементу."
                    .to_string(),
            );
        }
        if char_len(text) < Self::MIN_LEN {
            issues.push("Формулировка противоречия слишком короткая.".to_string());
        }
        verdict(
            self.kind(),
            text,
            issues,
            &["Формат: 'Элемент X должен быть A, чтобы ..., и должен быть не-A, чтобы ...'."],
        )
    }
}

/// Requires the conflict to be pushed to a limiting state.
pub struct ConflictCheck;

impl ConflictCheck {
    const MARKERS: &'static [&'static str] = &[
        "абсолютно",
        "полностью",
        "максимально",
        "предельно",
        "бесконечно",
        "нулевой",
        "идеально",
    ];
}

impl Validator for ConflictCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::ConflictCheck
    }

    fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
        let issues = if contains_any(text, Self::MARKERS).is_empty() {
            vec!["Конфликт не доведён до предельного состояния.".to_string()]
        } else {
            Vec::new()
        };
        verdict(
            self.kind(),
            text,
            issues,
            &["Доведите требования до предельных значений: 'абсолютно', 'полностью', 'максимально'."],
        )
    }
}

/// Requires an instrument acting on a product.
pub struct FunctionCheck;

impl FunctionCheck {
    const MIN_LEN: usize = 20;
    const ACTIONS: &'static [&'static str] = &[
        "перемещает",
        "нагревает",
        "охлаждает",
        "удерживает",
        "разделяет",
        "соединяет",
        "измеряет",
        "обрабатывает",
        "передаёт",
        "преобразует",
        "защищает",
        "разрушает",
    ];
}

impl Validator for FunctionCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::FunctionCheck
    }

    fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
        let mut issues = Vec::new();
        if char_len(text) < Self::MIN_LEN {
            issues.push("Формулировка функции слишком короткая.".to_string());
        }
        if contains_any(text, Self::ACTIONS).is_empty() {
            issues.push("Формулировка функции не содержит явного действия.".to_string());
        }
        verdict(
            self.kind(),
            text,
            issues,
            &["Формат: '[Инструмент] [действие] [Изделие]', например 'Резец обрабатывает деталь'."],
        )
    }
}

/// Requires the ideal result to happen "by itself".
pub struct IkrCheck;

impl IkrCheck {
    const MIN_LEN: usize = 30;
    const MARKERS: &'static [&'static str] = &[
        "само",
        "сам",
        "самостоятельно",
        "без",
        "не требует",
        "автоматически",
        "идеально",
    ];
}

impl Validator for IkrCheck {
    fn kind(&self) -> ValidatorKind {
        ValidatorKind::IkrCheck
    }

    fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
        let mut issues = Vec::new();
        if contains_any(text, Self::MARKERS).is_empty() {
            issues.push(
                "Формулировка ИКР не указывает, что элемент сам выполняет нужную функцию."
                    .to_string(),
            );
        }
        if char_len(text) < Self::MIN_LEN {
            issues.push("Формулировка ИКР слишком короткая.".to_string());
        }
        verdict(
            self.kind(),
            text,
            issues,
            &["Формат: 'Элемент X сам устраняет вредное действие, сохраняя полезное'."],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Mode, StepCode};

    fn run(validator: &dyn Validator, mode: Mode, text: &str) -> Verdict {
        let code = StepCode::from("1");
        validator.check(&StepContext::new(mode, &code), text)
    }

    fn rejected(verdict: &Verdict) -> bool {
        matches!(verdict, Verdict::Reject(_))
    }

    #[test]
    fn test_falseness_short_text() {
        assert!(rejected(&run(&FalsenessCheck, Mode::Express, "Коротко.")));
    }

    #[test]
    fn test_falseness_marker() {
        let text = "Задача тривиально решается установкой второго насоса, это очевидно любому инженеру.";
        match run(&FalsenessCheck, Mode::Express, text) {
            Verdict::Reject(r) => assert_eq!(r.issues.len(), 2),
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_falseness_accepts_real_problem() {
        let text = "Трубопровод забивается отложениями, и промывка требует остановки линии на сутки.";
        assert!(!rejected(&run(&FalsenessCheck, Mode::Express, text)));
    }

    #[test]
    fn test_terms_rejects_jargon_for_lay_audience() {
        let text = "Построим веполь и сформулируем ИКР для системы.";
        match run(&TermsCheck, Mode::Express, text) {
            Verdict::Reject(r) => {
                assert!(r.issues[0].contains("веполь"));
                assert!(r.issues[0].contains("ИКР"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_terms_ignores_abbreviation_inside_words() {
        let text = "Опыт показывает, что оператор справляется с задачей.";
        assert!(!rejected(&run(&TermsCheck, Mode::Express, text)));
    }

    #[test]
    fn test_terms_skipped_for_professionals() {
        let text = "Построим веполь и сформулируем ИКР.";
        assert!(!rejected(&run(&TermsCheck, Mode::Full, text)));
    }

    #[test]
    fn test_contradiction_check() {
        let good = "Стенка должен быть толстой для прочности, однако тонкой для лёгкости.";
        assert!(!rejected(&run(&ContradictionCheck, Mode::Express, good)));
        let bad = "Стенка толстая и прочная, вес не важен совсем для этой задачи.";
        assert!(rejected(&run(&ContradictionCheck, Mode::Express, bad)));
    }

    #[test]
    fn test_conflict_check_case_insensitive() {
        assert!(!rejected(&run(&ConflictCheck, Mode::Express, "Вес АБСОЛЮТНО нулевой.")));
        assert!(rejected(&run(&ConflictCheck, Mode::Express, "Вес немного меньше.")));
    }

    #[test]
    fn test_function_check() {
        assert!(!rejected(&run(&FunctionCheck, Mode::Full, "Резец обрабатывает деталь на станке.")));
        assert!(rejected(&run(&FunctionCheck, Mode::Full, "Резец и деталь на станке рядом.")));
    }

    #[test]
    fn test_ikr_check() {
        let good = "Отложения сами удаляются из трубы без остановки линии.";
        assert!(!rejected(&run(&IkrCheck, Mode::Express, good)));
        assert!(rejected(&run(&IkrCheck, Mode::Express, "Чистая труба.")));
    }

    #[test]
    fn test_accept_preserves_text() {
        let text = "Отложения сами удаляются из трубы без остановки линии.";
        assert_eq!(
            run(&IkrCheck, Mode::Express, text),
            Verdict::Accept {
                text: text.to_string()
            }
        );
    }
}
