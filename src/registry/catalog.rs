//! Built-in step tables.

use super::{Mode, PartDefinition, StepDefinition};
use crate::validators::ValidatorKind::{
    ConflictCheck, ContradictionCheck, FalsenessCheck, IkrCheck, TermsCheck,
};

/// Output budget for the single-shot synthesis step.
const AUTOPILOT_MAX_TOKENS: u32 = 8192;

pub(super) fn steps(mode: Mode) -> Vec<StepDefinition> {
    match mode {
        Mode::Express => express(),
        Mode::Full => full(),
        Mode::Autopilot => autopilot(),
    }
}

pub(super) fn parts(mode: Mode) -> Vec<PartDefinition> {
    match mode {
        Mode::Full => [
            (1, "Анализ задачи"),
            (2, "Анализ ресурсов"),
            (3, "Определение ИКР и ФП"),
            (4, "Получение решения"),
        ]
        .into_iter()
        .map(|(number, name)| PartDefinition {
            number,
            name: name.to_string(),
        })
        .collect(),
        Mode::Express | Mode::Autopilot => Vec::new(),
    }
}

fn express() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("1", "Формулировка задачи", "steps/express/step_1")
            .describe("Описание проблемы и проверка на ложность задачи.")
            .validate_with(&[FalsenessCheck]),
        StepDefinition::new("2", "Поверхностное противоречие", "steps/express/step_2")
            .describe("Выявление поверхностного противоречия без спецтерминов.")
            .validate_with(&[TermsCheck]),
        StepDefinition::new("3", "Углублённое противоречие", "steps/express/step_3")
            .describe("Формулировка углублённого противоречия.")
            .validate_with(&[ContradictionCheck]),
        StepDefinition::new("4", "Идеальный конечный результат", "steps/express/step_4")
            .describe("Формулировка идеального конечного результата.")
            .validate_with(&[IkrCheck]),
        StepDefinition::new("5", "Обострённое противоречие", "steps/express/step_5")
            .describe("Формулировка обострённого противоречия.")
            .validate_with(&[ConflictCheck]),
        StepDefinition::new("6", "Углубление ОП", "steps/express/step_6")
            .describe("Углубление обострённого противоречия."),
        StepDefinition::new("7", "Решение", "steps/express/step_7")
            .describe("Генерация решения на основе приёмов, эффектов и стандартов."),
    ]
}

fn full() -> Vec<StepDefinition> {
    let step = |code: &str, name: &str, description: &str| {
        let prompt = format!("steps/full/step_{}", code.replace('.', "_"));
        StepDefinition::new(code, name, &prompt).describe(description)
    };

    vec![
        // Part 1
        step("1.1", "Мини-задача", "Условие мини-задачи без специальных терминов.")
            .validate_with(&[FalsenessCheck]),
        step("1.2", "Конфликтующая пара", "Изделие и инструмент.")
            .validate_with(&[TermsCheck]),
        step("1.3", "Графические схемы ТП-1 и ТП-2", "Схемы технических противоречий.")
            .validate_with(&[ContradictionCheck]),
        step("1.4", "Выбор схемы конфликта", "Схема, обеспечивающая главную функцию."),
        step("1.5", "Усиление конфликта", "Предельное состояние элементов.")
            .validate_with(&[ConflictCheck]),
        step("1.6", "Модель задачи", "Формулировка модели задачи."),
        step("1.7", "Применение стандартов", "Проверка применимости стандартов."),
        // Part 2
        step("2.1", "Оперативная зона", "Пространство, в котором возникает конфликт."),
        step("2.2", "Оперативное время", "Время до и во время конфликта."),
        step("2.3", "Вещественно-полевые ресурсы", "Доступные ресурсы системы и среды."),
        // Part 3
        step("3.1", "Формулировка ИКР-1", "Идеальный конечный результат.")
            .validate_with(&[IkrCheck]),
        step("3.2", "Усиление ИКР-1", "Усиленная формулировка ИКР-1."),
        step("3.3", "Макро-уровень ФП", "Физическое противоречие на макро-уровне."),
        step("3.4", "Микро-уровень ФП", "Физическое противоречие на микро-уровне."),
        step("3.5", "Формулировка ИКР-2", "ИКР на уровне частиц.")
            .validate_with(&[IkrCheck]),
        step("3.6", "Проверка ФП", "Возможность устранения ФП стандартами."),
        // Part 4
        step("4.1", "Метод ММЧ", "Моделирование маленькими человечками."),
        step("4.2", "Шаг назад от ИКР", "Отступление от идеального результата."),
        step("4.3", "Применение стандартов (повторно)", "Стандарты решения задач."),
        step("4.4", "Применение эффектов", "Физические, химические и геометрические эффекты."),
        step("4.5", "Использование ресурсов", "Применение выявленных ВПР."),
        step("4.6", "Изменение задачи", "Переформулировка, если задача не решена."),
        step("4.7", "Проверка решения", "Проверка решения по критериям."),
        step("4.8", "Применение решения", "Применимость и масштабирование решения."),
    ]
}

fn autopilot() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("auto", "Автопилот", "steps/autopilot/step_auto")
            .describe("Полный краткий разбор задачи за один проход.")
            .max_output_tokens(AUTOPILOT_MAX_TOKENS),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_parts_cover_all_steps() {
        let parts = parts(Mode::Full);
        assert_eq!(parts.len(), 4);
        for step in full() {
            let part = step.code.part().unwrap();
            assert!(parts.iter().any(|p| p.number == part), "{}", step.code);
        }
    }

    #[test]
    fn test_full_prompt_references() {
        let steps = full();
        assert_eq!(steps[0].prompt, "steps/full/step_1_1");
        assert_eq!(steps[23].prompt, "steps/full/step_4_8");
    }

    #[test]
    fn test_autopilot_output_budget() {
        let steps = autopilot();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].max_output_tokens, Some(8192));
        assert!(steps[0].validators.is_empty());
    }
}
