//! Derived entities: contradictions, ideal final results and solutions
//! extracted from accepted step outputs.
//!
//! Entities are recomputed from the live completed attempts whenever a step
//! completes or attempts are superseded, so they always reflect the current
//! history.

use serde::{Deserialize, Serialize};

use super::model::{StepResult, StepStatus};
use crate::registry::{Mode, StepCode};

const FORMULATION_LIMIT: usize = 2000;
const FIELD_LIMIT: usize = 255;
const DESCRIPTION_LIMIT: usize = 5000;
const RESOURCES_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContradictionKind {
    Surface,
    Deepened,
    Sharpened,
}

impl ContradictionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContradictionKind::Surface => "surface",
            ContradictionKind::Deepened => "deepened",
            ContradictionKind::Sharpened => "sharpened",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contradiction {
    pub kind: ContradictionKind,
    pub quality_a: String,
    pub quality_b: String,
    pub property_s: String,
    pub anti_property_s: String,
    pub formulation: String,
    pub source_step: StepCode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdealResult {
    /// "ИКР-1" or "ИКР-2"
    pub label: String,
    pub formulation: String,
    pub strengthened_formulation: String,
    pub resources_used: Vec<String>,
    pub source_step: StepCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolutionMethod {
    Principle,
    Standard,
    Effect,
    Analog,
    Combined,
}

impl SolutionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionMethod::Principle => "principle",
            SolutionMethod::Standard => "standard",
            SolutionMethod::Effect => "effect",
            SolutionMethod::Analog => "analog",
            SolutionMethod::Combined => "combined",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub method: SolutionMethod,
    pub title: String,
    pub description: String,
    /// Not computed here; left for reviewers
    pub novelty_score: Option<u8>,
    pub feasibility_score: Option<u8>,
    pub source_step: StepCode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedEntities {
    #[serde(default)]
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub ideal_results: Vec<IdealResult>,
    #[serde(default)]
    pub solutions: Vec<Solution>,
}

impl DerivedEntities {
    pub fn is_empty(&self) -> bool {
        self.contradictions.is_empty() && self.ideal_results.is_empty() && self.solutions.is_empty()
    }
}

/// What a step contributes, if anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Extraction {
    Contradiction(ContradictionKind),
    IdealResult { label: &'static str, strengthens: bool },
    Solution(SolutionMethod),
}

fn extractions(mode: Mode, code: &str) -> &'static [Extraction] {
    use ContradictionKind::{Deepened, Sharpened, Surface};
    use Extraction::{Contradiction as C, IdealResult as I, Solution as S};
    use SolutionMethod::{Combined, Effect, Standard};

    match (mode, code) {
        (Mode::Express, "2") => &[C(Surface)],
        (Mode::Express, "3") => &[C(Deepened)],
        (Mode::Express, "4") => &[I {
            label: "ИКР-1",
            strengthens: false,
        }],
        (Mode::Express, "5") => &[C(Sharpened)],
        (Mode::Express, "7") | (Mode::Autopilot, "auto") => &[S(Combined)],
        (Mode::Full, "1.3") => &[C(Surface)],
        (Mode::Full, "1.5") => &[C(Deepened)],
        (Mode::Full, "3.1") => &[
            C(Sharpened),
            I {
                label: "ИКР-1",
                strengthens: false,
            },
        ],
        (Mode::Full, "3.2") => &[I {
            label: "ИКР-1",
            strengthens: true,
        }],
        (Mode::Full, "3.3" | "3.4") => &[C(Sharpened)],
        (Mode::Full, "3.5") => &[I {
            label: "ИКР-2",
            strengthens: false,
        }],
        (Mode::Full, "4.3") => &[S(Standard)],
        (Mode::Full, "4.4") => &[S(Effect)],
        (Mode::Full, "4.1" | "4.2" | "4.5" | "4.7" | "4.8") => &[S(Combined)],
        _ => &[],
    }
}

/// Resource inventory step whose output feeds `resources_used`.
fn resources_step(mode: Mode) -> Option<&'static str> {
    (mode == Mode::Full).then_some("2.3")
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Rebuilds all entities from a session's attempts.
pub fn derive(mode: Mode, results: &[StepResult]) -> DerivedEntities {
    // latest completed attempt per code; superseded ones never qualify
    let live: Vec<&StepResult> = results
        .iter()
        .enumerate()
        .filter(|(_, r)| r.status == StepStatus::Completed)
        .filter(|(i, r)| {
            !results[i + 1..]
                .iter()
                .any(|later| later.step_code == r.step_code && later.status == StepStatus::Completed)
        })
        .map(|(_, r)| r)
        .collect();

    let resources: Vec<String> = resources_step(mode)
        .and_then(|code| live.iter().find(|r| r.step_code == code))
        .and_then(|r| r.validated_result.as_deref())
        .map(|text| vec![truncate(text, RESOURCES_LIMIT)])
        .unwrap_or_default();

    let mut entities = DerivedEntities::default();
    for result in live {
        let Some(text) = result.validated_result.as_deref() else {
            continue;
        };
        for extraction in extractions(mode, result.step_code.as_str()) {
            match *extraction {
                Extraction::Contradiction(kind) => {
                    let contradiction = parse_contradiction(kind, text, &result.step_code);
                    entities.contradictions.retain(|c| c.kind != kind);
                    entities.contradictions.push(contradiction);
                }
                Extraction::IdealResult { label, strengthens } => {
                    upsert_ideal_result(&mut entities, label, strengthens, text, result, &resources);
                }
                Extraction::Solution(method) => {
                    entities.solutions.push(Solution {
                        method,
                        title: solution_title(text, result),
                        description: truncate(text, DESCRIPTION_LIMIT),
                        novelty_score: None,
                        feasibility_score: None,
                        source_step: result.step_code.clone(),
                    });
                }
            }
        }
    }
    entities
}

fn upsert_ideal_result(
    entities: &mut DerivedEntities,
    label: &str,
    strengthens: bool,
    text: &str,
    result: &StepResult,
    resources: &[String],
) {
    let existing = entities.ideal_results.iter_mut().find(|i| i.label == label);
    match (existing, strengthens) {
        (Some(ideal), true) => {
            ideal.strengthened_formulation = truncate(text, FORMULATION_LIMIT);
        }
        (Some(ideal), false) => {
            ideal.formulation = truncate(text, FORMULATION_LIMIT);
            ideal.source_step = result.step_code.clone();
        }
        (None, _) => entities.ideal_results.push(IdealResult {
            label: label.to_string(),
            formulation: if strengthens {
                String::new()
            } else {
                truncate(text, FORMULATION_LIMIT)
            },
            strengthened_formulation: if strengthens {
                truncate(text, FORMULATION_LIMIT)
            } else {
                String::new()
            },
            resources_used: resources.to_vec(),
            source_step: result.step_code.clone(),
        }),
    }
}

/// Reads labelled lines ("Свойство S: ...", "ТП-1: ...") from the output.
fn parse_contradiction(kind: ContradictionKind, text: &str, code: &StepCode) -> Contradiction {
    let mut contradiction = Contradiction {
        kind,
        quality_a: String::new(),
        quality_b: String::new(),
        property_s: String::new(),
        anti_property_s: String::new(),
        formulation: truncate(text, FORMULATION_LIMIT),
        source_step: code.clone(),
    };

    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let label = label.trim().trim_matches('*').trim().to_lowercase();
        let value = truncate(value.trim().trim_start_matches('*').trim(), FIELD_LIMIT);

        if label.starts_with("анти-") || label.starts_with("anti-") {
            contradiction.anti_property_s = value;
        } else if label.starts_with("свойство") || label == "property s" {
            contradiction.property_s = value;
        } else if label == "тп-1" || label == "tp-1" {
            contradiction.quality_a = value;
        } else if label == "тп-2" || label == "tp-2" {
            contradiction.quality_b = value;
        }
    }
    contradiction
}

/// First substantive line, or a generic title naming the step.
fn solution_title(text: &str, result: &StepResult) -> String {
    text.lines()
        .map(str::trim)
        .find(|line| {
            line.chars().count() > 10
                && !["#", "```", "---", "**"]
                    .iter()
                    .any(|prefix| line.starts_with(prefix))
        })
        .map(|line| truncate(line, FIELD_LIMIT))
        .unwrap_or_else(|| format!("Решение (шаг {}: {})", result.step_code, result.step_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(code: &str, text: &str) -> StepResult {
        let mut r = StepResult::pending(StepCode::from(code), format!("step {code}"), 1);
        r.status = StepStatus::Completed;
        r.validated_result = Some(text.to_string());
        r
    }

    #[test]
    fn test_contradiction_fields_parsed() {
        let text = "**ТП-1:** толстая стенка прочная, но тяжёлая\n\
                    ТП-2: тонкая стенка лёгкая, но непрочная\n\
                    Свойство S: толстая\n\
                    Анти-свойство: тонкая";
        let entities = derive(Mode::Full, &[completed("1.3", text)]);
        assert_eq!(entities.contradictions.len(), 1);
        let c = &entities.contradictions[0];
        assert_eq!(c.kind, ContradictionKind::Surface);
        assert_eq!(c.quality_a, "толстая стенка прочная, но тяжёлая");
        assert_eq!(c.quality_b, "тонкая стенка лёгкая, но непрочная");
        assert_eq!(c.property_s, "толстая");
        assert_eq!(c.anti_property_s, "тонкая");
    }

    #[test]
    fn test_same_kind_keeps_latest_step() {
        let entities = derive(
            Mode::Full,
            &[completed("3.3", "macro"), completed("3.4", "micro")],
        );
        let sharpened: Vec<_> = entities
            .contradictions
            .iter()
            .filter(|c| c.kind == ContradictionKind::Sharpened)
            .collect();
        assert_eq!(sharpened.len(), 1);
        assert_eq!(sharpened[0].source_step, "3.4");
    }

    #[test]
    fn test_ideal_result_strengthened_and_resources() {
        let entities = derive(
            Mode::Full,
            &[
                completed("2.3", "вода, воздух, тепло"),
                completed("3.1", "Труба сама очищается"),
                completed("3.2", "Труба сама очищается без энергии"),
                completed("3.5", "Частицы сами отталкиваются"),
            ],
        );
        assert_eq!(entities.ideal_results.len(), 2);
        let ikr1 = &entities.ideal_results[0];
        assert_eq!(ikr1.label, "ИКР-1");
        assert_eq!(ikr1.formulation, "Труба сама очищается");
        assert_eq!(ikr1.strengthened_formulation, "Труба сама очищается без энергии");
        assert_eq!(ikr1.resources_used, vec!["вода, воздух, тепло".to_string()]);
        assert_eq!(entities.ideal_results[1].label, "ИКР-2");
    }

    #[test]
    fn test_solution_title() {
        let text = "# Решение\n\nУльтразвуковой излучатель на внешней стенке трубы.\nДетали...";
        let entities = derive(Mode::Express, &[completed("7", text)]);
        assert_eq!(entities.solutions.len(), 1);
        assert_eq!(
            entities.solutions[0].title,
            "Ультразвуковой излучатель на внешней стенке трубы."
        );
        assert_eq!(entities.solutions[0].method, SolutionMethod::Combined);
        assert!(entities.solutions[0].novelty_score.is_none());
    }

    #[test]
    fn test_solution_title_fallback() {
        let entities = derive(Mode::Full, &[completed("4.4", "# Эффекты\nкоротко")]);
        assert_eq!(entities.solutions[0].title, "Решение (шаг 4.4: step 4.4)");
        assert_eq!(entities.solutions[0].method, SolutionMethod::Effect);
    }

    #[test]
    fn test_non_completed_ignored() {
        let mut superseded = completed("7", "Старое решение задачи про трубу");
        superseded.status = StepStatus::Superseded;
        let mut failed = completed("2", "ПП");
        failed.status = StepStatus::Failed;
        let entities = derive(Mode::Express, &[superseded, failed]);
        assert!(entities.is_empty());
    }
}
