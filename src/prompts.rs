//! Prompt rendering for step executions.
//!
//! Built-in templates cover every step generically; a prompts directory can
//! override any step with `<prompt ref>.hbs`, e.g. `steps/full/step_1_1.hbs`,
//! or the system prompt with `system.hbs`.

use std::fs;
use std::path::Path;

use handlebars::Handlebars;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::registry::{Audience, StepDefinition};
use crate::session::Session;

const SYSTEM_TEMPLATE: &str = "system";
const DEFAULT_STEP_TEMPLATE: &str = "steps/default";
const AUTOPILOT_TEMPLATE: &str = "steps/autopilot/step_auto";

const SYSTEM_PROMPT: &str = r#"Ты опытный специалист по ТРИЗ, ведущий решение изобретательской задачи по АРИЗ.
Работай строго в рамках текущего шага и опирайся на результаты предыдущих шагов.
{{#if professional}}
Собеседник знаком с методологией: используй её терминологию.
{{else}}
Собеседник не знаком с методологией: объясняй простым языком, без специальных терминов и сокращений.
{{/if}}
Отвечай по-русски."#;

const STEP_PROMPT: &str = r#"Задача: {{problem_title}}
{{#if problem_description}}
{{problem_description}}
{{/if}}

Шаг {{step_code}}: {{step_name}}
{{#if step_description}}
{{step_description}}
{{/if}}
{{#if user_input}}

Ввод пользователя:
{{user_input}}
{{/if}}"#;

const AUTOPILOT_PROMPT: &str = r#"Задача: {{problem_title}}
{{#if problem_description}}
{{problem_description}}
{{/if}}

Самостоятельно пройди все шаги экспресс-АРИЗ: сформулируй задачу, выяви поверхностное и углублённое противоречие, сформулируй идеальный конечный результат, обостри противоречие, найди ресурсы и предложи решение.
Заверши ответ кратким описанием итогового решения.
{{#if user_input}}

Дополнительные сведения от пользователя:
{{user_input}}
{{/if}}"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("invalid template '{name}': {message}")]
    Template { name: String, message: String },

    #[error("failed to render '{name}': {message}")]
    Render { name: String, message: String },

    #[error("failed to read prompts from {path}: {message}")]
    Io { path: String, message: String },
}

/// Values available to every template.
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub mode: String,
    pub professional: bool,
    pub step_code: String,
    pub step_name: String,
    pub step_description: String,
    pub problem_title: String,
    pub problem_description: String,
    pub user_input: String,
}

impl PromptContext {
    pub fn new(session: &Session, step: &StepDefinition, user_input: &str) -> Self {
        Self {
            mode: session.mode.to_string(),
            professional: session.mode.audience() == Audience::Professional,
            step_code: step.code.to_string(),
            step_name: step.name.clone(),
            step_description: step.description.clone(),
            problem_title: session.problem.title.clone(),
            problem_description: session.problem.description.clone(),
            user_input: user_input.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
}

pub struct PromptStore {
    handlebars: Handlebars<'static>,
}

impl PromptStore {
    /// Built-in templates only.
    pub fn new() -> Result<Self, PromptError> {
        let mut handlebars = Handlebars::new();
        // prompts are plain text
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars.set_strict_mode(false);

        let mut store = Self { handlebars };
        store.register(SYSTEM_TEMPLATE, SYSTEM_PROMPT)?;
        store.register(DEFAULT_STEP_TEMPLATE, STEP_PROMPT)?;
        store.register(AUTOPILOT_TEMPLATE, AUTOPILOT_PROMPT)?;
        Ok(store)
    }

    /// Built-ins plus every `*.hbs` under `dir`, named by relative path.
    pub fn with_overrides(dir: &Path) -> Result<Self, PromptError> {
        let mut store = Self::new()?;
        let pattern = format!("{}/**/*.hbs", dir.display());
        let io_error = |message: String| PromptError::Io {
            path: dir.display().to_string(),
            message,
        };

        let paths = glob::glob(&pattern).map_err(|e| io_error(e.to_string()))?;
        for path in paths.flatten() {
            let Ok(relative) = path.strip_prefix(dir) else {
                continue;
            };
            let name = relative
                .with_extension("")
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let source = fs::read_to_string(&path).map_err(|e| io_error(e.to_string()))?;
            store.register(&name, &source)?;
            debug!(template = %name, "Registered prompt override");
        }
        Ok(store)
    }

    fn register(&mut self, name: &str, source: &str) -> Result<(), PromptError> {
        self.handlebars
            .register_template_string(name, source)
            .map_err(|e| PromptError::Template {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    pub fn has_override(&self, prompt_ref: &str) -> bool {
        self.handlebars.has_template(prompt_ref)
    }

    /// Renders the system and step prompts for one execution.
    pub fn render(
        &self,
        step: &StepDefinition,
        context: &PromptContext,
    ) -> Result<RenderedPrompt, PromptError> {
        let step_template = if self.has_override(&step.prompt) {
            step.prompt.as_str()
        } else {
            DEFAULT_STEP_TEMPLATE
        };
        Ok(RenderedPrompt {
            system: self.render_one(SYSTEM_TEMPLATE, context)?,
            user: self.render_one(step_template, context)?,
        })
    }

    fn render_one(&self, name: &str, context: &PromptContext) -> Result<String, PromptError> {
        self.handlebars
            .render(name, context)
            .map(|text| text.trim().to_string())
            .map_err(|e| PromptError::Render {
                name: name.to_string(),
                message: e.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Mode, StepCode, StepRegistry};
    use crate::session::Problem;
    use tempfile::TempDir;

    fn session(mode: Mode) -> Session {
        Session::new(
            mode,
            Problem {
                title: "Трубы зарастают накипью".into(),
                description: "Промывка требует остановки линии.".into(),
            },
            StepCode::from("1"),
            None,
        )
    }

    #[test]
    fn test_default_step_prompt() {
        let registry = StepRegistry::builtin().unwrap();
        let step = registry.get_step(Mode::Express, "1").unwrap();
        let store = PromptStore::new().unwrap();

        let context = PromptContext::new(&session(Mode::Express), step, "Ищем способ без остановки");
        let prompt = store.render(step, &context).unwrap();

        assert!(prompt.user.contains("Трубы зарастают накипью"));
        assert!(prompt.user.contains("Шаг 1:"));
        assert!(prompt.user.contains("Ищем способ без остановки"));
        assert!(prompt.system.contains("простым языком"));
    }

    #[test]
    fn test_professional_system_prompt() {
        let registry = StepRegistry::builtin().unwrap();
        let step = registry.get_step(Mode::Full, "1.1").unwrap();
        let store = PromptStore::new().unwrap();

        let prompt = store
            .render(step, &PromptContext::new(&session(Mode::Full), step, ""))
            .unwrap();
        assert!(prompt.system.contains("терминологию"));
        assert!(!prompt.user.contains("Ввод пользователя"));
    }

    #[test]
    fn test_autopilot_has_own_template() {
        let registry = StepRegistry::builtin().unwrap();
        let step = registry.get_step(Mode::Autopilot, "auto").unwrap();
        let store = PromptStore::new().unwrap();
        assert!(store.has_override(&step.prompt));

        let prompt = store
            .render(step, &PromptContext::new(&session(Mode::Autopilot), step, ""))
            .unwrap();
        assert!(prompt.user.contains("экспресс-АРИЗ"));
    }

    #[test]
    fn test_directory_override() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("steps").join("express");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("step_2.hbs"), "Custom {{step_code}} <{{problem_title}}>").unwrap();

        let registry = StepRegistry::builtin().unwrap();
        let step = registry.get_step(Mode::Express, "2").unwrap();
        let store = PromptStore::with_overrides(temp_dir.path()).unwrap();

        let prompt = store
            .render(step, &PromptContext::new(&session(Mode::Express), step, ""))
            .unwrap();
        assert_eq!(prompt.user, "Custom 2 <Трубы зарастают накипью>");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("system.hbs"), "{{#if}}broken").unwrap();
        assert!(matches!(
            PromptStore::with_overrides(temp_dir.path()),
            Err(PromptError::Template { .. })
        ));
    }
}
