//! Step registry: the ordered, mode-keyed table of step definitions.
//!
//! The registry is built once at startup and shared read-only
//! (`Arc<StepRegistry>`) with the state machine, the gateway and the REST
//! layer. Steps are kept in canonical [`StepCode`] order; every other component
//! asks [`ModeStrategy`] for sequencing instead of re-deriving it.

mod catalog;
mod code;
mod strategy;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validators::ValidatorKind;

pub use code::StepCode;
pub use strategy::ModeStrategy;

/// Errors raised when a mode or step code is not present in the registry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown mode '{0}'")]
    UnknownMode(String),

    #[error("unknown step '{code}' for mode '{mode}'")]
    UnknownStep { mode: Mode, code: String },

    #[error("duplicate step '{code}' for mode '{mode}'")]
    DuplicateStep { mode: Mode, code: String },

    #[error("mode '{0}' has no steps")]
    EmptyMode(Mode),
}

/// Step-sequencing variant selected once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Short fixed sequence
    Express,
    /// Long multi-part sequence
    Full,
    /// Single synthetic step covering the whole express sequence
    Autopilot,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Express => "express",
            Mode::Full => "full",
            Mode::Autopilot => "autopilot",
        }
    }

    /// Audience the mode is written for. Drives audience-sensitive validators.
    pub fn audience(&self) -> Audience {
        match self {
            Mode::Full => Audience::Professional,
            Mode::Express | Mode::Autopilot => Audience::Lay,
        }
    }

    pub fn all() -> &'static [Mode] {
        &[Mode::Express, Mode::Full, Mode::Autopilot]
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "express" => Ok(Mode::Express),
            "full" => Ok(Mode::Full),
            "autopilot" => Ok(Mode::Autopilot),
            other => Err(RegistryError::UnknownMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Plain language, no methodology jargon
    Lay,
    /// Methodology terminology expected
    Professional,
}

/// One registry entry. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    pub code: StepCode,
    pub name: String,
    pub description: String,
    /// Template reference, e.g. `steps/full/step_1_1`
    pub prompt: String,
    /// Applied in order; first failure wins
    pub validators: Vec<ValidatorKind>,
    /// Overrides the configured output budget for this step
    pub max_output_tokens: Option<u32>,
}

impl StepDefinition {
    pub fn new(code: &str, name: &str, prompt: &str) -> Self {
        Self {
            code: StepCode::from(code),
            name: name.to_string(),
            description: String::new(),
            prompt: prompt.to_string(),
            validators: Vec::new(),
            max_output_tokens: None,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn validate_with(mut self, validators: &[ValidatorKind]) -> Self {
        self.validators = validators.to_vec();
        self
    }

    pub fn max_output_tokens(mut self, tokens: u32) -> Self {
        self.max_output_tokens = Some(tokens);
        self
    }
}

/// A named group of steps in a multi-part mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartDefinition {
    pub number: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
struct ModeCatalog {
    steps: Vec<StepDefinition>,
    parts: Vec<PartDefinition>,
}

/// Immutable table of step definitions per mode.
#[derive(Debug, Clone)]
pub struct StepRegistry {
    modes: BTreeMap<Mode, ModeCatalog>,
}

impl StepRegistry {
    /// The built-in express, full and autopilot catalogs.
    pub fn builtin() -> Result<Self, RegistryError> {
        Mode::all()
            .iter()
            .fold(StepRegistryBuilder::default(), |builder, mode| {
                builder.mode(*mode, catalog::steps(*mode), catalog::parts(*mode))
            })
            .build()
    }

    pub fn builder() -> StepRegistryBuilder {
        StepRegistryBuilder::default()
    }

    /// Ordered steps for a mode.
    pub fn get_steps(&self, mode: Mode) -> Result<&[StepDefinition], RegistryError> {
        self.modes
            .get(&mode)
            .map(|c| c.steps.as_slice())
            .ok_or_else(|| RegistryError::UnknownMode(mode.to_string()))
    }

    pub fn get_step(&self, mode: Mode, code: &str) -> Option<&StepDefinition> {
        self.modes
            .get(&mode)?
            .steps
            .iter()
            .find(|s| s.code == code)
    }

    /// Like [`get_step`](Self::get_step) but with a typed error.
    pub fn require_step(&self, mode: Mode, code: &str) -> Result<&StepDefinition, RegistryError> {
        self.get_step(mode, code)
            .ok_or_else(|| RegistryError::UnknownStep {
                mode,
                code: code.to_string(),
            })
    }

    /// Part definitions; empty for single-part modes.
    pub fn parts(&self, mode: Mode) -> &[PartDefinition] {
        self.modes
            .get(&mode)
            .map(|c| c.parts.as_slice())
            .unwrap_or_default()
    }

    pub fn modes(&self) -> impl Iterator<Item = Mode> + '_ {
        self.modes.keys().copied()
    }
}

/// Assembles a registry, enforcing canonical order and unique codes.
#[derive(Debug, Default)]
pub struct StepRegistryBuilder {
    modes: Vec<(Mode, Vec<StepDefinition>, Vec<PartDefinition>)>,
}

impl StepRegistryBuilder {
    pub fn mode(
        mut self,
        mode: Mode,
        steps: Vec<StepDefinition>,
        parts: Vec<PartDefinition>,
    ) -> Self {
        self.modes.push((mode, steps, parts));
        self
    }

    pub fn build(self) -> Result<StepRegistry, RegistryError> {
        let mut modes = BTreeMap::new();
        for (mode, mut steps, parts) in self.modes {
            if steps.is_empty() {
                return Err(RegistryError::EmptyMode(mode));
            }
            steps.sort_by(|a, b| a.code.cmp(&b.code));
            if let Some(dup) = steps.windows(2).find(|w| w[0].code == w[1].code) {
                return Err(RegistryError::DuplicateStep {
                    mode,
                    code: dup[0].code.to_string(),
                });
            }
            modes.insert(mode, ModeCatalog { steps, parts });
        }
        Ok(StepRegistry { modes })
    }
}
