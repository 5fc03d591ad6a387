//! Validator set: rule checks applied to raw model output before it is
//! accepted as a step result.
//!
//! Validators are pure: `(step context, text) -> Verdict`. A step declares an
//! ordered list of [`ValidatorKind`]s and [`ValidatorSet::run`] applies them in
//! that order, feeding each accepted text into the next check. The first
//! rejection stops the chain.

mod rules;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::{Audience, Mode, StepCode};

pub use rules::{
    ConflictCheck, ContradictionCheck, FalsenessCheck, FunctionCheck, IkrCheck, TermsCheck,
};

/// Identifier of a validation rule, as referenced from step definitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    FalsenessCheck,
    TermsCheck,
    ContradictionCheck,
    ConflictCheck,
    FunctionCheck,
    IkrCheck,
}

impl ValidatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::FalsenessCheck => "falseness_check",
            ValidatorKind::TermsCheck => "terms_check",
            ValidatorKind::ContradictionCheck => "contradiction_check",
            ValidatorKind::ConflictCheck => "conflict_check",
            ValidatorKind::FunctionCheck => "function_check",
            ValidatorKind::IkrCheck => "ikr_check",
        }
    }
}

impl fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValidatorKind {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "falseness_check" => Ok(ValidatorKind::FalsenessCheck),
            "terms_check" => Ok(ValidatorKind::TermsCheck),
            "contradiction_check" => Ok(ValidatorKind::ContradictionCheck),
            "conflict_check" => Ok(ValidatorKind::ConflictCheck),
            "function_check" => Ok(ValidatorKind::FunctionCheck),
            "ikr_check" => Ok(ValidatorKind::IkrCheck),
            other => Err(ValidatorError::Unknown(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidatorError {
    #[error("unknown validator '{0}'")]
    Unknown(String),

    #[error("validator '{0}' is not registered")]
    NotRegistered(ValidatorKind),
}

/// What a validator may know about the step it checks.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub mode: Mode,
    pub step_code: &'a StepCode,
    pub audience: Audience,
}

impl<'a> StepContext<'a> {
    pub fn new(mode: Mode, step_code: &'a StepCode) -> Self {
        Self {
            mode,
            step_code,
            audience: mode.audience(),
        }
    }
}

/// A validator's rejection with the reasons shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub validator: ValidatorKind,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Rejection {
    pub fn notes(&self) -> String {
        let mut notes = format!("[{}] FAIL: {}", self.validator, self.issues.join("; "));
        if !self.suggestions.is_empty() {
            notes.push_str(" | ");
            notes.push_str(&self.suggestions.join("; "));
        }
        notes
    }
}

/// Outcome of a single validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept { text: String },
    Reject(Rejection),
}

pub trait Validator: Send + Sync {
    fn kind(&self) -> ValidatorKind;

    fn check(&self, ctx: &StepContext<'_>, text: &str) -> Verdict;
}

/// Outcome of a whole validator chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    /// Every validator passed; `text` is the last stage's accepted text.
    Accepted { text: String, notes: String },
    /// The first failing validator's rejection.
    Rejected(Rejection),
}

impl Validation {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Validation::Accepted { .. })
    }
}

/// Registered validators, looked up by kind.
pub struct ValidatorSet {
    validators: HashMap<ValidatorKind, Box<dyn Validator>>,
}

impl ValidatorSet {
    /// Empty set; register validators with [`with`](Self::with).
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// All built-in rules.
    pub fn builtin() -> Self {
        Self::empty()
            .with(FalsenessCheck)
            .with(TermsCheck)
            .with(ContradictionCheck)
            .with(ConflictCheck)
            .with(FunctionCheck)
            .with(IkrCheck)
    }

    /// Registers a validator, replacing any previous one of the same kind.
    pub fn with(mut self, validator: impl Validator + 'static) -> Self {
        self.validators.insert(validator.kind(), Box::new(validator));
        self
    }

    pub fn contains(&self, kind: ValidatorKind) -> bool {
        self.validators.contains_key(&kind)
    }

    /// Runs `kinds` in order against `raw`.
    pub fn run(
        &self,
        kinds: &[ValidatorKind],
        ctx: &StepContext<'_>,
        raw: &str,
    ) -> Result<Validation, ValidatorError> {
        let mut text = raw.trim().to_string();
        let mut notes = Vec::with_capacity(kinds.len());

        for kind in kinds {
            let validator = self
                .validators
                .get(kind)
                .ok_or(ValidatorError::NotRegistered(*kind))?;

            match validator.check(ctx, &text) {
                Verdict::Accept { text: accepted } => {
                    notes.push(format!("[{kind}] OK"));
                    text = accepted;
                }
                Verdict::Reject(rejection) => {
                    tracing::debug!(
                        validator = %kind,
                        step_code = %ctx.step_code,
                        issues = rejection.issues.len(),
                        "validator rejected output"
                    );
                    return Ok(Validation::Rejected(rejection));
                }
            }
        }

        Ok(Validation::Accepted {
            text,
            notes: notes.join(" | "),
        })
    }
}

impl Default for ValidatorSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for ValidatorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.validators.keys().map(ValidatorKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ValidatorSet").field("validators", &kinds).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Shout;

    impl Validator for Shout {
        fn kind(&self) -> ValidatorKind {
            ValidatorKind::FunctionCheck
        }

        fn check(&self, _ctx: &StepContext<'_>, text: &str) -> Verdict {
            Verdict::Accept {
                text: text.to_uppercase(),
            }
        }
    }

    struct Never(ValidatorKind);

    impl Validator for Never {
        fn kind(&self) -> ValidatorKind {
            self.0
        }

        fn check(&self, _ctx: &StepContext<'_>, _text: &str) -> Verdict {
            Verdict::Reject(Rejection {
                validator: self.0,
                issues: vec![format!("{} says no", self.0)],
                suggestions: Vec::new(),
            })
        }
    }

    fn ctx(code: &StepCode) -> StepContext<'_> {
        StepContext::new(Mode::Express, code)
    }

    #[test]
    fn test_no_validators_accepts_trimmed_text() {
        let code = StepCode::from("6");
        let set = ValidatorSet::builtin();
        let result = set.run(&[], &ctx(&code), "  answer \n").unwrap();
        assert_eq!(
            result,
            Validation::Accepted {
                text: "answer".to_string(),
                notes: String::new()
            }
        );
    }

    #[test]
    fn test_first_failure_short_circuits() {
        let code = StepCode::from("1");
        let set = ValidatorSet::empty()
            .with(Never(ValidatorKind::TermsCheck))
            .with(Never(ValidatorKind::IkrCheck));
        let result = set
            .run(
                &[ValidatorKind::TermsCheck, ValidatorKind::IkrCheck],
                &ctx(&code),
                "text",
            )
            .unwrap();
        match result {
            Validation::Rejected(rejection) => {
                assert_eq!(rejection.validator, ValidatorKind::TermsCheck);
                assert!(rejection.notes().starts_with("[terms_check] FAIL"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn test_accepted_text_flows_through_chain() {
        let code = StepCode::from("1");
        let set = ValidatorSet::builtin().with(Shout);
        let result = set
            .run(&[ValidatorKind::FunctionCheck], &ctx(&code), "quiet")
            .unwrap();
        assert_eq!(
            result,
            Validation::Accepted {
                text: "QUIET".to_string(),
                notes: "[function_check] OK".to_string()
            }
        );
    }

    #[test]
    fn test_unregistered_validator() {
        let code = StepCode::from("1");
        let set = ValidatorSet::empty();
        let err = set
            .run(&[ValidatorKind::IkrCheck], &ctx(&code), "text")
            .unwrap_err();
        assert_eq!(err, ValidatorError::NotRegistered(ValidatorKind::IkrCheck));
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in [
            ValidatorKind::FalsenessCheck,
            ValidatorKind::TermsCheck,
            ValidatorKind::ContradictionCheck,
            ValidatorKind::ConflictCheck,
            ValidatorKind::FunctionCheck,
            ValidatorKind::IkrCheck,
        ] {
            assert_eq!(kind.as_str().parse::<ValidatorKind>().unwrap(), kind);
        }
        assert!("spelling_check".parse::<ValidatorKind>().is_err());
    }
}
