//! Mode strategy: step sequencing per mode.
//!
//! Each mode maps to a [`Sequencing`] record of plain functions over step
//! indices into the registry's canonical order. Adding a mode means adding a
//! table row, not a type.

use std::sync::Arc;

use super::{Mode, PartDefinition, RegistryError, StepCode, StepDefinition, StepRegistry};

#[derive(Clone, Copy)]
struct Sequencing {
    /// (current index, step count) -> next index
    next: fn(usize, usize) -> Option<usize>,
    /// current index -> previous index
    previous: fn(usize) -> Option<usize>,
    /// step count -> steps a session walks through
    total: fn(usize) -> usize,
}

const LINEAR: Sequencing = Sequencing {
    next: |index, len| (index + 1 < len).then_some(index + 1),
    previous: |index| index.checked_sub(1),
    total: |len| len,
};

const SINGLE_SHOT: Sequencing = Sequencing {
    next: |_, _| None,
    previous: |_| None,
    total: |len| len.min(1),
};

fn sequencing(mode: Mode) -> Sequencing {
    match mode {
        Mode::Express | Mode::Full => LINEAR,
        Mode::Autopilot => SINGLE_SHOT,
    }
}

/// Answers first/next/previous/total for a mode over a shared registry.
#[derive(Debug, Clone)]
pub struct ModeStrategy {
    registry: Arc<StepRegistry>,
}

impl ModeStrategy {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn first_step(&self, mode: Mode) -> Result<&StepDefinition, RegistryError> {
        self.registry
            .get_steps(mode)?
            .first()
            .ok_or(RegistryError::EmptyMode(mode))
    }

    /// `None` when `code` is the last step of the mode.
    pub fn next_step(
        &self,
        mode: Mode,
        code: &StepCode,
    ) -> Result<Option<&StepDefinition>, RegistryError> {
        let steps = self.registry.get_steps(mode)?;
        let index = Self::index_in(steps, mode, code)?;
        Ok((sequencing(mode).next)(index, steps.len()).map(|i| &steps[i]))
    }

    /// `None` when `code` is the first step of the mode.
    pub fn previous_step(
        &self,
        mode: Mode,
        code: &StepCode,
    ) -> Result<Option<&StepDefinition>, RegistryError> {
        let steps = self.registry.get_steps(mode)?;
        let index = Self::index_in(steps, mode, code)?;
        Ok((sequencing(mode).previous)(index).map(|i| &steps[i]))
    }

    pub fn total_steps(&self, mode: Mode) -> Result<usize, RegistryError> {
        let steps = self.registry.get_steps(mode)?;
        Ok((sequencing(mode).total)(steps.len()))
    }

    /// Zero-based position of `code` in the mode's canonical order.
    pub fn position(&self, mode: Mode, code: &StepCode) -> Result<usize, RegistryError> {
        Self::index_in(self.registry.get_steps(mode)?, mode, code)
    }

    /// Part of a step, for modes that define parts.
    pub fn part_of(&self, mode: Mode, code: &StepCode) -> Option<u32> {
        let part = code.part()?;
        self.parts(mode)
            .iter()
            .any(|p| p.number == part)
            .then_some(part)
    }

    pub fn parts(&self, mode: Mode) -> &[PartDefinition] {
        self.registry.parts(mode)
    }

    fn index_in(
        steps: &[StepDefinition],
        mode: Mode,
        code: &StepCode,
    ) -> Result<usize, RegistryError> {
        steps
            .iter()
            .position(|s| &s.code == code)
            .ok_or_else(|| RegistryError::UnknownStep {
                mode,
                code: code.to_string(),
            })
    }
}
