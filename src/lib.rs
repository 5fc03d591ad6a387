//! ariz - guided multi-step ARIZ problem-solving sessions
//!
//! A session walks a problem through an ordered table of steps. Each step's
//! input is sent to a language model together with the accepted outputs of
//! earlier steps; the reply must pass the step's validators before the
//! session may move on. Model calls run in the background and are observed
//! by polling an execution handle.

pub mod config;
pub mod gateway;
pub mod llm;
pub mod logging;
pub mod polling;
pub mod prompts;
pub mod registry;
pub mod rest;
pub mod session;
pub mod validators;
