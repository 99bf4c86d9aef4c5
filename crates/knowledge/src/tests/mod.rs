//! Scenario tests for agents and evaluation, driven through fake providers.

mod eval_scenarios;
pub(crate) mod support;
