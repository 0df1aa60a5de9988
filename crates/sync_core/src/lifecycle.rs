use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;

/// Declarative status lifecycle, as it appears in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    pub states: Vec<String>,
    pub initial: String,
    /// Allowed targets per state. States without an entry are terminal.
    #[serde(default)]
    pub transitions: BTreeMap<String, Vec<String>>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        let owned = |values: &[&str]| values.iter().map(|v| v.to_string()).collect::<Vec<_>>();
        let mut transitions = BTreeMap::new();
        transitions.insert("new".to_string(), owned(&["preparing", "cancelled"]));
        transitions.insert(
            "preparing".to_string(),
            owned(&["ready_to_ship", "cancelled"]),
        );
        transitions.insert(
            "ready_to_ship".to_string(),
            owned(&["shipped", "cancelled"]),
        );
        Self {
            states: owned(&["new", "preparing", "ready_to_ship", "shipped", "cancelled"]),
            initial: "new".to_string(),
            transitions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("status lifecycle must declare at least one state")]
    Empty,
    #[error("status {0:?} is declared more than once")]
    DuplicateState(String),
    #[error("status {0:?} must not be empty")]
    BlankState(String),
    #[error("initial status {0:?} is not a declared state")]
    UnknownInitial(String),
    #[error("transition {from:?} -> {to:?} references an undeclared state")]
    UnknownTransition { from: String, to: String },
}

/// Validated status state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLifecycle {
    states: Vec<String>,
    initial: String,
    transitions: HashMap<String, Vec<String>>,
}

impl Default for StatusLifecycle {
    fn default() -> Self {
        let config = LifecycleConfig::default();
        Self {
            states: config.states,
            initial: config.initial,
            transitions: config.transitions.into_iter().collect(),
        }
    }
}

impl StatusLifecycle {
    pub fn from_config(config: &LifecycleConfig) -> Result<Self, LifecycleError> {
        if config.states.is_empty() {
            return Err(LifecycleError::Empty);
        }

        let mut seen = HashSet::new();
        for state in &config.states {
            if state.trim().is_empty() {
                return Err(LifecycleError::BlankState(state.clone()));
            }
            if !seen.insert(state.as_str()) {
                return Err(LifecycleError::DuplicateState(state.clone()));
            }
        }

        if !seen.contains(config.initial.as_str()) {
            return Err(LifecycleError::UnknownInitial(config.initial.clone()));
        }

        for (from, targets) in &config.transitions {
            for to in targets {
                if !seen.contains(from.as_str()) || !seen.contains(to.as_str()) {
                    return Err(LifecycleError::UnknownTransition {
                        from: from.clone(),
                        to: to.clone(),
                    });
                }
            }
        }

        Ok(Self {
            states: config.states.clone(),
            initial: config.initial.clone(),
            transitions: config
                .transitions
                .iter()
                .filter(|(_, targets)| !targets.is_empty())
                .map(|(from, targets)| (from.clone(), targets.clone()))
                .collect(),
        })
    }

    pub fn states(&self) -> &[String] {
        &self.states
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn contains(&self, status: &str) -> bool {
        self.states.iter().any(|state| state == status)
    }

    pub fn allowed_targets(&self, from: &str) -> &[String] {
        self.transitions
            .get(from)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_terminal(&self, status: &str) -> bool {
        self.contains(status) && self.allowed_targets(status).is_empty()
    }

    pub fn check_transition(&self, from: &str, to: &str) -> Result<(), EngineError> {
        if self.allowed_targets(from).iter().any(|target| target == to) {
            Ok(())
        } else {
            Err(EngineError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }

    /// Maps a raw stored status onto the state set; unknown or missing values become the initial state.
    pub fn normalize<'a>(&'a self, raw: Option<&str>) -> &'a str {
        raw.and_then(|value| self.states.iter().find(|state| state.as_str() == value))
            .map(String::as_str)
            .unwrap_or(self.initial.as_str())
    }

    pub fn count<'a, I>(&self, statuses: I) -> StatusCounts
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: Vec<(String, usize)> =
            self.states.iter().map(|state| (state.clone(), 0)).collect();
        let mut total = 0;
        for status in statuses {
            let status = self.normalize(Some(status));
            if let Some(entry) = counts.iter_mut().find(|(state, _)| state == status) {
                entry.1 += 1;
            }
            total += 1;
        }
        StatusCounts { counts, total }
    }
}

/// Per-status badge counts, in lifecycle declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusCounts {
    counts: Vec<(String, usize)>,
    total: usize,
}

impl StatusCounts {
    pub fn get(&self, status: &str) -> usize {
        self.counts
            .iter()
            .find(|(state, _)| state == status)
            .map(|(_, count)| *count)
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts
            .iter()
            .map(|(state, count)| (state.as_str(), *count))
    }
}

#[cfg(test)]
#[path = "tests/lifecycle_tests.rs"]
mod tests;
