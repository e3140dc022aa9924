//! Scenario state chains.
//!
//! A [`StateChain`] records every transition registered for one scenario and
//! refuses transitions that would make the mock server's match resolution
//! ambiguous or leave a stub unreachable. The accepted shape is a single path
//! out of [`STARTED`], optionally looping back to it.

use crate::error::ChainError;
use crate::stub::{HttpMethod, UrlPattern};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Initial state of every scenario on the mock server.
pub const STARTED: &str = "Started";

/// One registered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub method: HttpMethod,
    pub url: UrlPattern,
    pub current: String,
    pub next: String,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}->{}", self.method, self.url, self.current, self.next)
    }
}

#[derive(Debug, Clone)]
pub struct StateChain {
    scenario: String,
    transitions: Vec<Transition>,
    /// `current` state -> `next` state of the transition leaving it
    leaving: HashMap<String, String>,
    /// States some transition has entered
    entered: HashSet<String>,
}

impl StateChain {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            transitions: Vec::new(),
            leaving: HashMap::new(),
            entered: HashSet::new(),
        }
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Whether the last transition returned the scenario to [`STARTED`].
    pub fn is_closed(&self) -> bool {
        self.transitions
            .last()
            .map(|t| t.next == STARTED)
            .unwrap_or(false)
    }

    /// Check a transition against the chain without recording it.
    pub fn check(&self, transition: &Transition) -> Result<(), ChainError> {
        let ambiguous = self.transitions.iter().any(|t| {
            t.method == transition.method
                && t.url == transition.url
                && t.current == transition.current
        });
        if ambiguous {
            return Err(ChainError::AmbiguousStub {
                scenario: self.scenario.clone(),
                method: transition.method.to_string(),
                url: transition.url.to_string(),
                state: transition.current.clone(),
            });
        }

        if transition.current != STARTED && !self.entered.contains(&transition.current) {
            return Err(ChainError::Unreachable {
                scenario: self.scenario.clone(),
                state: transition.current.clone(),
            });
        }

        if let Some(existing) = self.leaving.get(&transition.current) {
            return Err(ChainError::Divergent {
                scenario: self.scenario.clone(),
                state: transition.current.clone(),
                existing: existing.clone(),
            });
        }

        Ok(())
    }

    /// Record a transition after checking it.
    pub fn push(&mut self, transition: Transition) -> Result<(), ChainError> {
        self.check(&transition)?;
        self.leaving
            .insert(transition.current.clone(), transition.next.clone());
        self.entered.insert(transition.next.clone());
        self.transitions.push(transition);
        Ok(())
    }

    /// States in traversal order, starting at [`STARTED`].
    pub fn states(&self) -> Vec<&str> {
        let mut states = vec![STARTED];
        states.extend(self.transitions.iter().map(|t| t.next.as_str()));
        states
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(method: HttpMethod, url: &str, current: &str, next: &str) -> Transition {
        Transition {
            method,
            url: UrlPattern::Path(url.to_string()),
            current: current.to_string(),
            next: next.to_string(),
        }
    }

    #[test]
    fn test_single_path_closing_loop() {
        let mut chain = StateChain::new("net");
        chain.push(transition(HttpMethod::Put, "/n1", STARTED, "CreateNetwork")).unwrap();
        chain.push(transition(HttpMethod::Get, "/n1", "CreateNetwork", "GetNetwork")).unwrap();
        assert!(!chain.is_closed());

        chain.push(transition(HttpMethod::Delete, "/n1", "GetNetwork", STARTED)).unwrap();
        assert!(chain.is_closed());
        assert_eq!(chain.states(), vec![STARTED, "CreateNetwork", "GetNetwork", STARTED]);
    }

    #[test]
    fn test_duplicate_triple_is_ambiguous() {
        let mut chain = StateChain::new("net");
        chain.push(transition(HttpMethod::Put, "/n1", STARTED, "A")).unwrap();

        let err = chain
            .push(transition(HttpMethod::Put, "/n1", STARTED, "B"))
            .unwrap_err();
        assert!(matches!(err, ChainError::AmbiguousStub { .. }));
    }

    #[test]
    fn test_state_never_entered_is_unreachable() {
        let mut chain = StateChain::new("igw");
        chain.push(transition(HttpMethod::Put, "/g", STARTED, "CreateGateway")).unwrap();
        chain.push(transition(HttpMethod::Get, "/g", "CreateGateway", "GetGateway")).unwrap();

        let err = chain
            .push(transition(HttpMethod::Get, "/g", "GetGateway2x", "DeleteGateway"))
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::Unreachable {
                scenario: "igw".to_string(),
                state: "GetGateway2x".to_string(),
            }
        );
    }

    #[test]
    fn test_branching_is_divergent() {
        let mut chain = StateChain::new("mix");
        chain.push(transition(HttpMethod::Put, "/a", STARTED, "A")).unwrap();

        let err = chain
            .push(transition(HttpMethod::Put, "/b", STARTED, "B"))
            .unwrap_err();
        assert!(matches!(err, ChainError::Divergent { ref existing, .. } if existing == "A"));
    }

    #[test]
    fn test_closed_chain_rejects_further_transitions() {
        let mut chain = StateChain::new("ws");
        chain.push(transition(HttpMethod::Put, "/w", STARTED, "A")).unwrap();
        chain.push(transition(HttpMethod::Get, "/w", "A", STARTED)).unwrap();

        assert!(chain
            .push(transition(HttpMethod::Delete, "/w", STARTED, "B"))
            .is_err());
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn test_check_does_not_record() {
        let chain = StateChain::new("ws");
        chain
            .check(&transition(HttpMethod::Put, "/w", STARTED, "A"))
            .unwrap();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_transition_display() {
        let t = transition(HttpMethod::Delete, "/w", "GetWorkspace", STARTED);
        assert_eq!(t.to_string(), "DELETE /w GetWorkspace->Started");
    }
}
