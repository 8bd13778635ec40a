//! The compiled, immutable module graph

use ahash::AHashMap;
use std::collections::VecDeque;

use super::error::LoadError;
use super::state::{State, StateId, StateKind};

/// A validated state graph. Shared read-only (behind `Arc`) by every
/// individual running it.
#[derive(Debug, Clone)]
pub struct Module {
    pub(crate) key: String,
    pub(crate) name: String,
    pub(crate) submodule: bool,
    pub(crate) remarks: Vec<String>,
    pub(crate) states: Vec<State>,
    pub(crate) index: AHashMap<String, StateId>,
    pub(crate) initial: StateId,
}

impl Module {
    /// Registry key (file path without extension, `/`-separated)
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Display name from the module file
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_submodule(&self) -> bool {
        self.submodule
    }

    pub fn remarks(&self) -> &[String] {
        &self.remarks
    }

    pub fn initial(&self) -> StateId {
        self.initial
    }

    pub fn state(&self, id: StateId) -> &State {
        &self.states[id.0]
    }

    pub fn state_id(&self, name: &str) -> Option<StateId> {
        self.index.get(name).copied()
    }

    pub fn state_by_name(&self, name: &str) -> Option<&State> {
        self.state_id(name).map(|id| self.state(id))
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// (calling state, sub-module key) for every CallSubmodule state
    pub fn submodule_calls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.states.iter().filter_map(|s| match &s.kind {
            StateKind::CallSubmodule { submodule } => Some((s.name.as_str(), submodule.as_str())),
            _ => None,
        })
    }

    fn successors(&self) -> Vec<Vec<StateId>> {
        self.states
            .iter()
            .map(|s| s.transition.as_ref().map(|t| t.targets()).unwrap_or_default())
            .collect()
    }

    /// States reachable from Initial, as a membership mask
    pub(crate) fn reachable(&self) -> Vec<bool> {
        let successors = self.successors();
        let mut seen = vec![false; self.states.len()];
        let mut queue = VecDeque::from([self.initial]);
        seen[self.initial.0] = true;
        while let Some(id) = queue.pop_front() {
            for next in &successors[id.0] {
                if !seen[next.0] {
                    seen[next.0] = true;
                    queue.push_back(*next);
                }
            }
        }
        seen
    }

    /// Every state reachable from Initial must be able to reach a Terminal
    /// or Death state. A cycle without such an exit would keep an individual
    /// in the module forever.
    pub(crate) fn check_exits(&self) -> Result<(), LoadError> {
        let successors = self.successors();
        let mut predecessors: Vec<Vec<StateId>> = vec![Vec::new(); self.states.len()];
        for (from, targets) in successors.iter().enumerate() {
            for to in targets {
                predecessors[to.0].push(StateId(from));
            }
        }

        let mut exits = vec![false; self.states.len()];
        let mut queue: VecDeque<StateId> = self
            .states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.kind.is_terminal())
            .map(|(i, _)| StateId(i))
            .collect();
        for id in &queue {
            exits[id.0] = true;
        }
        while let Some(id) = queue.pop_front() {
            for prev in &predecessors[id.0] {
                if !exits[prev.0] {
                    exits[prev.0] = true;
                    queue.push_back(*prev);
                }
            }
        }

        let reachable = self.reachable();
        for (i, state) in self.states.iter().enumerate() {
            if reachable[i] && !exits[i] {
                return Err(LoadError::NoExit {
                    module: self.key.clone(),
                    state: state.name.clone(),
                });
            }
            if !reachable[i] {
                tracing::debug!("{}: state '{}' is unreachable", self.key, state.name);
            }
        }
        Ok(())
    }
}
