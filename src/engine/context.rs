//! Per-module execution context
//!
//! Each module an individual is enrolled in gets its own [`ModuleRun`]:
//! the state it is in, when it entered it, and an explicit stack of caller
//! frames for sub-module calls.

use serde::Serialize;
use std::sync::Arc;

use crate::core::types::Timestamp;
use crate::module::{Module, StateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Active,
    /// Reached Terminal with an empty call stack
    Finished,
    /// Stopped because the individual died
    Halted,
    Failed,
}

/// A position in a module graph
#[derive(Debug, Clone)]
pub struct Frame {
    pub module: Arc<Module>,
    pub state: StateId,
}

impl Frame {
    pub fn module_key(&self) -> &str {
        self.module.key()
    }

    pub fn state_name(&self) -> &str {
        &self.module.state(self.state).name
    }
}

#[derive(Debug, Clone)]
pub struct ModuleRun {
    pub(crate) key: String,
    pub(crate) current: Frame,
    /// Caller frames, innermost last. Each points at a CallSubmodule state.
    pub(crate) callers: Vec<Frame>,
    pub(crate) entered_at: Timestamp,
    /// Whether the current state's entry effects have been applied
    pub(crate) entered: bool,
    pub(crate) wake_at: Option<Timestamp>,
    pub(crate) status: RunStatus,
}

impl ModuleRun {
    pub fn new(module: Arc<Module>, start: Timestamp) -> Self {
        Self {
            key: module.key().to_string(),
            current: Frame {
                state: module.initial(),
                module,
            },
            callers: Vec::new(),
            entered_at: start,
            entered: false,
            wake_at: None,
            status: RunStatus::Active,
        }
    }

    /// Key of the top-level module this run was enrolled with
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active
    }

    /// Module and state currently occupied, possibly inside a sub-module
    pub fn current(&self) -> &Frame {
        &self.current
    }

    pub fn call_depth(&self) -> usize {
        self.callers.len()
    }

    pub fn entered_at(&self) -> Timestamp {
        self.entered_at
    }

    pub fn wake_at(&self) -> Option<Timestamp> {
        self.wake_at
    }

    /// Move to `state` of the current module at `time`
    pub(crate) fn goto(&mut self, state: StateId, time: Timestamp) {
        self.current.state = state;
        self.entered_at = time;
        self.entered = false;
        self.wake_at = None;
    }

    /// Enter `module`'s Initial state, remembering the current frame
    pub(crate) fn push(&mut self, module: Arc<Module>, time: Timestamp) {
        let callee = Frame {
            state: module.initial(),
            module,
        };
        let caller = std::mem::replace(&mut self.current, callee);
        self.callers.push(caller);
        self.entered_at = time;
        self.entered = false;
        self.wake_at = None;
    }

    /// Return to the innermost caller frame. The caller's state stays
    /// entered; only its transition remains to be taken.
    pub(crate) fn pop(&mut self) -> bool {
        match self.callers.pop() {
            Some(caller) => {
                self.current = caller;
                self.entered = true;
                self.wake_at = None;
                true
            }
            None => false,
        }
    }
}
