//! Execution units: started containers provisioned for one language.

use crate::language::Language;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Created,
    Running,
    Busy,
    Idle,
    Terminating,
    Terminated,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A running container and the language it was provisioned for.
///
/// Units are deliberately not `Clone`: whoever holds the value owns the
/// container, and ownership moves between the pool and an invocation by value.
#[derive(Debug)]
pub struct ExecutionUnit {
    id: String,
    name: String,
    language: Language,
    state: UnitState,
    cold_start: bool,
    created_at: Instant,
    uses: u32,
}

impl ExecutionUnit {
    pub fn new(id: String, name: String, language: Language) -> Self {
        Self {
            id,
            name,
            language,
            state: UnitState::Created,
            cold_start: false,
            created_at: Instant::now(),
            uses: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn state(&self) -> UnitState {
        self.state
    }

    /// Set when the unit was created on a pool miss rather than taken warm.
    pub fn is_cold_start(&self) -> bool {
        self.cold_start
    }

    pub fn age(&self) -> std::time::Duration {
        self.created_at.elapsed()
    }

    /// Number of invocations this unit has served.
    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn is_live(&self) -> bool {
        !matches!(self.state, UnitState::Terminating | UnitState::Terminated)
    }

    pub(crate) fn mark_running(&mut self) {
        self.state = UnitState::Running;
    }

    pub(crate) fn mark_cold_start(&mut self) {
        self.cold_start = true;
    }

    pub(crate) fn mark_busy(&mut self) {
        self.state = UnitState::Busy;
        self.uses += 1;
    }

    pub(crate) fn mark_idle(&mut self) {
        self.state = UnitState::Idle;
        self.cold_start = false;
    }

    pub(crate) fn mark_terminating(&mut self) {
        self.state = UnitState::Terminating;
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.state = UnitState::Terminated;
    }
}
