//! Bot protection.
//!
//! Scripts may react to game state, but they must not synthesize player
//! actions outside of a genuine input event. [`CallContext`] tracks whether
//! the current call stack is inside a script callback and/or an input event;
//! [`BotProtection`] rejects gated actions when the former holds without the
//! latter.

use std::cell::Cell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotProtectionMode {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Default)]
struct Depths {
    script: Cell<u32>,
    input: Cell<u32>,
}

/// Shared, single-threaded record of the current call context.
///
/// Cloning yields another handle onto the same context.
#[derive(Debug, Clone, Default)]
pub struct CallContext(Rc<Depths>);

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the stack as running script code until the guard drops.
    pub fn enter_script(&self) -> ScopeGuard {
        bump(&self.0.script, 1);
        ScopeGuard {
            depths: Rc::clone(&self.0),
            kind: Scope::Script,
        }
    }

    /// Mark the stack as handling a real user input event until the guard drops.
    pub fn enter_input(&self) -> ScopeGuard {
        bump(&self.0.input, 1);
        ScopeGuard {
            depths: Rc::clone(&self.0),
            kind: Scope::Input,
        }
    }

    pub fn in_script(&self) -> bool {
        self.0.script.get() > 0
    }

    pub fn in_input_event(&self) -> bool {
        self.0.input.get() > 0
    }
}

fn bump(cell: &Cell<u32>, delta: i32) {
    cell.set(cell.get().saturating_add_signed(delta));
}

#[derive(Debug, Clone, Copy)]
enum Scope {
    Script,
    Input,
}

#[must_use = "the scope ends when the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    depths: Rc<Depths>,
    kind: Scope,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        match self.kind {
            Scope::Script => bump(&self.depths.script, -1),
            Scope::Input => bump(&self.depths.input, -1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BotProtection {
    mode: BotProtectionMode,
    context: CallContext,
    violations: Rc<Cell<u64>>,
}

impl BotProtection {
    pub fn new(mode: BotProtectionMode, context: CallContext) -> Self {
        Self {
            mode,
            context,
            violations: Rc::new(Cell::new(0)),
        }
    }

    pub fn mode(&self) -> BotProtectionMode {
        self.mode
    }

    pub fn context(&self) -> &CallContext {
        &self.context
    }

    /// Number of actions rejected so far.
    pub fn violations(&self) -> u64 {
        self.violations.get()
    }

    /// `true` when the action may proceed.
    pub fn check(&self) -> bool {
        if self.mode == BotProtectionMode::Disabled {
            return true;
        }
        if self.context.in_script() && !self.context.in_input_event() {
            self.violations.set(self.violations.get() + 1);
            tracing::error!(
                "[gateway] caught a script call to a bot protected game function, the call was canceled"
            );
            return false;
        }
        true
    }
}
