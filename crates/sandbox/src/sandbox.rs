//! The fail-open sandbox wrapper
//!
//! One synchronous invocation at a time per sandbox: Idle → Executing →
//! Idle. A script that throws or breaches its budget is caught and logged;
//! execution failure degrades to "no side effect, return null" and never
//! aborts the enclosing document operation. Multiple sandboxes may run
//! concurrently across documents, each with its own budget.

use crate::engine::{HookVars, ScriptEngine};
use crate::interp::ExprEngine;
use loam_core::{LifecycleEvent, Limits};
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::warn;

const STATE_IDLE: u8 = 0;
const STATE_EXECUTING: u8 = 1;

/// Resource-bounded, fail-open script runner
pub struct Sandbox {
    engine: Arc<dyn ScriptEngine>,
    limits: Limits,
    state: AtomicU8,
}

impl Sandbox {
    /// Sandbox around the built-in interpreter
    pub fn new(limits: Limits) -> Self {
        Self::with_engine(Arc::new(ExprEngine::new()), limits)
    }

    /// Sandbox around any [`ScriptEngine`] implementation
    pub fn with_engine(engine: Arc<dyn ScriptEngine>, limits: Limits) -> Self {
        Self {
            engine,
            limits,
            state: AtomicU8::new(STATE_IDLE),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state.load(Ordering::Acquire) == STATE_IDLE
    }

    /// Run a lifecycle script, if one is bound for the event
    ///
    /// Absence of a script is a no-op. Errors and budget breaches are
    /// logged and degrade to `None`.
    pub fn run(
        &self,
        source: Option<&str>,
        event: LifecycleEvent,
        vars: &HookVars,
    ) -> Option<Value> {
        let source = source?;
        if source.trim().is_empty() {
            return None;
        }

        self.state.store(STATE_EXECUTING, Ordering::Release);
        let result = self.engine.run(source, event, vars, &self.limits);
        self.state.store(STATE_IDLE, Ordering::Release);

        match result {
            Ok(value) => value,
            Err(error) => {
                warn!(%event, %error, "lifecycle script failed; continuing without result");
                None
            }
        }
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Sandbox::new(Limits::default())
    }
}
