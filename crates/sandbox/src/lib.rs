//! Sandboxed lifecycle script execution
//!
//! Tenant-authored scripts run at document lifecycle points inside a
//! resource-bounded interpreter. The contract, not the interpreter, is the
//! stable surface: `run(source, event, vars, limits) -> value | error`,
//! a per-invocation wall-clock and step budget, and fail-open-to-null
//! semantics. Any sandboxed interpreter (bytecode VM, WASM module,
//! subprocess) can replace the built-in one behind [`ScriptEngine`].
//!
//! The built-in engine is closed by construction: scripts see exactly the
//! context variables they are handed and have no I/O, process, or global
//! facilities to reach for.

pub mod engine;
pub mod interp;
pub mod sandbox;

pub use engine::{HookVars, ScriptEngine, ScriptError};
pub use interp::ExprEngine;
pub use sandbox::Sandbox;
