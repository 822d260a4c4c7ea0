//! tessera: build IR from Rust with a small expression DSL, then
//! JIT-compile it or write it to an object file.
//!
//! [`Module`] ties the pieces together: it owns the IR, hands out
//! [`tessera_edsc::Emitter`]s for its functions, and keeps the compiled
//! code of its last successful [`Module::compile`].

pub mod kernels;
mod module;

pub use module::{Module, ModuleError, ModuleResult, ScalarKind};
pub use tessera_edsc as edsc;
pub use tessera_ir as ir;
pub use tessera_jit as jit;
