//! Cranelift backend for tessera IR
//!
//! Verified modules are compiled either in-process ([`Engine`]) or to a
//! relocatable object file ([`emit_object`]). Supported ops are the
//! `arith`, `memref`, `scf`, `cf` and `func` dialects over `i1`/`i8`..`i64`,
//! `index`, `f32`, `f64`, memrefs and function values.

mod abi;
mod aot;
mod codegen;
mod engine;
mod errors;
mod isa;
mod translate;

pub use abi::MemRefDescriptor;
pub use aot::emit_object;
pub use engine::{Engine, SymbolMap};
pub use errors::{CompilationError, CompilationErrorKind, CompilationResult};
pub use isa::{OptLevel, init_native_target};
