//! Tessera IR.
//!
//! An arena-allocated SSA IR (`cranelift-entity` maps with explicit
//! use-chains) holding a small set of dialects: `arith`, `memref`, `scf`,
//! `cf`, `func` and `builtin`. The builder DSL in `tessera-edsc` emits into
//! it and `tessera-jit` lowers it to machine code.

// === Core storage ===
pub mod context;
pub mod refs;
pub mod symbol;
pub mod types;

// === Dialect modules ===
pub mod dialect;

// === Construction helpers ===
pub mod builder;
pub mod errors;
pub mod function;
pub mod module;

// === Analysis and output ===
pub mod printer;
pub mod verify;
pub mod walk;

pub use smallvec;

pub use builder::OpBuilder;
pub use context::{
    BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use, ValueData,
};
pub use errors::{IrError, IrResult};
pub use function::FunctionHandle;
pub use module::ModuleOp;
pub use printer::{print_attribute, print_op, print_type};
pub use refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::Symbol;
pub use types::{
    Attribute, BuiltinType, DYNAMIC, FloatKind, TypeData, TypeDataBuilder, TypeInterner,
};
pub use verify::{Diagnostic, VerifyError, verify_function, verify_module};
pub use walk::WalkAction;
