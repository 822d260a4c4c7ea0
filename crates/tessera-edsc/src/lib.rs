//! Embedded builder DSL for tessera IR.
//!
//! Host code opens a scope on an [`EdscContext`], builds expression and
//! statement trees out of symbolic [`Expr`] leaves, then hands them to an
//! [`Emitter`] which binds the leaves to IR values and lowers the trees at
//! an insertion point.
//!
//! ```
//! use tessera_edsc::{EdscContext, Emitter};
//! use tessera_ir::{FunctionHandle, IrContext, ModuleOp, OpBuilder};
//!
//! let mut ir = IrContext::new();
//! let module = ModuleOp::create(&mut ir);
//! let i32_ty = ir.types.int(32);
//! let f = FunctionHandle::make(&mut ir, module, "add", &[i32_ty, i32_ty], &[i32_ty]).unwrap();
//! let entry = f.entry_block(&ir).unwrap();
//!
//! let cx = EdscContext::new();
//! let scope = cx.enter().unwrap();
//! let mut emitter = Emitter::new(&cx, OpBuilder::at_end(&mut ir, entry), f).unwrap();
//! let args = emitter.bind_arguments().unwrap();
//! let sum = cx.add(args[0], args[1]).unwrap();
//! emitter.emit(cx.ret(&[sum]).unwrap()).unwrap();
//! emitter.verify().unwrap();
//! scope.exit();
//! ```

mod build;
mod emitter;
mod errors;
mod ir_builder;
mod node;
mod render;
mod scope;

pub use emitter::{Constant, Emitter, View};
pub use errors::{EdscError, EdscResult};
pub use ir_builder::{IrBuilder, TypeLookup};
pub use node::{
    Attr, AttrValue, BinaryOp, Block, BlockNode, CustomOp, Expr, ExprKind, Indexed, MaxExpr,
    MinExpr, ReduceOp, Stmt, StmtKind,
};
pub use scope::{EdscContext, Scope};
