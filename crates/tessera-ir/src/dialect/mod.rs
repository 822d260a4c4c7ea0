//! Hand-written op constructors and decoders, one module per dialect.
//!
//! Constructors return an [`OperationDataBuilder`](crate::OperationDataBuilder)
//! so callers can either `create` a detached op or insert it through an
//! [`OpBuilder`](crate::OpBuilder).

pub mod arith;
pub mod builtin;
pub mod cf;
pub mod func;
pub mod memref;
pub mod scf;

use crate::context::IrContext;
use crate::refs::OpRef;

/// Whether `op` may end a block of a function body.
///
/// Custom ops with successors count as terminators too.
pub fn is_terminator(ctx: &IrContext, op: OpRef) -> bool {
    func::is_return(ctx, op)
        || cf::is_br(ctx, op)
        || cf::is_cond_br(ctx, op)
        || scf::is_yield(ctx, op)
        || !ctx.op(op).successors.is_empty()
}
