//! `scf` dialect: structured loops.
//!
//! `scf.for %lb, %ub, %step` owns one region with a single block whose only
//! argument is the induction variable. The body ends with `scf.yield`.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{BlockRef, OpRef, RegionRef, ValueRef};

crate::symbols! {
    DIALECT => "scf",
    FOR => "for",
    YIELD => "yield",
}

pub fn for_loop(lower: ValueRef, upper: ValueRef, step: ValueRef, body: RegionRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), FOR())
        .operand(lower)
        .operand(upper)
        .operand(step)
        .region(body)
}

pub fn yield_() -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), YIELD())
}

pub fn is_for(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), FOR())
}

pub fn is_yield(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), YIELD())
}

/// The body block of an `scf.for`.
pub fn for_body(ctx: &IrContext, op: OpRef) -> Option<BlockRef> {
    let region = *ctx.op(op).regions.first()?;
    ctx.region(region).blocks.first().copied()
}
