//! `builtin` dialect ops. The builtin types live in [`crate::types`].

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, RegionRef};

crate::symbols! {
    DIALECT => "builtin",
    MODULE => "module",
}

pub fn module(body: RegionRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), MODULE()).region(body)
}

pub fn is_module(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), MODULE())
}
