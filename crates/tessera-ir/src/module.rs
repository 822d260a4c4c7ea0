//! `builtin.module` wrapper.

use smallvec::smallvec;

use crate::context::{BlockData, IrContext, RegionData};
use crate::dialect::{builtin, func};
use crate::refs::{BlockRef, OpRef, RegionRef};

/// A `builtin.module` op: one region with one block holding the functions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModuleOp(OpRef);

impl ModuleOp {
    /// Create an empty module.
    pub fn create(ctx: &mut IrContext) -> Self {
        let block = ctx.create_block(BlockData::new(&[]));
        let region = ctx.create_region(RegionData {
            blocks: smallvec![block],
            parent_op: None,
        });
        ModuleOp(builtin::module(region).create(ctx))
    }

    /// Wrap `op`, checking it is a `builtin.module`.
    pub fn new(ctx: &IrContext, op: OpRef) -> Option<Self> {
        builtin::is_module(ctx, op).then_some(ModuleOp(op))
    }

    pub fn op(self) -> OpRef {
        self.0
    }

    pub fn body(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    /// The block top-level ops are appended to.
    pub fn body_block(self, ctx: &IrContext) -> BlockRef {
        ctx.region(self.body(ctx)).blocks[0]
    }

    /// Top-level ops, in insertion order.
    pub fn ops(self, ctx: &IrContext) -> &[OpRef] {
        &ctx.block(self.body_block(ctx)).ops
    }

    /// Top-level `func.func` ops, in insertion order.
    pub fn functions(self, ctx: &IrContext) -> impl Iterator<Item = OpRef> + '_ {
        self.ops(ctx)
            .iter()
            .copied()
            .filter(move |&op| func::is_func(ctx, op))
    }
}
