//! Insertion-point builder over an `IrContext`.

use smallvec::SmallVec;

use crate::context::{BlockData, IrContext, OperationDataBuilder, RegionData};
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef};

/// Appends ops to the end of a current block.
pub struct OpBuilder<'a> {
    ctx: &'a mut IrContext,
    block: BlockRef,
}

impl<'a> OpBuilder<'a> {
    /// Builder inserting at the end of `block`.
    pub fn at_end(ctx: &'a mut IrContext, block: BlockRef) -> Self {
        Self { ctx, block }
    }

    pub fn ctx(&self) -> &IrContext {
        self.ctx
    }

    pub fn ctx_mut(&mut self) -> &mut IrContext {
        self.ctx
    }

    pub fn insertion_block(&self) -> BlockRef {
        self.block
    }

    pub fn set_insertion_point(&mut self, block: BlockRef) {
        self.block = block;
    }

    /// Create `op` and append it to the insertion block.
    pub fn insert(&mut self, op: OperationDataBuilder) -> OpRef {
        let op = op.create(self.ctx);
        self.ctx.push_op(self.block, op);
        op
    }

    /// Create a detached block.
    pub fn create_block(&mut self, arg_types: &[TypeRef]) -> BlockRef {
        self.ctx.create_block(BlockData::new(arg_types))
    }

    pub fn create_region(&mut self, blocks: &[BlockRef]) -> RegionRef {
        self.ctx.create_region(RegionData {
            blocks: SmallVec::from_slice(blocks),
            parent_op: None,
        })
    }

    /// Append a detached block to the region holding the insertion block.
    ///
    /// # Panics
    ///
    /// Panics if the insertion block is itself detached.
    pub fn append_block(&mut self, block: BlockRef) {
        let Some(region) = self.ctx.block(self.block).parent_region else {
            panic!(
                "append_block: insertion block {} is not inside a region",
                self.block
            );
        };
        self.ctx.append_block(region, block);
    }
}
