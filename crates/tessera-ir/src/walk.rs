//! Recursive operation traversal.

use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Controls whether to descend into children during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    /// Continue walking and descend into nested regions.
    Advance,
    /// Skip the nested regions of the current operation.
    Skip,
}

/// Walk all operations in a region recursively.
pub fn walk_region<B>(
    ctx: &IrContext,
    region: RegionRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &block in &ctx.region(region).blocks {
        walk_block(ctx, block, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk all operations in a block recursively.
pub fn walk_block<B>(
    ctx: &IrContext,
    block: BlockRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &op in &ctx.block(block).ops {
        walk_op(ctx, op, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk an operation and its nested regions recursively.
pub fn walk_op<B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(op) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &region in &ctx.op(op).regions {
        walk_region(ctx, region, f)?;
    }
    ControlFlow::Continue(())
}

/// Collect every op nested under `op` (excluding `op` itself), pre-order.
pub fn nested_ops(ctx: &IrContext, op: OpRef) -> Vec<OpRef> {
    let mut out = Vec::new();
    for &region in &ctx.op(op).regions {
        let _ = walk_region::<()>(ctx, region, &mut |o| {
            out.push(o);
            ControlFlow::Continue(WalkAction::Advance)
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::OpBuilder;
    use crate::dialect::{arith, func, scf};
    use crate::function::FunctionHandle;
    use crate::module::ModuleOp;
    use crate::types::Attribute;

    /// `f() { c0; c1; for c0..c1 step c1 { c2; yield }; return }`
    fn loop_function(ctx: &mut IrContext) -> (FunctionHandle, OpRef) {
        let module = ModuleOp::create(ctx);
        let index = ctx.types.index();
        let f = FunctionHandle::make(ctx, module, "f", &[], &[]).unwrap();
        let entry = f.entry_block(ctx).unwrap();
        let mut b = OpBuilder::at_end(ctx, entry);
        let c0 = b.insert(arith::constant(index, Attribute::from(0i64)));
        let c1 = b.insert(arith::constant(index, Attribute::from(1i64)));
        let (v0, v1) = (b.ctx().op_result(c0, 0), b.ctx().op_result(c1, 0));
        let body = b.create_block(&[index]);
        let region = b.create_region(&[body]);
        let for_op = b.insert(scf::for_loop(v0, v1, v1, region));
        b.set_insertion_point(body);
        b.insert(arith::constant(index, Attribute::from(2i64)));
        b.insert(scf::yield_());
        b.set_insertion_point(entry);
        b.insert(func::return_(&[]));
        (f, for_op)
    }

    #[test]
    fn walk_region_visits_nested_ops() {
        let mut ctx = IrContext::new();
        let (f, _) = loop_function(&mut ctx);
        let mut count = 0;
        let _ = walk_region::<()>(&ctx, f.body(&ctx), &mut |_op| {
            count += 1;
            ControlFlow::Continue(WalkAction::Advance)
        });
        // c0, c1, for, c2, yield, return
        assert_eq!(count, 6);
    }

    #[test]
    fn skip_does_not_descend() {
        let mut ctx = IrContext::new();
        let (f, for_op) = loop_function(&mut ctx);
        let mut seen = Vec::new();
        let _ = walk_region::<()>(&ctx, f.body(&ctx), &mut |op| {
            seen.push(op);
            if op == for_op {
                ControlFlow::Continue(WalkAction::Skip)
            } else {
                ControlFlow::Continue(WalkAction::Advance)
            }
        });
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn break_stops_early() {
        let mut ctx = IrContext::new();
        let (f, for_op) = loop_function(&mut ctx);
        let result = walk_region(&ctx, f.body(&ctx), &mut |op| {
            if op == for_op {
                ControlFlow::Break(op)
            } else {
                ControlFlow::Continue(WalkAction::Advance)
            }
        });
        assert_eq!(result, ControlFlow::Break(for_op));
        assert_eq!(nested_ops(&ctx, for_op).len(), 2);
    }
}
