//! `cf` dialect: unstructured branches between blocks of one region.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{BlockRef, OpRef, ValueRef};
use crate::types::Attribute;

crate::symbols! {
    DIALECT => "cf",
    BR => "br",
    COND_BR => "cond_br",
    ATTR_TRUE_COUNT => "true_count",
}

/// `cf.br %args.. [^dest]`
pub fn br(dest: BlockRef, args: &[ValueRef]) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), BR())
        .operands(args.iter().copied())
        .successor(dest)
}

/// `cf.cond_br %cond, %true_args.., %false_args.. [^t, ^f] {true_count = n}`
pub fn cond_br(
    cond: ValueRef,
    true_dest: BlockRef,
    true_args: &[ValueRef],
    false_dest: BlockRef,
    false_args: &[ValueRef],
) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), COND_BR())
        .operand(cond)
        .operands(true_args.iter().copied())
        .operands(false_args.iter().copied())
        .successor(true_dest)
        .successor(false_dest)
        .attr(ATTR_TRUE_COUNT(), Attribute::IntBits(true_args.len() as u64))
}

pub fn is_br(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), BR())
}

pub fn is_cond_br(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), COND_BR())
}

/// Operand groups of a `cf.cond_br`: condition, true args, false args.
pub fn cond_br_operands(ctx: &IrContext, op: OpRef) -> Option<(ValueRef, &[ValueRef], &[ValueRef])> {
    let operands = ctx.op_operands(op);
    let (&cond, rest) = operands.split_first()?;
    let true_count = usize::try_from(ctx.op(op).attr(ATTR_TRUE_COUNT())?.as_i64()?).ok()?;
    if true_count > rest.len() {
        return None;
    }
    let (on_true, on_false) = rest.split_at(true_count);
    Some((cond, on_true, on_false))
}

/// The operands a branch passes to each of its successors, in order.
pub fn successor_operands(ctx: &IrContext, op: OpRef) -> Option<Vec<&[ValueRef]>> {
    if is_br(ctx, op) {
        return Some(vec![ctx.op_operands(op)]);
    }
    if is_cond_br(ctx, op) {
        let (_, on_true, on_false) = cond_br_operands(ctx, op)?;
        return Some(vec![on_true, on_false]);
    }
    None
}
