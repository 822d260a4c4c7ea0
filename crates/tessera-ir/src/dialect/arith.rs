//! `arith` dialect: constants, arithmetic, comparisons and selection.
//!
//! Ops are type-generic: whether `arith.add` is an integer or a float add is
//! decided by its result type.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::symbols! {
    DIALECT => "arith",
    CONST => "const",
    NEG => "neg",
    SELECT => "select",
    ATTR_VALUE => "value",
}

/// Two-operand arithmetic/logic ops whose result has the operand type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Max,
    Min,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 9] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Rem,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Max,
        BinaryOp::Min,
    ];

    pub fn symbol(self) -> Symbol {
        Symbol::new(match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
        })
    }
}

/// Comparison predicates. Integers compare signed, floats ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmpPredicate {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpPredicate {
    pub const ALL: [CmpPredicate; 6] = [
        CmpPredicate::Eq,
        CmpPredicate::Ne,
        CmpPredicate::Lt,
        CmpPredicate::Le,
        CmpPredicate::Gt,
        CmpPredicate::Ge,
    ];

    pub fn symbol(self) -> Symbol {
        Symbol::new(match self {
            CmpPredicate::Eq => "cmp_eq",
            CmpPredicate::Ne => "cmp_ne",
            CmpPredicate::Lt => "cmp_lt",
            CmpPredicate::Le => "cmp_le",
            CmpPredicate::Gt => "cmp_gt",
            CmpPredicate::Ge => "cmp_ge",
        })
    }
}

pub fn constant(result_ty: TypeRef, value: Attribute) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), CONST())
        .attr(ATTR_VALUE(), value)
        .result(result_ty)
}

pub fn binary(op: BinaryOp, lhs: ValueRef, rhs: ValueRef, result_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), op.symbol())
        .operand(lhs)
        .operand(rhs)
        .result(result_ty)
}

/// Comparison producing `bool_ty` (expected to be `i1`).
pub fn cmp(pred: CmpPredicate, lhs: ValueRef, rhs: ValueRef, bool_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), pred.symbol())
        .operand(lhs)
        .operand(rhs)
        .result(bool_ty)
}

pub fn neg(operand: ValueRef, result_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), NEG())
        .operand(operand)
        .result(result_ty)
}

pub fn select(cond: ValueRef, on_true: ValueRef, on_false: ValueRef, result_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), SELECT())
        .operand(cond)
        .operand(on_true)
        .operand(on_false)
        .result(result_ty)
}

/// Decoded `arith` op.
#[derive(Clone, Debug, PartialEq)]
pub enum ArithOp {
    Const(Attribute),
    Binary(BinaryOp),
    Cmp(CmpPredicate),
    Neg,
    Select,
}

/// Decode an op of the `arith` dialect; `None` for anything else.
pub fn classify(ctx: &IrContext, op: OpRef) -> Option<ArithOp> {
    let data = ctx.op(op);
    if data.dialect != DIALECT() {
        return None;
    }
    let name = data.name;
    if name == CONST() {
        return data.attr(ATTR_VALUE()).cloned().map(ArithOp::Const);
    }
    if name == NEG() {
        return Some(ArithOp::Neg);
    }
    if name == SELECT() {
        return Some(ArithOp::Select);
    }
    if let Some(op) = BinaryOp::ALL.into_iter().find(|b| b.symbol() == name) {
        return Some(ArithOp::Binary(op));
    }
    CmpPredicate::ALL
        .into_iter()
        .find(|p| p.symbol() == name)
        .map(ArithOp::Cmp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_round_trips_every_op() {
        let mut ctx = IrContext::new();
        let i32_ty = ctx.types.int(32);
        let i1 = ctx.types.bool();
        let c = constant(i32_ty, Attribute::from(7i64)).create(&mut ctx);
        let v = ctx.op_result(c, 0);
        assert_eq!(
            classify(&ctx, c),
            Some(ArithOp::Const(Attribute::from(7i64)))
        );

        for op in BinaryOp::ALL {
            let o = binary(op, v, v, i32_ty).create(&mut ctx);
            assert_eq!(classify(&ctx, o), Some(ArithOp::Binary(op)));
        }
        for pred in CmpPredicate::ALL {
            let o = cmp(pred, v, v, i1).create(&mut ctx);
            assert_eq!(classify(&ctx, o), Some(ArithOp::Cmp(pred)));
        }
        let n = neg(v, i32_ty).create(&mut ctx);
        assert_eq!(classify(&ctx, n), Some(ArithOp::Neg));
    }

    #[test]
    fn foreign_ops_are_not_arith() {
        let mut ctx = IrContext::new();
        let op = OperationDataBuilder::new(Symbol::new("test"), Symbol::new("add")).create(&mut ctx);
        assert_eq!(classify(&ctx, op), None);
    }
}
