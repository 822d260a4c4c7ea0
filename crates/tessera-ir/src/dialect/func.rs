//! `func` dialect: function definitions, function constants, calls and returns.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::symbols! {
    DIALECT => "func",
    FUNC => "func",
    CONSTANT => "constant",
    CALL_INDIRECT => "call_indirect",
    RETURN => "return",
    ATTR_SYM_NAME => "sym_name",
    ATTR_TYPE => "type",
    ATTR_CALLEE => "callee",
}

/// `func.func @name` with the given function type and body region.
///
/// An empty region makes the function a declaration.
pub fn func(name: Symbol, fn_ty: TypeRef, body: RegionRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), FUNC())
        .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
        .attr(ATTR_TYPE(), Attribute::Type(fn_ty))
        .region(body)
}

/// `func.constant {callee = @name} : fn_ty`: the address of a function as a value.
pub fn constant(callee: Symbol, fn_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), CONSTANT())
        .attr(ATTR_CALLEE(), Attribute::Symbol(callee))
        .result(fn_ty)
}

/// `func.call_indirect %callee, %args..` with zero or more results.
pub fn call_indirect(callee: ValueRef, args: &[ValueRef], results: &[TypeRef]) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), CALL_INDIRECT())
        .operand(callee)
        .operands(args.iter().copied())
        .results(results.iter().copied())
}

pub fn return_(values: &[ValueRef]) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), RETURN()).operands(values.iter().copied())
}

pub fn is_func(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), FUNC())
}

pub fn is_return(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), RETURN())
}

pub fn is_call_indirect(ctx: &IrContext, op: OpRef) -> bool {
    ctx.op(op).is(DIALECT(), CALL_INDIRECT())
}

/// The callee symbol of a `func.constant`.
pub fn constant_callee(ctx: &IrContext, op: OpRef) -> Option<Symbol> {
    let data = ctx.op(op);
    if !data.is(DIALECT(), CONSTANT()) {
        return None;
    }
    match data.attr(ATTR_CALLEE()) {
        Some(Attribute::Symbol(s)) => Some(*s),
        _ => None,
    }
}

/// Name and type of a `func.func`.
pub fn signature(ctx: &IrContext, op: OpRef) -> Option<(Symbol, TypeRef)> {
    let data = ctx.op(op);
    if !data.is(DIALECT(), FUNC()) {
        return None;
    }
    let name = match data.attr(ATTR_SYM_NAME()) {
        Some(Attribute::Symbol(s)) => *s,
        _ => return None,
    };
    match data.attr(ATTR_TYPE()) {
        Some(Attribute::Type(t)) => Some((name, *t)),
        _ => None,
    }
}
