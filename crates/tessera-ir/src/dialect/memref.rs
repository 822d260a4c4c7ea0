//! `memref` dialect: element loads/stores and dimension queries on buffers.

use crate::context::{IrContext, OperationDataBuilder};
use crate::refs::{OpRef, TypeRef, ValueRef};
use crate::types::Attribute;

crate::symbols! {
    DIALECT => "memref",
    LOAD => "load",
    STORE => "store",
    DIM => "dim",
    ATTR_INDEX => "index",
}

/// `memref.load %mem, %i0, .. : elem`
pub fn load(mem: ValueRef, indices: &[ValueRef], elem_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), LOAD())
        .operand(mem)
        .operands(indices.iter().copied())
        .result(elem_ty)
}

/// `memref.store %value, %mem, %i0, ..`
pub fn store(value: ValueRef, mem: ValueRef, indices: &[ValueRef]) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), STORE())
        .operand(value)
        .operand(mem)
        .operands(indices.iter().copied())
}

/// `memref.dim %mem {index = d} : index`
pub fn dim(mem: ValueRef, dim: u32, index_ty: TypeRef) -> OperationDataBuilder {
    OperationDataBuilder::new(DIALECT(), DIM())
        .operand(mem)
        .attr(ATTR_INDEX(), Attribute::IntBits(u64::from(dim)))
        .result(index_ty)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemRefOp {
    Load,
    Store,
    Dim(u32),
}

pub fn classify(ctx: &IrContext, op: OpRef) -> Option<MemRefOp> {
    let data = ctx.op(op);
    if data.dialect != DIALECT() {
        return None;
    }
    if data.name == LOAD() {
        Some(MemRefOp::Load)
    } else if data.name == STORE() {
        Some(MemRefOp::Store)
    } else if data.name == DIM() {
        let d = data.attr(ATTR_INDEX())?.as_i64()?;
        Some(MemRefOp::Dim(u32::try_from(d).ok()?))
    } else {
        None
    }
}
