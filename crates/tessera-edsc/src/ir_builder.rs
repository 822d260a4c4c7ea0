//! The capabilities the emitter needs from a target IR builder.
//!
//! [`OpBuilder`] over an [`IrContext`] is the concrete implementation; the
//! emitter itself only talks to these traits.

use tessera_ir::{
    BlockRef, BuiltinType, FloatKind, FunctionHandle, IrContext, OpBuilder, OpRef,
    OperationDataBuilder, RegionRef, Symbol, TypeInterner, TypeRef, ValueRef, VerifyError,
};

/// Read-only access to type structure.
pub trait TypeLookup {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType>;

    /// Shape of a memref type, `None` for anything else.
    fn buffer_shape(&self, ty: TypeRef) -> Option<Vec<i64>> {
        match self.builtin_type(ty)? {
            BuiltinType::MemRef { shape, .. } => Some(shape.to_vec()),
            _ => None,
        }
    }

    /// Element type of a memref type.
    fn buffer_element(&self, ty: TypeRef) -> Option<TypeRef> {
        match self.builtin_type(ty)? {
            BuiltinType::MemRef { elem, .. } => Some(elem),
            _ => None,
        }
    }
}

impl TypeLookup for TypeInterner {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType> {
        self.builtin(ty)
    }
}

impl TypeLookup for IrContext {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType> {
        self.types.builtin(ty)
    }
}

/// Insertion-point builder for one function body.
pub trait IrBuilder: TypeLookup {
    // === Types ===
    fn int_type(&mut self, width: u32) -> TypeRef;
    fn float_type(&mut self, kind: FloatKind) -> TypeRef;
    fn index_type(&mut self) -> TypeRef;
    fn value_type(&self, value: ValueRef) -> TypeRef;

    // === Operations ===
    /// Create `op` at the insertion point.
    fn insert(&mut self, op: OperationDataBuilder) -> OpRef;
    fn op_results(&self, op: OpRef) -> &[ValueRef];

    // === Blocks and regions ===
    /// Create a detached block.
    fn create_block(&mut self, arg_types: &[TypeRef]) -> BlockRef;
    /// Append a detached block to the region of the insertion block.
    fn append_block(&mut self, block: BlockRef);
    fn create_region(&mut self, blocks: &[BlockRef]) -> RegionRef;
    fn block_args(&self, block: BlockRef) -> &[ValueRef];
    fn insertion_block(&self) -> BlockRef;
    fn set_insertion_point(&mut self, block: BlockRef);

    // === Functions ===
    fn function_entry(&self, function: FunctionHandle) -> Option<BlockRef>;
    fn function_name(&self, function: FunctionHandle) -> Symbol;
    fn function_type(&self, function: FunctionHandle) -> TypeRef;
    fn verify(&self, function: FunctionHandle) -> Result<(), VerifyError>;
}

impl TypeLookup for OpBuilder<'_> {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType> {
        self.ctx().types.builtin(ty)
    }
}

impl IrBuilder for OpBuilder<'_> {
    fn int_type(&mut self, width: u32) -> TypeRef {
        self.ctx_mut().types.int(width)
    }

    fn float_type(&mut self, kind: FloatKind) -> TypeRef {
        self.ctx_mut().types.float(kind)
    }

    fn index_type(&mut self) -> TypeRef {
        self.ctx_mut().types.index()
    }

    fn value_type(&self, value: ValueRef) -> TypeRef {
        self.ctx().value_ty(value)
    }

    fn insert(&mut self, op: OperationDataBuilder) -> OpRef {
        OpBuilder::insert(self, op)
    }

    fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.ctx().op_results(op)
    }

    fn create_block(&mut self, arg_types: &[TypeRef]) -> BlockRef {
        OpBuilder::create_block(self, arg_types)
    }

    fn append_block(&mut self, block: BlockRef) {
        OpBuilder::append_block(self, block)
    }

    fn create_region(&mut self, blocks: &[BlockRef]) -> RegionRef {
        OpBuilder::create_region(self, blocks)
    }

    fn block_args(&self, block: BlockRef) -> &[ValueRef] {
        self.ctx().block_args(block)
    }

    fn insertion_block(&self) -> BlockRef {
        OpBuilder::insertion_block(self)
    }

    fn set_insertion_point(&mut self, block: BlockRef) {
        OpBuilder::set_insertion_point(self, block)
    }

    fn function_entry(&self, function: FunctionHandle) -> Option<BlockRef> {
        function.entry_block(self.ctx())
    }

    fn function_name(&self, function: FunctionHandle) -> Symbol {
        function.name(self.ctx())
    }

    fn function_type(&self, function: FunctionHandle) -> TypeRef {
        function.function_type(self.ctx())
    }

    fn verify(&self, function: FunctionHandle) -> Result<(), VerifyError> {
        tessera_ir::verify_function(self.ctx(), function)
    }
}
