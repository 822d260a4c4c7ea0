//! IrContext: arena storage for every IR entity.
//!
//! Operations, values, blocks and regions live in `PrimaryMap`s owned by
//! `IrContext`. Operand and result lists use `EntityList + ListPool` so each
//! field costs four bytes. Use-chains are maintained on op creation.

use std::collections::BTreeMap;

use cranelift_entity::{EntityList, ListPool, PrimaryMap, SecondaryMap};
use smallvec::SmallVec;

use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

// ============================================================================
// Use-chain
// ============================================================================

/// Operand slot `operand_index` of `user` reads the value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: OpRef,
    pub operand_index: u32,
}

// ============================================================================
// Entity data types
// ============================================================================

/// An operation: `dialect.name`, its operands, result types and nested regions.
pub struct OperationData {
    pub dialect: Symbol,
    pub name: Symbol,
    pub operands: EntityList<ValueRef>,
    pub results: EntityList<TypeRef>,
    pub attributes: BTreeMap<Symbol, Attribute>,
    pub regions: SmallVec<[RegionRef; 4]>,
    pub successors: SmallVec<[BlockRef; 4]>,
    pub parent_block: Option<BlockRef>,
}

impl OperationData {
    /// Whether this op is `dialect.name`.
    pub fn is(&self, dialect: Symbol, name: Symbol) -> bool {
        self.dialect == dialect && self.name == name
    }

    pub fn attr(&self, key: Symbol) -> Option<&Attribute> {
        self.attributes.get(&key)
    }
}

/// An SSA value and where it comes from.
pub struct ValueData {
    pub def: ValueDef,
    pub ty: TypeRef,
}

/// A basic block; its arguments are values created with the block.
pub struct BlockData {
    pub arg_types: SmallVec<[TypeRef; 4]>,
    pub ops: SmallVec<[OpRef; 4]>,
    pub parent_region: Option<RegionRef>,
}

impl BlockData {
    /// A detached, empty block with the given argument types.
    pub fn new(arg_types: &[TypeRef]) -> Self {
        Self {
            arg_types: arg_types.iter().copied().collect(),
            ops: SmallVec::new(),
            parent_region: None,
        }
    }
}

/// An ordered list of blocks owned by at most one operation.
pub struct RegionData {
    pub blocks: SmallVec<[BlockRef; 4]>,
    pub parent_op: Option<OpRef>,
}

// ============================================================================
// IrContext
// ============================================================================

/// Owner of all IR entities of a session; entity refs index into it.
pub struct IrContext {
    ops: PrimaryMap<OpRef, OperationData>,
    values: PrimaryMap<ValueRef, ValueData>,
    blocks: PrimaryMap<BlockRef, BlockData>,
    regions: PrimaryMap<RegionRef, RegionData>,

    /// Operand slots reading each value.
    uses: SecondaryMap<ValueRef, SmallVec<[Use; 2]>>,

    pub types: TypeInterner,

    value_pool: ListPool<ValueRef>,
    type_pool: ListPool<TypeRef>,

    result_values: SecondaryMap<OpRef, EntityList<ValueRef>>,
    block_arg_values: SecondaryMap<BlockRef, EntityList<ValueRef>>,
}

impl IrContext {
    pub fn new() -> Self {
        Self {
            ops: PrimaryMap::new(),
            values: PrimaryMap::new(),
            blocks: PrimaryMap::new(),
            regions: PrimaryMap::new(),
            uses: SecondaryMap::new(),
            types: TypeInterner::new(),
            value_pool: ListPool::new(),
            type_pool: ListPool::new(),
            result_values: SecondaryMap::new(),
            block_arg_values: SecondaryMap::new(),
        }
    }

    // ========================================================================
    // Operation
    // ========================================================================

    /// Allocate `data` and one value per result type. The op is not placed
    /// in any block yet; see [`IrContext::push_op`].
    ///
    /// # Panics
    ///
    /// If `data` is already placed, or one of its regions is owned by
    /// another op.
    pub fn create_op(&mut self, data: OperationData) -> OpRef {
        assert!(
            data.parent_block.is_none(),
            "new operation is already placed in a block",
        );

        let operand_slice: SmallVec<[ValueRef; 8]> =
            data.operands.as_slice(&self.value_pool).into();
        let result_types: SmallVec<[TypeRef; 4]> = data.results.as_slice(&self.type_pool).into();
        let regions: SmallVec<[RegionRef; 4]> = data.regions.clone();

        let op = self.ops.push(data);

        for &r in &regions {
            if let Some(existing) = self.regions[r].parent_op {
                panic!("{r} is owned by {existing}, cannot move it to {op}");
            }
            self.regions[r].parent_op = Some(op);
        }

        for (idx, &val) in operand_slice.iter().enumerate() {
            self.uses[val].push(Use {
                user: op,
                operand_index: idx as u32,
            });
        }

        let results = self.new_values(&result_types, |i| ValueDef::OpResult(op, i));
        self.result_values[op] = results;

        op
    }

    pub fn op(&self, op: OpRef) -> &OperationData {
        &self.ops[op]
    }

    /// Operands must not be edited through this, the use lists would go stale.
    pub fn op_mut(&mut self, op: OpRef) -> &mut OperationData {
        &mut self.ops[op]
    }

    pub fn op_operands(&self, op: OpRef) -> &[ValueRef] {
        self.ops[op].operands.as_slice(&self.value_pool)
    }

    pub fn op_result_types(&self, op: OpRef) -> &[TypeRef] {
        self.ops[op].results.as_slice(&self.type_pool)
    }

    pub fn op_result(&self, op: OpRef, index: u32) -> ValueRef {
        self.result_values[op].as_slice(&self.value_pool)[index as usize]
    }

    pub fn op_results(&self, op: OpRef) -> &[ValueRef] {
        self.result_values[op].as_slice(&self.value_pool)
    }

    /// The op owning the region that contains `op`, if any.
    pub fn parent_op(&self, op: OpRef) -> Option<OpRef> {
        let block = self.ops[op].parent_block?;
        let region = self.blocks[block].parent_region?;
        self.regions[region].parent_op
    }

    // ========================================================================
    // Value
    // ========================================================================

    pub fn value(&self, v: ValueRef) -> &ValueData {
        &self.values[v]
    }

    pub fn value_ty(&self, v: ValueRef) -> TypeRef {
        self.values[v].ty
    }

    pub fn value_def(&self, v: ValueRef) -> ValueDef {
        self.values[v].def
    }

    // ========================================================================
    // Block
    // ========================================================================

    /// Allocate a block together with its argument values.
    pub fn create_block(&mut self, data: BlockData) -> BlockRef {
        let arg_types = data.arg_types.clone();
        let block = self.blocks.push(data);
        let args = self.new_values(&arg_types, |i| ValueDef::BlockArg(block, i));
        self.block_arg_values[block] = args;
        block
    }

    pub fn block(&self, b: BlockRef) -> &BlockData {
        &self.blocks[b]
    }

    pub fn block_arg(&self, b: BlockRef, index: u32) -> ValueRef {
        self.block_arg_values[b].as_slice(&self.value_pool)[index as usize]
    }

    pub fn block_args(&self, b: BlockRef) -> &[ValueRef] {
        self.block_arg_values[b].as_slice(&self.value_pool)
    }

    /// The last op of a block, if any.
    pub fn block_terminator(&self, b: BlockRef) -> Option<OpRef> {
        self.blocks[b].ops.last().copied()
    }

    /// Place `op` last in `block`.
    ///
    /// # Panics
    ///
    /// If `op` is already placed.
    pub fn push_op(&mut self, block: BlockRef, op: OpRef) {
        if let Some(owner) = self.ops[op].parent_block {
            panic!("{op} is already placed in {owner}");
        }
        self.ops[op].parent_block = Some(block);
        self.blocks[block].ops.push(op);
    }

    // ========================================================================
    // Region
    // ========================================================================

    /// Allocate a region and take ownership of `data.blocks`.
    ///
    /// # Panics
    ///
    /// If one of the blocks is owned by another region.
    pub fn create_region(&mut self, data: RegionData) -> RegionRef {
        let region = self.regions.push(data);

        let blocks: SmallVec<[BlockRef; 4]> = self.regions[region].blocks.clone();
        for &b in &blocks {
            self.adopt_block(region, b);
        }

        region
    }

    pub fn region(&self, r: RegionRef) -> &RegionData {
        &self.regions[r]
    }

    /// Add an unowned block after the last block of `region`.
    ///
    /// # Panics
    ///
    /// If `block` is owned by a region.
    pub fn append_block(&mut self, region: RegionRef, block: BlockRef) {
        self.adopt_block(region, block);
        self.regions[region].blocks.push(block);
    }

    fn adopt_block(&mut self, region: RegionRef, block: BlockRef) {
        if let Some(existing) = self.blocks[block].parent_region {
            panic!("{block} is owned by {existing}, cannot move it to {region}");
        }
        self.blocks[block].parent_region = Some(region);
    }

    // ========================================================================
    // Uses
    // ========================================================================

    fn new_values(
        &mut self,
        types: &[TypeRef],
        def: impl Fn(u32) -> ValueDef,
    ) -> EntityList<ValueRef> {
        let mut list = EntityList::new();
        for (i, &ty) in types.iter().enumerate() {
            let v = self.values.push(ValueData { def: def(i as u32), ty });
            list.push(v, &mut self.value_pool);
        }
        list
    }

    pub fn uses(&self, v: ValueRef) -> &[Use] {
        &self.uses[v]
    }

    pub fn has_uses(&self, v: ValueRef) -> bool {
        !self.uses[v].is_empty()
    }
}

impl Default for IrContext {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// OperationDataBuilder
// ============================================================================

/// Accumulates the parts of an operation; dialect constructors return one
/// so callers choose between [`OperationDataBuilder::create`] and
/// [`crate::OpBuilder::insert`].
#[derive(Clone, Debug)]
pub struct OperationDataBuilder {
    dialect: Symbol,
    name: Symbol,
    operands: Vec<ValueRef>,
    results: Vec<TypeRef>,
    attributes: BTreeMap<Symbol, Attribute>,
    regions: SmallVec<[RegionRef; 4]>,
    successors: SmallVec<[BlockRef; 4]>,
}

impl OperationDataBuilder {
    pub fn new(dialect: Symbol, name: Symbol) -> Self {
        Self {
            dialect,
            name,
            operands: Vec::new(),
            results: Vec::new(),
            attributes: BTreeMap::new(),
            regions: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }

    pub fn operand(mut self, v: ValueRef) -> Self {
        self.operands.push(v);
        self
    }

    pub fn operands(mut self, vs: impl IntoIterator<Item = ValueRef>) -> Self {
        self.operands.extend(vs);
        self
    }

    pub fn result(mut self, ty: TypeRef) -> Self {
        self.results.push(ty);
        self
    }

    pub fn results(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.results.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attributes.insert(key.into(), val);
        self
    }

    pub fn region(mut self, r: RegionRef) -> Self {
        self.regions.push(r);
        self
    }

    pub fn successor(mut self, b: BlockRef) -> Self {
        self.successors.push(b);
        self
    }

    pub fn successors(mut self, bs: impl IntoIterator<Item = BlockRef>) -> Self {
        self.successors.extend(bs);
        self
    }

    /// Move the operand and result lists into the context's pools.
    pub fn build(self, ctx: &mut IrContext) -> OperationData {
        let mut operands = EntityList::new();
        for v in self.operands {
            operands.push(v, &mut ctx.value_pool);
        }
        let mut results = EntityList::new();
        for ty in self.results {
            results.push(ty, &mut ctx.type_pool);
        }
        OperationData {
            dialect: self.dialect,
            name: self.name,
            operands,
            results,
            attributes: self.attributes,
            regions: self.regions,
            successors: self.successors,
            parent_block: None,
        }
    }

    /// Build and create the op in one step. The op stays detached.
    pub fn create(self, ctx: &mut IrContext) -> OpRef {
        let data = self.build(ctx);
        ctx.create_op(data)
    }
}
