//! Function handles: declare, define and inspect `func.func` ops.
//!
//! A function with zero body blocks is a declaration; `define` turns it
//! into a definition by adding an empty entry block whose arguments are
//! the function inputs.

use smallvec::{SmallVec, smallvec};

use crate::context::{BlockData, IrContext, RegionData};
use crate::dialect::func;
use crate::errors::{IrError, IrResult};
use crate::module::ModuleOp;
use crate::refs::{BlockRef, OpRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::BuiltinType;

/// Handle to a `func.func` op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FunctionHandle(OpRef);

impl FunctionHandle {
    /// Add a bodyless function taking `inputs` and returning `results`.
    ///
    /// Fails if the name is taken.
    pub fn declare(
        ctx: &mut IrContext,
        module: ModuleOp,
        name: &str,
        inputs: &[TypeRef],
        results: &[TypeRef],
    ) -> IrResult<Self> {
        if Self::lookup(ctx, module, name).is_some() {
            return Err(IrError::DuplicateSymbol(name.to_owned()));
        }
        let fn_ty = ctx.types.function(inputs, results);
        let body = ctx.create_region(RegionData {
            blocks: smallvec![],
            parent_op: None,
        });
        let op = func::func(Symbol::from_dynamic(name), fn_ty, body).create(ctx);
        ctx.push_op(module.body_block(ctx), op);
        tracing::debug!(function = name, "declared function");
        Ok(FunctionHandle(op))
    }

    /// Declare and immediately define.
    pub fn make(
        ctx: &mut IrContext,
        module: ModuleOp,
        name: &str,
        inputs: &[TypeRef],
        results: &[TypeRef],
    ) -> IrResult<Self> {
        let f = Self::declare(ctx, module, name, inputs, results)?;
        f.define(ctx);
        Ok(f)
    }

    /// Find a function of `module` by name.
    pub fn lookup(ctx: &IrContext, module: ModuleOp, name: &str) -> Option<Self> {
        module
            .functions(ctx)
            .find(|&op| func::signature(ctx, op).is_some_and(|(sym, _)| sym == name))
            .map(FunctionHandle)
    }

    /// Wrap `op`, checking it is a `func.func`.
    pub fn from_op(ctx: &IrContext, op: OpRef) -> Option<Self> {
        func::is_func(ctx, op).then_some(FunctionHandle(op))
    }

    /// Add the entry block if the function has none.
    ///
    /// Returns `true` if a block was added. Calling it again is a no-op
    /// returning `false`.
    pub fn define(self, ctx: &mut IrContext) -> bool {
        if self.is_defined(ctx) {
            return false;
        }
        let inputs = self.inputs(ctx);
        let entry = ctx.create_block(BlockData::new(&inputs));
        ctx.append_block(self.body(ctx), entry);
        tracing::debug!(function = %self.name(ctx), "defined function");
        true
    }

    pub fn op(self) -> OpRef {
        self.0
    }

    pub fn name(self, ctx: &IrContext) -> Symbol {
        self.signature(ctx).0
    }

    pub fn function_type(self, ctx: &IrContext) -> TypeRef {
        self.signature(ctx).1
    }

    fn signature(self, ctx: &IrContext) -> (Symbol, TypeRef) {
        func::signature(ctx, self.0).unwrap_or_else(|| {
            unreachable!("{} is checked to be a func.func on construction", self.0)
        })
    }

    pub fn inputs(self, ctx: &IrContext) -> SmallVec<[TypeRef; 4]> {
        match ctx.types.builtin(self.function_type(ctx)) {
            Some(BuiltinType::Function { inputs, .. }) => inputs,
            _ => SmallVec::new(),
        }
    }

    pub fn results(self, ctx: &IrContext) -> SmallVec<[TypeRef; 2]> {
        match ctx.types.builtin(self.function_type(ctx)) {
            Some(BuiltinType::Function { results, .. }) => results,
            _ => SmallVec::new(),
        }
    }

    /// Number of parameters.
    pub fn arity(self, ctx: &IrContext) -> usize {
        self.inputs(ctx).len()
    }

    pub fn body(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn block_count(self, ctx: &IrContext) -> usize {
        ctx.region(self.body(ctx)).blocks.len()
    }

    pub fn is_defined(self, ctx: &IrContext) -> bool {
        self.block_count(ctx) > 0
    }

    pub fn entry_block(self, ctx: &IrContext) -> Option<BlockRef> {
        ctx.region(self.body(ctx)).blocks.first().copied()
    }

    /// Entry block arguments; empty for declarations.
    pub fn arguments(self, ctx: &IrContext) -> &[ValueRef] {
        match self.entry_block(ctx) {
            Some(entry) => ctx.block_args(entry),
            None => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_is_idempotent() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let i32_ty = ctx.types.int(32);
        let f = FunctionHandle::declare(&mut ctx, module, "f", &[i32_ty, i32_ty], &[i32_ty]).unwrap();

        assert!(!f.is_defined(&ctx));
        assert!(f.define(&mut ctx));
        assert!(!f.define(&mut ctx));
        assert_eq!(f.block_count(&ctx), 1);
        assert_eq!(f.arguments(&ctx).len(), 2);
        assert!(ctx.block(f.entry_block(&ctx).unwrap()).ops.is_empty());
    }

    #[test]
    fn make_defines_and_lookup_finds() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let i32_ty = ctx.types.int(32);
        let f = FunctionHandle::make(&mut ctx, module, "add", &[i32_ty, i32_ty], &[i32_ty]).unwrap();

        assert!(f.is_defined(&ctx));
        assert_eq!(f.name(&ctx), "add");
        assert_eq!(f.arity(&ctx), 2);
        assert_eq!(FunctionHandle::lookup(&ctx, module, "add"), Some(f));
        assert_eq!(FunctionHandle::lookup(&ctx, module, "sub"), None);
    }

    #[test]
    fn signature_is_built_from_the_type_lists() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let i32_ty = ctx.types.int(32);
        let index = ctx.types.index();
        let f = FunctionHandle::declare(&mut ctx, module, "f", &[i32_ty, index], &[index]).unwrap();

        assert_eq!(f.inputs(&ctx).as_slice(), &[i32_ty, index]);
        assert_eq!(f.results(&ctx).as_slice(), &[index]);
        let expected = ctx.types.function(&[i32_ty, index], &[index]);
        assert_eq!(f.function_type(&ctx), expected);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        FunctionHandle::declare(&mut ctx, module, "f", &[], &[]).unwrap();
        let err = FunctionHandle::declare(&mut ctx, module, "f", &[], &[]).unwrap_err();
        assert!(matches!(err, IrError::DuplicateSymbol(ref n) if n == "f"));
        assert_eq!(module.functions(&ctx).count(), 1);
    }
}
