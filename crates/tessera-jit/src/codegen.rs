//! Module-level code generation.
//!
//! Declares every function of a tessera module in a Cranelift [`Module`]
//! (defined functions exported, bodyless ones imported), then translates
//! the bodies. Shared by the JIT engine and object emission.

use std::collections::HashMap;

use cranelift_codegen::ir::types as cl_types;
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_module::{FuncId, Linkage, Module};
use tessera_ir::dialect::func;
use tessera_ir::walk::nested_ops;
use tessera_ir::{FunctionHandle, IrContext, ModuleOp, Symbol};

use crate::errors::{CompilationError, CompilationResult};
use crate::translate::{FunctionTranslator, translate_signature};

/// Code generator from tessera IR to Cranelift IR
pub(crate) struct CodeGenerator<'m, M: Module> {
    module: &'m mut M,
    ir: &'m IrContext,
    /// Map from function names to their IDs
    functions: HashMap<Symbol, FuncId>,
    func_ctx: FunctionBuilderContext,
}

/// A function as declared in the Cranelift module.
pub(crate) struct Compiled {
    pub(crate) name: String,
    pub(crate) id: FuncId,
    pub(crate) defined: bool,
}

impl<'m, M: Module> CodeGenerator<'m, M> {
    pub(crate) fn new(module: &'m mut M, ir: &'m IrContext) -> Self {
        Self {
            module,
            ir,
            functions: HashMap::new(),
            func_ctx: FunctionBuilderContext::new(),
        }
    }

    /// Declare all functions of `module`, then define every one that has a
    /// body.
    pub(crate) fn compile_module(&mut self, module: ModuleOp) -> CompilationResult<Vec<Compiled>> {
        let ir = self.ir;
        let handles: Vec<FunctionHandle> = module
            .functions(ir)
            .filter_map(|op| FunctionHandle::from_op(ir, op))
            .collect();

        let mut compiled = Vec::with_capacity(handles.len());
        for &f in &handles {
            compiled.push(self.declare_function(f)?);
        }
        for &f in &handles {
            if f.is_defined(ir) {
                self.define_function(f)?;
            }
        }
        Ok(compiled)
    }

    fn declare_function(&mut self, f: FunctionHandle) -> CompilationResult<Compiled> {
        let ir = self.ir;
        let name = f.name(ir);
        let call_conv = self.module.isa().default_call_conv();
        let pointer = self.pointer_type();
        let sig = translate_signature(ir, f.function_type(ir), call_conv, pointer)?;
        let defined = f.is_defined(ir);
        let linkage = if defined {
            Linkage::Export
        } else {
            Linkage::Import
        };
        let id = self
            .module
            .declare_function(&name.to_string(), linkage, &sig)?;
        self.functions.insert(name, id);
        tracing::debug!(function = %name, ?linkage, "declared function");
        Ok(Compiled {
            name: name.to_string(),
            id,
            defined,
        })
    }

    fn define_function(&mut self, f: FunctionHandle) -> CompilationResult<()> {
        let ir = self.ir;
        let name = f.name(ir);
        let id = *self
            .functions
            .get(&name)
            .ok_or_else(|| CompilationError::function_not_found(name))?;

        let mut ctx = self.module.make_context();
        ctx.func.signature = self
            .module
            .declarations()
            .get_function_decl(id)
            .signature
            .clone();

        // Callees referenced through func.constant
        let mut func_refs = HashMap::new();
        for op in nested_ops(ir, f.op()) {
            let Some(callee) = func::constant_callee(ir, op) else {
                continue;
            };
            if func_refs.contains_key(&callee) {
                continue;
            }
            let callee_id = *self
                .functions
                .get(&callee)
                .ok_or_else(|| CompilationError::function_not_found(callee))?;
            let func_ref = self.module.declare_func_in_func(callee_id, &mut ctx.func);
            func_refs.insert(callee, func_ref);
        }

        let call_conv = self.module.isa().default_call_conv();
        let pointer = self.pointer_type();
        let builder = FunctionBuilder::new(&mut ctx.func, &mut self.func_ctx);
        FunctionTranslator::new(ir, builder, pointer, call_conv, &func_refs).translate_function(f)?;

        self.module.define_function(id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        tracing::debug!(function = %name, "defined function");
        Ok(())
    }

    fn pointer_type(&self) -> cl_types::Type {
        self.module.isa().pointer_type()
    }
}
