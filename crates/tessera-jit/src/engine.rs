//! In-process JIT compilation.

use std::collections::HashMap;

use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::FuncId;
use tessera_ir::{FunctionHandle, IrContext, ModuleOp, verify_module};

use crate::codegen::CodeGenerator;
use crate::errors::{CompilationError, CompilationErrorKind, CompilationResult};
use crate::isa::{OptLevel, native_isa};

/// Addresses of external functions, by symbol name.
pub type SymbolMap = HashMap<String, usize>;

/// Native code for every defined function of a module.
///
/// The code lives as long as the engine; addresses obtained from
/// [`Engine::function_address`] dangle once it is dropped.
pub struct Engine {
    module: Option<JITModule>,
    functions: HashMap<String, FuncId>,
}

impl Engine {
    /// Verify `module` and compile it for the host.
    ///
    /// Every declared-only function must have an entry in `symbols`.
    pub fn new(
        ir: &IrContext,
        module: ModuleOp,
        opt_level: OptLevel,
        symbols: &SymbolMap,
    ) -> CompilationResult<Self> {
        verify_module(ir, module)?;
        for op in module.functions(ir) {
            let Some(f) = FunctionHandle::from_op(ir, op) else {
                continue;
            };
            let name = f.name(ir).to_string();
            if !f.is_defined(ir) && !symbols.contains_key(&name) {
                return Err(CompilationErrorKind::UnresolvedSymbol(name).into());
            }
        }

        let isa = native_isa(opt_level)?;
        let mut builder = JITBuilder::with_isa(isa, cranelift_module::default_libcall_names());
        for (name, &addr) in symbols {
            builder.symbol(name.clone(), addr as *const u8);
        }
        let mut jit = JITModule::new(builder);

        let compiled = CodeGenerator::new(&mut jit, ir).compile_module(module)?;
        jit.finalize_definitions()?;

        let functions: HashMap<String, FuncId> = compiled
            .into_iter()
            .filter(|c| c.defined)
            .map(|c| (c.name, c.id))
            .collect();
        tracing::info!(functions = functions.len(), %opt_level, "compiled module");
        Ok(Engine {
            module: Some(jit),
            functions,
        })
    }

    /// Entry address of the defined function `name`.
    ///
    /// The caller is responsible for transmuting it to the right
    /// `extern "C"` signature and for not calling it after the engine is
    /// dropped.
    pub fn function_address(&self, name: &str) -> CompilationResult<*const u8> {
        match (&self.module, self.functions.get(name)) {
            (Some(module), Some(&id)) => Ok(module.get_finalized_function(id)),
            _ => Err(CompilationError::function_not_found(name)),
        }
    }

    /// Names of the compiled functions, sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: function pointers handed out by `function_address`
            // are documented not to outlive the engine.
            unsafe { module.free_memory() };
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("functions", &self.function_names())
            .finish_non_exhaustive()
    }
}
