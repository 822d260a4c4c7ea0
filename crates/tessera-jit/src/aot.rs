//! Ahead-of-time compilation to relocatable object files.

use cranelift_object::{ObjectBuilder, ObjectModule};
use target_lexicon::Triple;
use tessera_ir::{IrContext, ModuleOp, verify_module};

use crate::codegen::CodeGenerator;
use crate::errors::CompilationResult;
use crate::isa::{OptLevel, native_isa, target_isa};

/// Compile `module` to an object file for `target` (the host if `None`).
///
/// Defined functions are exported; declared-only functions become
/// undefined symbols for the linker to resolve.
pub fn emit_object(
    ir: &IrContext,
    module: ModuleOp,
    target: Option<Triple>,
    opt_level: OptLevel,
) -> CompilationResult<Vec<u8>> {
    verify_module(ir, module)?;
    let isa = match target {
        Some(triple) => target_isa(triple, opt_level)?,
        None => native_isa(opt_level)?,
    };

    let builder = ObjectBuilder::new(isa, "tessera", cranelift_module::default_libcall_names())?;
    let mut object = ObjectModule::new(builder);
    CodeGenerator::new(&mut object, ir).compile_module(module)?;

    let bytes = object.finish().emit()?;
    tracing::info!(bytes = bytes.len(), "emitted object file");
    Ok(bytes)
}
