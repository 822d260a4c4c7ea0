//! Compilation errors.

use derive_more::{Display, From};
use tessera_ir::VerifyError;

pub type CompilationResult<T> = Result<T, CompilationError>;

/// Any failure of [`crate::Engine::new`] or [`crate::emit_object`].
///
/// The kind is boxed so results stay one pointer wide on the happy path.
#[derive(Display, Debug, From)]
#[display("{kind}")]
pub struct CompilationError {
    #[from]
    kind: Box<CompilationErrorKind>,
}

impl<E> From<E> for CompilationError
where
    CompilationErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        CompilationError {
            kind: Box::new(CompilationErrorKind::from(error)),
        }
    }
}

impl CompilationError {
    pub fn kind(&self) -> &CompilationErrorKind {
        &self.kind
    }

    pub(crate) fn codegen(msg: impl std::fmt::Display) -> Self {
        CompilationErrorKind::CodegenError(msg.to_string()).into()
    }

    pub(crate) fn unsupported_type(ty: impl std::fmt::Display) -> Self {
        CompilationErrorKind::UnsupportedType(ty.to_string()).into()
    }

    pub(crate) fn unsupported_operation(op: impl std::fmt::Display) -> Self {
        CompilationErrorKind::UnsupportedOperation(op.to_string()).into()
    }

    pub(crate) fn function_not_found(name: impl std::fmt::Display) -> Self {
        CompilationErrorKind::FunctionNotFound(name.to_string()).into()
    }

    pub(crate) fn invalid_target(msg: impl std::fmt::Display) -> Self {
        CompilationErrorKind::InvalidTarget(msg.to_string()).into()
    }
}

#[derive(Display, Debug, From)]
pub enum CompilationErrorKind {
    // === Lowering ===
    #[display("cannot lower type {_0}")]
    UnsupportedType(String),

    #[display("cannot lower operation {_0}")]
    UnsupportedOperation(String),

    #[display("no compiled function named @{_0}")]
    FunctionNotFound(String),

    #[display("declared function @{_0} has no registered address")]
    UnresolvedSymbol(String),

    #[display("{_0}")]
    #[from]
    Verify(VerifyError),

    // === Cranelift ===
    #[display("code generation failed: {_0}")]
    CodegenError(String),

    #[display("{_0}")]
    #[from]
    ModuleError(cranelift_module::ModuleError),

    #[display("bad cranelift setting: {_0}")]
    CraneliftError(String),

    #[display("unsupported target: {_0}")]
    InvalidTarget(String),

    #[display("cannot write object file: {_0}")]
    #[from]
    ObjectError(object::write::Error),
}

impl From<cranelift_codegen::settings::SetError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::settings::SetError) -> Self {
        CompilationErrorKind::CraneliftError(error.to_string())
    }
}

impl From<cranelift_codegen::isa::LookupError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::isa::LookupError) -> Self {
        CompilationErrorKind::InvalidTarget(error.to_string())
    }
}

impl From<cranelift_codegen::CodegenError> for CompilationErrorKind {
    fn from(error: cranelift_codegen::CodegenError) -> Self {
        CompilationErrorKind::CodegenError(error.to_string())
    }
}

impl std::error::Error for CompilationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self.kind() {
            CompilationErrorKind::ModuleError(e) => Some(e),
            CompilationErrorKind::ObjectError(e) => Some(e),
            CompilationErrorKind::Verify(e) => Some(e),
            _ => None,
        }
    }
}
