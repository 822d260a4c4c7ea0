//! The module facade: one IR module, its functions, and its compiled code.

use std::str::FromStr;

use derive_more::{Display, From};
use target_lexicon::Triple;
use tessera_edsc::{EdscContext, EdscError, Emitter, TypeLookup};
use tessera_ir::{
    BuiltinType, FloatKind, FunctionHandle, IrContext, IrError, ModuleOp, OpBuilder, TypeRef,
    VerifyError, print_op, verify_module,
};
use tessera_jit::{CompilationError, Engine, OptLevel, SymbolMap, init_native_target};

pub type ModuleResult<T> = Result<T, ModuleError>;

#[derive(Display, Debug, From)]
pub enum ModuleError {
    #[display("{_0}")]
    #[from]
    Ir(IrError),

    #[display("{_0}")]
    #[from]
    Edsc(EdscError),

    #[display("{_0}")]
    #[from]
    Verify(VerifyError),

    #[display("{_0}")]
    #[from]
    Compilation(CompilationError),

    #[display("module has not been compiled")]
    NotCompiled,

    #[display("no function named @{_0}")]
    UnknownFunction(String),

    #[display("`{_0}` is not a scalar type")]
    InvalidScalarType(String),

    #[display("invalid buffer dimension {_0}")]
    InvalidShape(i64),
}

impl std::error::Error for ModuleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ModuleError::Ir(e) => Some(e),
            ModuleError::Edsc(e) => Some(e),
            ModuleError::Verify(e) => Some(e),
            ModuleError::Compilation(e) => Some(e),
            _ => None,
        }
    }
}

/// Element types a module can name directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    BF16,
    F16,
    F32,
    F64,
    /// Signless integer of the given width.
    Int(u32),
    Index,
}

impl FromStr for ScalarKind {
    type Err = ModuleError;

    fn from_str(s: &str) -> ModuleResult<Self> {
        let kind = match s {
            "bf16" => ScalarKind::BF16,
            "f16" => ScalarKind::F16,
            "f32" => ScalarKind::F32,
            "f64" => ScalarKind::F64,
            "index" => ScalarKind::Index,
            _ => match s.strip_prefix('i').map(str::parse::<u32>) {
                Some(Ok(width)) if width > 0 => ScalarKind::Int(width),
                _ => return Err(ModuleError::InvalidScalarType(s.to_owned())),
            },
        };
        Ok(kind)
    }
}

/// An IR module together with the state needed to run it.
///
/// Functions are added and filled through [`Module::emitter`]; [`Module::compile`]
/// then JIT-compiles the whole module. Any change made after compiling
/// discards the compiled code, so addresses must be fetched again after the
/// next `compile`.
pub struct Module {
    ir: IrContext,
    module: ModuleOp,
    opt_level: OptLevel,
    symbols: SymbolMap,
    engine: Option<Box<Engine>>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Self::with_opt_level(OptLevel::default())
    }

    pub fn with_opt_level(opt_level: OptLevel) -> Self {
        let mut ir = IrContext::new();
        let module = ModuleOp::create(&mut ir);
        Module {
            ir,
            module,
            opt_level,
            symbols: SymbolMap::new(),
            engine: None,
        }
    }

    pub fn ir_context(&self) -> &IrContext {
        &self.ir
    }

    pub fn module_op(&self) -> ModuleOp {
        self.module
    }

    pub fn opt_level(&self) -> OptLevel {
        self.opt_level
    }

    // ========================================================================
    // Types
    // ========================================================================

    pub fn scalar_type(&mut self, kind: ScalarKind) -> ModuleResult<TypeRef> {
        let types = &mut self.ir.types;
        Ok(match kind {
            ScalarKind::BF16 => types.float(FloatKind::BF16),
            ScalarKind::F16 => types.float(FloatKind::F16),
            ScalarKind::F32 => types.float(FloatKind::F32),
            ScalarKind::F64 => types.float(FloatKind::F64),
            ScalarKind::Int(0) => return Err(ModuleError::InvalidScalarType("i0".to_owned())),
            ScalarKind::Int(width) => types.int(width),
            ScalarKind::Index => types.index(),
        })
    }

    /// Scalar type from its textual name: `f32`, `i8`, `index`, ...
    pub fn parse_scalar_type(&mut self, name: &str) -> ModuleResult<TypeRef> {
        let kind = name.parse()?;
        self.scalar_type(kind)
    }

    pub fn index_type(&mut self) -> TypeRef {
        self.ir.types.index()
    }

    /// Buffer of `elem` with one entry of `shape` per dimension; `-1` marks a
    /// size only known at run time.
    pub fn memref_type(&mut self, elem: TypeRef, shape: &[i64]) -> ModuleResult<TypeRef> {
        if let Some(&bad) = shape.iter().find(|&&d| d < tessera_ir::DYNAMIC) {
            return Err(ModuleError::InvalidShape(bad));
        }
        Ok(self.ir.types.memref(elem, shape))
    }

    pub fn function_type(&mut self, inputs: &[TypeRef], results: &[TypeRef]) -> TypeRef {
        self.ir.types.function(inputs, results)
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Add a function without a body, to be resolved through
    /// [`Module::register_symbol`] at compile time or given one with
    /// [`Module::define_function`].
    pub fn declare_function(
        &mut self,
        name: &str,
        inputs: &[TypeRef],
        results: &[TypeRef],
    ) -> ModuleResult<FunctionHandle> {
        self.invalidate();
        Ok(FunctionHandle::declare(&mut self.ir, self.module, name, inputs, results)?)
    }

    /// Add a function with an empty entry block.
    pub fn make_function(
        &mut self,
        name: &str,
        inputs: &[TypeRef],
        results: &[TypeRef],
    ) -> ModuleResult<FunctionHandle> {
        self.invalidate();
        Ok(FunctionHandle::make(&mut self.ir, self.module, name, inputs, results)?)
    }

    /// Give the declared function `f` an empty entry block.
    ///
    /// Returns `false`, leaving the module untouched, if `f` already has one.
    pub fn define_function(&mut self, f: FunctionHandle) -> bool {
        if f.is_defined(&self.ir) {
            return false;
        }
        self.invalidate();
        f.define(&mut self.ir)
    }

    pub fn named_function(&self, name: &str) -> Option<FunctionHandle> {
        FunctionHandle::lookup(&self.ir, self.module, name)
    }

    /// All functions, in declaration order.
    pub fn functions(&self) -> Vec<FunctionHandle> {
        self.module
            .functions(&self.ir)
            .filter_map(|op| FunctionHandle::from_op(&self.ir, op))
            .collect()
    }

    /// An emitter appending to the entry block of `f`.
    pub fn emitter<'a>(
        &'a mut self,
        cx: &'a EdscContext,
        f: FunctionHandle,
    ) -> ModuleResult<Emitter<'a, OpBuilder<'a>>> {
        self.invalidate();
        let Some(entry) = f.entry_block(&self.ir) else {
            return Err(EdscError::FunctionNotDefined(f.name(&self.ir).to_string()).into());
        };
        Ok(Emitter::new(cx, OpBuilder::at_end(&mut self.ir, entry), f)?)
    }

    // ========================================================================
    // Compilation
    // ========================================================================

    /// Make `addr` the implementation of the declared function `name`.
    pub fn register_symbol(&mut self, name: &str, addr: usize) {
        self.invalidate();
        self.symbols.insert(name.to_owned(), addr);
    }

    pub fn verify(&self) -> ModuleResult<()> {
        Ok(verify_module(&self.ir, self.module)?)
    }

    /// Textual form of the whole module.
    pub fn ir(&self) -> String {
        print_op(&self.ir, self.module.op())
    }

    /// Verify and JIT-compile the module for the host.
    ///
    /// On failure the module is left uncompiled.
    pub fn compile(&mut self) -> ModuleResult<()> {
        self.invalidate();
        init_native_target()?;
        let engine = Engine::new(&self.ir, self.module, self.opt_level, &self.symbols)?;
        self.engine = Some(Box::new(engine));
        Ok(())
    }

    pub fn is_compiled(&self) -> bool {
        self.engine.is_some()
    }

    /// Opaque non-zero handle of the compiled code.
    pub fn engine_address(&self) -> ModuleResult<usize> {
        let engine = self.engine.as_deref().ok_or(ModuleError::NotCompiled)?;
        Ok(engine as *const Engine as usize)
    }

    /// Entry address of the compiled function `name`.
    ///
    /// The address is valid until the module is dropped or changed.
    pub fn function_address(&self, name: &str) -> ModuleResult<*const u8> {
        let engine = self.engine.as_deref().ok_or(ModuleError::NotCompiled)?;
        if self.named_function(name).is_none() {
            return Err(ModuleError::UnknownFunction(name.to_owned()));
        }
        Ok(engine.function_address(name)?)
    }

    /// Relocatable object for `target`, or for the host when `None`.
    pub fn emit_object(&self, target: Option<Triple>) -> ModuleResult<Vec<u8>> {
        Ok(tessera_jit::emit_object(
            &self.ir,
            self.module,
            target,
            self.opt_level,
        )?)
    }

    fn invalidate(&mut self) {
        if self.engine.take().is_some() {
            tracing::debug!("discarded compiled code");
        }
    }
}

impl TypeLookup for Module {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType> {
        self.ir.types.builtin(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_names() {
        assert_eq!("f32".parse::<ScalarKind>().unwrap(), ScalarKind::F32);
        assert_eq!("bf16".parse::<ScalarKind>().unwrap(), ScalarKind::BF16);
        assert_eq!("i17".parse::<ScalarKind>().unwrap(), ScalarKind::Int(17));
        assert_eq!("index".parse::<ScalarKind>().unwrap(), ScalarKind::Index);
        for bad in ["i0", "i", "u8", "f128", "ix"] {
            assert!(
                matches!(bad.parse::<ScalarKind>(), Err(ModuleError::InvalidScalarType(s)) if s == bad),
                "{bad}"
            );
        }
    }

    #[test]
    fn scalar_types_are_interned() {
        let mut m = Module::new();
        let a = m.parse_scalar_type("i32").unwrap();
        let b = m.scalar_type(ScalarKind::Int(32)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, m.index_type());
        assert!(matches!(m.scalar_type(ScalarKind::Int(0)), Err(ModuleError::InvalidScalarType(_))));
    }

    #[test]
    fn shapes_accept_dynamic_sizes_only() {
        let mut m = Module::new();
        let f32_ty = m.scalar_type(ScalarKind::F32).unwrap();
        let ty = m.memref_type(f32_ty, &[0, -1, 3]).unwrap();
        assert_eq!(m.buffer_shape(ty), Some(vec![0, -1, 3]));
        assert!(matches!(m.memref_type(f32_ty, &[2, -2]), Err(ModuleError::InvalidShape(-2))));
    }

    #[test]
    fn functions_in_declaration_order() {
        let mut m = Module::new();
        let a = m.declare_function("a", &[], &[]).unwrap();
        let b = m.make_function("b", &[], &[]).unwrap();
        assert_eq!(m.functions(), [a, b]);
        assert_eq!(m.named_function("b"), Some(b));
        assert_eq!(m.named_function("c"), None);
        assert!(matches!(m.make_function("a", &[], &[]), Err(ModuleError::Ir(IrError::DuplicateSymbol(_)))));
    }

    #[test]
    fn declarations_have_no_emitter() {
        let mut m = Module::new();
        let f = m.declare_function("ext", &[], &[]).unwrap();
        let cx = EdscContext::new();
        let err = m.emitter(&cx, f).err().unwrap();
        assert!(matches!(err, ModuleError::Edsc(EdscError::FunctionNotDefined(name)) if name == "ext"));
    }
}
