//! Attributes and interned types.
//!
//! Types are interned in a [`TypeInterner`]: the same [`TypeData`] always
//! yields the same [`TypeRef`], so type equality is ref equality. The
//! builtin types (integers of any width, floats, `index`, `memref` and
//! function types) live in the `builtin` dialect and are decoded through
//! [`BuiltinType`].

use std::collections::BTreeMap;
use std::collections::HashMap;

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::refs::TypeRef;
use crate::symbol::Symbol;

// ============================================================================
// Attribute
// ============================================================================

/// IR attribute values.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Bool(bool),
    /// Integer constant stored as raw bits (signless).
    IntBits(u64),
    /// Integer constant carrying its own type.
    Integer { value: i64, ty: TypeRef },
    /// Float constant stored as raw `f64` bits.
    FloatBits(u64),
    Type(TypeRef),
    /// Single interned symbol.
    Symbol(Symbol),
    /// List of attributes.
    List(Vec<Attribute>),
}

impl Attribute {
    /// Float attribute from an `f64` value.
    pub fn float(value: f64) -> Self {
        Attribute::FloatBits(value.to_bits())
    }

    /// Read back an integer attribute as a signed value.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Attribute::IntBits(bits) => Some(i64::from_ne_bytes(bits.to_ne_bytes())),
            Attribute::Integer { value, .. } => Some(*value),
            Attribute::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Attribute::FloatBits(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::IntBits(u64::from_ne_bytes(value.to_ne_bytes()))
    }
}

impl From<u64> for Attribute {
    fn from(value: u64) -> Self {
        Attribute::IntBits(value)
    }
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Bool(value)
    }
}

impl From<Vec<Attribute>> for Attribute {
    fn from(value: Vec<Attribute>) -> Self {
        Attribute::List(value)
    }
}

impl From<Symbol> for Attribute {
    fn from(value: Symbol) -> Self {
        Attribute::Symbol(value)
    }
}

impl From<TypeRef> for Attribute {
    fn from(value: TypeRef) -> Self {
        Attribute::Type(value)
    }
}

// ============================================================================
// TypeData
// ============================================================================

/// Data for a single interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeData {
    pub dialect: Symbol,
    pub name: Symbol,
    pub params: SmallVec<[TypeRef; 4]>,
    pub attrs: BTreeMap<Symbol, Attribute>,
}

/// Builder for constructing `TypeData` with a fluent API.
pub struct TypeDataBuilder {
    dialect: Symbol,
    name: Symbol,
    params: SmallVec<[TypeRef; 4]>,
    attrs: BTreeMap<Symbol, Attribute>,
}

impl TypeDataBuilder {
    pub fn new(dialect: Symbol, name: Symbol) -> Self {
        Self {
            dialect,
            name,
            params: SmallVec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.params.push(ty);
        self
    }

    pub fn params(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.params.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attrs.insert(key.into(), val);
        self
    }

    pub fn build(self) -> TypeData {
        TypeData {
            dialect: self.dialect,
            name: self.name,
            params: self.params,
            attrs: self.attrs,
        }
    }
}

// ============================================================================
// Builtin types
// ============================================================================

/// Marker for a dynamic memref dimension.
pub const DYNAMIC: i64 = -1;

crate::symbols! {
    DIALECT => "builtin",
    TY_INT => "i",
    TY_BF16 => "bf16",
    TY_F16 => "f16",
    TY_F32 => "f32",
    TY_F64 => "f64",
    TY_INDEX => "index",
    TY_MEMREF => "memref",
    TY_FN => "fn",
    ATTR_WIDTH => "width",
    ATTR_SHAPE => "shape",
    ATTR_RESULTS => "results",
}

/// Floating-point formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FloatKind {
    BF16,
    F16,
    F32,
    F64,
}

impl FloatKind {
    pub fn width(self) -> u32 {
        match self {
            FloatKind::BF16 | FloatKind::F16 => 16,
            FloatKind::F32 => 32,
            FloatKind::F64 => 64,
        }
    }

    fn symbol(self) -> Symbol {
        match self {
            FloatKind::BF16 => TY_BF16(),
            FloatKind::F16 => TY_F16(),
            FloatKind::F32 => TY_F32(),
            FloatKind::F64 => TY_F64(),
        }
    }
}

/// Decoded view of a builtin type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuiltinType {
    Int { width: u32 },
    Float(FloatKind),
    Index,
    MemRef {
        elem: TypeRef,
        shape: SmallVec<[i64; 4]>,
    },
    Function {
        inputs: SmallVec<[TypeRef; 4]>,
        results: SmallVec<[TypeRef; 2]>,
    },
}

impl BuiltinType {
    pub fn is_integer_like(&self) -> bool {
        matches!(self, BuiltinType::Int { .. } | BuiltinType::Index)
    }
}

// ============================================================================
// TypeInterner
// ============================================================================

/// Deduplicating type interner.
pub struct TypeInterner {
    types: PrimaryMap<TypeRef, TypeData>,
    dedup: HashMap<TypeData, TypeRef>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self {
            types: PrimaryMap::new(),
            dedup: HashMap::default(),
        }
    }

    /// Intern a type, returning an existing ref if the data matches.
    pub fn intern(&mut self, data: TypeData) -> TypeRef {
        if let Some(&existing) = self.dedup.get(&data) {
            return existing;
        }
        let r = self.types.push(data.clone());
        self.dedup.insert(data, r);
        r
    }

    /// Look up type data by reference.
    pub fn get(&self, r: TypeRef) -> &TypeData {
        &self.types[r]
    }

    /// Check if this type matches the given dialect and name.
    pub fn is_dialect(&self, r: TypeRef, dialect: Symbol, name: Symbol) -> bool {
        let data = &self.types[r];
        data.dialect == dialect && data.name == name
    }

    /// Signless integer type of the given bit width.
    ///
    /// The width is not validated here; callers accepting user input
    /// should reject a zero width first.
    pub fn int(&mut self, width: u32) -> TypeRef {
        self.intern(
            TypeDataBuilder::new(DIALECT(), TY_INT())
                .attr(ATTR_WIDTH(), Attribute::IntBits(u64::from(width)))
                .build(),
        )
    }

    /// The 1-bit integer type used for conditions.
    pub fn bool(&mut self) -> TypeRef {
        self.int(1)
    }

    pub fn float(&mut self, kind: FloatKind) -> TypeRef {
        self.intern(TypeDataBuilder::new(DIALECT(), kind.symbol()).build())
    }

    pub fn index(&mut self) -> TypeRef {
        self.intern(TypeDataBuilder::new(DIALECT(), TY_INDEX()).build())
    }

    /// Buffer type with the given element type and shape; `DYNAMIC` marks
    /// a size only known at run time.
    pub fn memref(&mut self, elem: TypeRef, shape: &[i64]) -> TypeRef {
        let shape = shape.iter().map(|&d| Attribute::from(d)).collect();
        self.intern(
            TypeDataBuilder::new(DIALECT(), TY_MEMREF())
                .param(elem)
                .attr(ATTR_SHAPE(), Attribute::List(shape))
                .build(),
        )
    }

    /// Function type. Inputs are the params, results live in an attribute.
    pub fn function(&mut self, inputs: &[TypeRef], results: &[TypeRef]) -> TypeRef {
        let results = results.iter().map(|&t| Attribute::Type(t)).collect();
        self.intern(
            TypeDataBuilder::new(DIALECT(), TY_FN())
                .params(inputs.iter().copied())
                .attr(ATTR_RESULTS(), Attribute::List(results))
                .build(),
        )
    }

    /// Decode a builtin type; `None` for types of other dialects.
    pub fn builtin(&self, r: TypeRef) -> Option<BuiltinType> {
        let data = &self.types[r];
        if data.dialect != DIALECT() {
            return None;
        }
        let name = data.name;
        if name == TY_INT() {
            let width = data.attrs.get(&ATTR_WIDTH())?.as_i64()?;
            return Some(BuiltinType::Int {
                width: u32::try_from(width).ok()?,
            });
        }
        for kind in [FloatKind::BF16, FloatKind::F16, FloatKind::F32, FloatKind::F64] {
            if name == kind.symbol() {
                return Some(BuiltinType::Float(kind));
            }
        }
        if name == TY_INDEX() {
            return Some(BuiltinType::Index);
        }
        if name == TY_MEMREF() {
            let Some(Attribute::List(dims)) = data.attrs.get(&ATTR_SHAPE()) else {
                return None;
            };
            let shape = dims.iter().map(Attribute::as_i64).collect::<Option<_>>()?;
            return Some(BuiltinType::MemRef {
                elem: *data.params.first()?,
                shape,
            });
        }
        if name == TY_FN() {
            let Some(Attribute::List(results)) = data.attrs.get(&ATTR_RESULTS()) else {
                return None;
            };
            let results = results
                .iter()
                .map(|a| match a {
                    Attribute::Type(t) => Some(*t),
                    _ => None,
                })
                .collect::<Option<_>>()?;
            return Some(BuiltinType::Function {
                inputs: data.params.clone(),
                results,
            });
        }
        None
    }

    pub fn is_memref(&self, r: TypeRef) -> bool {
        matches!(self.builtin(r), Some(BuiltinType::MemRef { .. }))
    }

    pub fn is_float(&self, r: TypeRef) -> bool {
        matches!(self.builtin(r), Some(BuiltinType::Float(_)))
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn type_interner_dedup() {
        let mut interner = TypeInterner::new();
        let r1 = interner.int(32);
        let r2 = interner.int(32);
        assert_eq!(r1, r2, "same TypeData must yield same TypeRef");
        assert_ne!(interner.int(32), interner.int(64));
    }

    #[test]
    fn arbitrary_integer_widths() {
        let mut interner = TypeInterner::new();
        let i7 = interner.int(7);
        assert_eq!(interner.builtin(i7), Some(BuiltinType::Int { width: 7 }));
    }

    #[test]
    fn memref_shape_round_trip() {
        let mut interner = TypeInterner::new();
        let f32_ty = interner.float(FloatKind::F32);
        let m = interner.memref(f32_ty, &[3, DYNAMIC, 4]);
        assert_eq!(
            interner.builtin(m),
            Some(BuiltinType::MemRef {
                elem: f32_ty,
                shape: smallvec![3, DYNAMIC, 4],
            })
        );
        assert!(interner.is_memref(m));
        assert!(!interner.is_memref(f32_ty));
    }

    #[test]
    fn function_type_keeps_inputs_and_results_apart() {
        let mut interner = TypeInterner::new();
        let i32_ty = interner.int(32);
        let f64_ty = interner.float(FloatKind::F64);
        let a = interner.function(&[i32_ty], &[f64_ty]);
        let b = interner.function(&[i32_ty, f64_ty], &[]);
        assert_ne!(a, b);
        match interner.builtin(a) {
            Some(BuiltinType::Function { inputs, results }) => {
                assert_eq!(inputs.as_slice(), &[i32_ty]);
                assert_eq!(results.as_slice(), &[f64_ty]);
            }
            other => panic!("expected function type, got {other:?}"),
        }
    }

    #[test]
    fn foreign_dialect_is_not_builtin() {
        let mut interner = TypeInterner::new();
        let t = interner.intern(TypeDataBuilder::new(Symbol::new("test"), Symbol::new("opaque")).build());
        assert_eq!(interner.builtin(t), None);
        assert!(interner.is_dialect(t, Symbol::new("test"), Symbol::new("opaque")));
    }

    #[test]
    fn negative_int_attribute_reads_back_signed() {
        assert_eq!(Attribute::from(-5i64).as_i64(), Some(-5));
    }
}
