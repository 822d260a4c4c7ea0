//! Node handles and payloads.
//!
//! Handles are small `Copy` values pairing an index into the owning
//! [`EdscContext`](crate::EdscContext) with the context id and the scope
//! generation they were issued in. Payloads are only reachable through the
//! context, which checks the tag on every access.

use cranelift_entity::entity_impl;
use smallvec::SmallVec;
use tessera_ir::TypeRef;

/// Identifies the scope a handle was issued in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Tag {
    pub(crate) arena: u32,
    pub(crate) generation: u32,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ExprIdx(u32);
entity_impl!(ExprIdx, "expr");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct StmtIdx(u32);
entity_impl!(StmtIdx, "stmt");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct BlockIdx(u32);
entity_impl!(BlockIdx, "block");

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct AttrIdx(u32);
entity_impl!(AttrIdx, "attr");

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $idx:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        pub struct $name {
            pub(crate) tag: Tag,
            pub(crate) idx: $idx,
        }
    };
}

handle!(
    /// An expression node.
    Expr,
    ExprIdx
);
handle!(
    /// A statement node.
    Stmt,
    StmtIdx
);
handle!(
    /// A block of statements with bindable arguments.
    Block,
    BlockIdx
);
handle!(
    /// A constant attached to a custom op.
    Attr,
    AttrIdx
);

/// Maximum over a non-empty set of candidates, usable as a lower bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaxExpr(pub(crate) Expr);

/// Minimum over a non-empty set of candidates, usable as an upper bound.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MinExpr(pub(crate) Expr);

impl From<MaxExpr> for Expr {
    fn from(e: MaxExpr) -> Expr {
        e.0
    }
}

impl From<MinExpr> for Expr {
    fn from(e: MinExpr) -> Expr {
        e.0
    }
}

/// An expression of buffer type that can be loaded from and stored to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Indexed {
    pub(crate) base: Expr,
    pub(crate) rank: usize,
}

impl Indexed {
    pub fn expr(self) -> Expr {
        self.base
    }

    pub fn rank(self) -> usize {
        self.rank
    }
}

impl From<Indexed> for Expr {
    fn from(i: Indexed) -> Expr {
        i.base
    }
}

// ============================================================================
// Payloads
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    And,
    Or,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge | BinaryOp::Eq | BinaryOp::Ne
        )
    }

    pub(crate) fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Max,
    Min,
}

/// A named operation with optional result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CustomOp {
    /// Full `dialect.op` name.
    pub name: String,
    pub result: Option<TypeRef>,
    pub operands: SmallVec<[Expr; 4]>,
    pub successors: SmallVec<[Block; 2]>,
    pub attributes: Vec<(String, Attr)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Symbolic leaf resolved by the emitter. `id` is unique per context.
    Bindable { ty: TypeRef, id: u32 },
    Negate(Expr),
    Binary { op: BinaryOp, lhs: Expr, rhs: Expr },
    Select { cond: Expr, then: Expr, otherwise: Expr },
    Reduce { op: ReduceOp, candidates: SmallVec<[Expr; 4]> },
    Call {
        callee: Expr,
        args: SmallVec<[Expr; 4]>,
        result: Option<TypeRef>,
    },
    Custom(CustomOp),
    Load { buffer: Expr, indices: SmallVec<[Expr; 4]> },
    ConstantInteger { ty: TypeRef, value: i64 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StmtKind {
    Eval(Expr),
    Store {
        value: Expr,
        buffer: Expr,
        indices: SmallVec<[Expr; 4]>,
    },
    Block(Block),
    Branch { dest: Block, args: SmallVec<[Expr; 4]> },
    CondBranch {
        cond: Expr,
        true_dest: Block,
        true_args: SmallVec<[Expr; 4]>,
        false_dest: Block,
        false_args: SmallVec<[Expr; 4]>,
    },
    /// One loop level. Nests are nested `For`s.
    For {
        iv: Expr,
        lower: Expr,
        upper: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
    Return(SmallVec<[Expr; 2]>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockNode {
    /// Bindables standing for the block arguments.
    pub args: SmallVec<[Expr; 4]>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    Integer { ty: TypeRef, value: i64 },
}
