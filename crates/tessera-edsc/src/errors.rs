//! Error types for node construction and emission.

use derive_more::{Display, From};
use tessera_ir::VerifyError;

pub type EdscResult<T> = Result<T, EdscError>;

#[derive(Display, Debug, Clone, PartialEq, Eq, From)]
pub enum EdscError {
    // === Scope lifecycle ===
    #[display("a scope is already active on this context")]
    ScopeAlreadyActive,

    #[display("no scope is active on this context")]
    NoActiveScope,

    #[display("handle belongs to a scope that has exited or to another context")]
    StaleHandle,

    // === Construction ===
    #[display(
        "loop nest lists differ in length: {ivs} ivs, {lower} lower bounds, \
         {upper} upper bounds, {steps} steps"
    )]
    LoopNestArity {
        ivs: usize,
        lower: usize,
        upper: usize,
        steps: usize,
    },

    #[display("loop nest needs at least one level")]
    EmptyLoopNest,

    #[display("max/min needs at least one candidate")]
    EmptyReduction,

    #[display("expected a bindable, found {_0}")]
    NotBindable(String),

    #[display("attribute `{name}` is given more than once")]
    DuplicateAttribute { name: String },

    #[display("operation name `{_0}` is not of the form `dialect.op`")]
    InvalidOpName(String),

    #[display("{_0} does not have a buffer type")]
    NotABuffer(String),

    #[display("buffer of rank {expected} indexed with {found} indices")]
    RankMismatch { expected: usize, found: usize },

    #[display("integer width must be at least 1")]
    InvalidWidth,

    // === Binding ===
    #[display("value bound to {symbol} does not have its declared type")]
    TypeMismatch { symbol: String },

    #[display("argument position {pos} is out of range for a function of arity {arity}")]
    ArgumentOutOfRange { pos: usize, arity: usize },

    #[display("dimension {dim} is out of range for a buffer of rank {rank}")]
    DimensionOutOfRange { dim: usize, rank: usize },

    #[display("function @{_0} has no body")]
    FunctionNotDefined(String),

    // === Emission ===
    #[display("unbound symbol {symbol}")]
    Unbound { symbol: String },

    #[display("{_0} does not produce a value")]
    NoValue(String),

    #[display("callee {_0} does not have a function type")]
    NotAFunction(String),

    #[display("{_0} does not have an integer or index type")]
    NotAnInteger(String),

    #[display("block has already been emitted")]
    BlockAlreadyEmitted,

    #[display("blocks and branches cannot be emitted inside a loop body")]
    BranchInLoopBody,

    #[display("{_0}")]
    #[from]
    Verify(VerifyError),
}

impl std::error::Error for EdscError {}
