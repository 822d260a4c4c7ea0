//! Error types for IR construction.

use derive_more::Display;

pub type IrResult<T> = Result<T, IrError>;

#[derive(Display, Debug, Clone, PartialEq, Eq)]
pub enum IrError {
    #[display("function @{_0} is already declared in this module")]
    DuplicateSymbol(String),
}

impl std::error::Error for IrError {}
