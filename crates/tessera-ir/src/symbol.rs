//! Interned names: dialects, op names, attribute keys and function names.
//!
//! All symbols share one process-wide `lasso` interner, so a `Symbol` is a
//! plain key that is cheap to copy, hash and compare.

use std::fmt;
use std::sync::LazyLock;

use lasso::{Rodeo, Spur};
use parking_lot::RwLock;

static NAMES: LazyLock<RwLock<Rodeo>> = LazyLock::new(|| RwLock::new(Rodeo::default()));

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    pub fn new(text: &'static str) -> Self {
        Self::intern(text, |names| names.get_or_intern_static(text))
    }

    /// Intern a borrowed string; the interner keeps its own copy.
    pub fn from_dynamic(text: &str) -> Self {
        Self::intern(text, |names| names.get_or_intern(text))
    }

    fn intern(text: &str, insert: impl FnOnce(&mut Rodeo) -> Spur) -> Self {
        if let Some(key) = NAMES.read().get(text) {
            return Symbol(key);
        }
        // Another thread may have won the race; `insert` dedups.
        Symbol(insert(&mut NAMES.write()))
    }

    /// Run `f` on the text of the symbol.
    ///
    /// `f` may print other symbols, but must not intern new ones.
    pub fn with_str<R>(self, f: impl FnOnce(&str) -> R) -> R {
        let names = NAMES.read_recursive();
        f(names.resolve(&self.0))
    }
}

impl From<&'static str> for Symbol {
    fn from(text: &'static str) -> Self {
        Symbol::new(text)
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.with_str(|s| s == other)
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        *self == **other
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_str(|s| f.write_str(s))
    }
}

/// Define zero-argument accessors for fixed symbols.
///
/// ```
/// tessera_ir::symbols! {
///     ATTR_STRIDE => "stride",
/// }
///
/// assert_eq!(ATTR_STRIDE(), "stride");
/// ```
#[macro_export]
macro_rules! symbols {
    ($($(#[$meta:meta])* $name:ident => $text:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[allow(non_snake_case)]
            #[inline]
            pub fn $name() -> $crate::Symbol {
                $crate::Symbol::new($text)
            }
        )*
    };
}
