//! Target ISA construction.

use std::sync::OnceLock;

use cranelift_codegen::ir::types;
use cranelift_codegen::isa::OwnedTargetIsa;
use cranelift_codegen::settings::{self, Configurable};
use derive_more::Display;
use target_lexicon::Triple;

use crate::errors::{CompilationError, CompilationResult};

/// Cranelift optimization level.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq, Hash)]
pub enum OptLevel {
    #[display("none")]
    None,
    #[default]
    #[display("speed")]
    Speed,
    #[display("speed_and_size")]
    SpeedAndSize,
}

static NATIVE_TARGET: OnceLock<Result<String, String>> = OnceLock::new();

/// Detect the host ISA once per process.
///
/// Idempotent; later calls return the cached outcome. [`crate::Engine`]
/// calls this itself, so calling it up front only moves the failure (if
/// any) to start-up.
pub fn init_native_target() -> CompilationResult<()> {
    let probe = NATIVE_TARGET.get_or_init(|| {
        let detected = cranelift_native::builder().map_err(str::to_owned)?;
        let triple = detected.triple().to_string();
        tracing::debug!(%triple, "initialized native target");
        Ok(triple)
    });
    match probe {
        Ok(_) => Ok(()),
        Err(msg) => Err(CompilationError::invalid_target(format!(
            "host ISA not supported: {msg}"
        ))),
    }
}

/// ISA for the machine we are running on, as used by the JIT.
pub(crate) fn native_isa(opt_level: OptLevel) -> CompilationResult<OwnedTargetIsa> {
    init_native_target()?;
    let isa_builder = cranelift_native::builder().map_err(CompilationError::invalid_target)?;
    let isa = isa_builder.finish(flags(opt_level)?)?;
    require_64_bit(isa)
}

/// ISA for an explicit target triple, as used for object emission.
pub(crate) fn target_isa(triple: Triple, opt_level: OptLevel) -> CompilationResult<OwnedTargetIsa> {
    let isa_builder = cranelift_codegen::isa::lookup(triple)?;
    let isa = isa_builder.finish(flags(opt_level)?)?;
    require_64_bit(isa)
}

fn flags(opt_level: OptLevel) -> CompilationResult<settings::Flags> {
    let mut flag_builder = settings::builder();
    flag_builder.set("opt_level", &opt_level.to_string())?;
    flag_builder.set("use_colocated_libcalls", "false")?;
    flag_builder.set("is_pic", "false")?;
    Ok(settings::Flags::new(flag_builder))
}

// Memref descriptors and index values are laid out as 64-bit words.
fn require_64_bit(isa: OwnedTargetIsa) -> CompilationResult<OwnedTargetIsa> {
    if isa.pointer_type() != types::I64 {
        return Err(CompilationError::invalid_target(format!(
            "{} does not have 64-bit pointers",
            isa.triple()
        )));
    }
    Ok(isa)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn native_target_init_is_idempotent() {
        init_native_target().unwrap();
        init_native_target().unwrap();
        assert!(native_isa(OptLevel::None).is_ok());
    }

    #[test]
    fn opt_levels_are_cranelift_settings() {
        for level in [OptLevel::None, OptLevel::Speed, OptLevel::SpeedAndSize] {
            assert!(flags(level).is_ok(), "{level}");
        }
    }

    #[test]
    fn unknown_architecture_is_an_invalid_target() {
        let triple = Triple::from_str("riscv32imac-unknown-none-elf").unwrap();
        let err = target_isa(triple, OptLevel::Speed).err().unwrap();
        assert!(
            matches!(err.kind(), crate::CompilationErrorKind::InvalidTarget(_)),
            "{err}"
        );
    }
}
