//! Structural verification of a module.
//!
//! Checks run per defined function:
//!
//! 1. **Scope**: every operand refers to a value defined in the enclosing
//!    region or one of its ancestors (values defined inside a loop body are
//!    not visible after the loop).
//! 2. **Terminators**: every block is non-empty, ends with a terminator and
//!    has no terminator before its last op.
//! 3. **Branches**: successors live in the branching op's region and receive
//!    as many arguments, of the same types, as they declare.
//! 4. **Loops**: an `scf.for` body is a single block taking one `index`
//!    argument and ending with `scf.yield`.
//! 5. **Returns**: `func.return` operands match the function result types.
//!
//! Use-chain consistency of the whole module is checked as well.

use std::collections::HashSet;
use std::fmt;
use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::dialect::{self, cf, func, scf};
use crate::function::FunctionHandle;
use crate::module::ModuleOp;
use crate::refs::{BlockRef, OpRef, RegionRef, ValueDef, ValueRef};
use crate::types::BuiltinType;
use crate::walk::{self, WalkAction};

// ============================================================================
// Error types
// ============================================================================

/// One problem found by the verifier.
#[derive(Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Function the problem was found in, empty for module-level problems.
    pub function: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.function.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "in @{}: {}", self.function, self.message)
        }
    }
}

impl fmt::Debug for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// All problems found in one verifier run. Never empty.
#[derive(Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub diagnostics: Vec<Diagnostic>,
}

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} verification error(s)", self.diagnostics.len())?;
        for diag in &self.diagnostics {
            write!(f, "\n  - {diag}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for VerifyError {}

// ============================================================================
// Entry points
// ============================================================================

/// Verify every function of `module` and the module's use-chains.
pub fn verify_module(ctx: &IrContext, module: ModuleOp) -> Result<(), VerifyError> {
    let mut diagnostics = Vec::new();
    for op in module.functions(ctx) {
        if let Some(f) = FunctionHandle::from_op(ctx, op) {
            check_function(ctx, f, &mut diagnostics);
        }
    }
    check_use_chains(ctx, module.body(ctx), &mut diagnostics);
    finish(diagnostics)
}

/// Verify a single function. Declarations always pass.
pub fn verify_function(ctx: &IrContext, f: FunctionHandle) -> Result<(), VerifyError> {
    let mut diagnostics = Vec::new();
    check_function(ctx, f, &mut diagnostics);
    finish(diagnostics)
}

fn finish(diagnostics: Vec<Diagnostic>) -> Result<(), VerifyError> {
    if diagnostics.is_empty() {
        Ok(())
    } else {
        tracing::debug!(count = diagnostics.len(), "verification failed");
        Err(VerifyError { diagnostics })
    }
}

// ============================================================================
// Per-function checks
// ============================================================================

struct FunctionChecker<'a> {
    ctx: &'a IrContext,
    function: FunctionHandle,
    name: String,
    diagnostics: &'a mut Vec<Diagnostic>,
}

fn check_function(ctx: &IrContext, function: FunctionHandle, diagnostics: &mut Vec<Diagnostic>) {
    if !function.is_defined(ctx) {
        return;
    }
    let mut checker = FunctionChecker {
        ctx,
        function,
        name: function.name(ctx).to_string(),
        diagnostics,
    };
    checker.check_region(function.body(ctx), &HashSet::new(), false);
}

impl FunctionChecker<'_> {
    fn error(&mut self, message: String) {
        self.diagnostics.push(Diagnostic {
            function: self.name.clone(),
            message,
        });
    }

    /// Check every block of `region` with `outer` values visible.
    ///
    /// `in_loop` is set for `scf.for` bodies, where `scf.yield` is the only
    /// accepted terminator.
    fn check_region(&mut self, region: RegionRef, outer: &HashSet<ValueRef>, in_loop: bool) {
        let ctx = self.ctx;
        let mut visible = outer.clone();
        for &block in &ctx.region(region).blocks {
            visible.extend(ctx.block_args(block).iter().copied());
            for &op in &ctx.block(block).ops {
                visible.extend(ctx.op_results(op).iter().copied());
            }
        }

        for &block in &ctx.region(region).blocks {
            self.check_block(region, block, &visible, in_loop);
        }
    }

    fn check_block(
        &mut self,
        region: RegionRef,
        block: BlockRef,
        visible: &HashSet<ValueRef>,
        in_loop: bool,
    ) {
        let ctx = self.ctx;
        let ops = &ctx.block(block).ops;
        let Some((&last, init)) = ops.split_last() else {
            self.error(format!("block {block} is empty"));
            return;
        };

        for &op in init {
            if dialect::is_terminator(ctx, op) {
                self.error(format!("{} in the middle of block {block}", op_name(ctx, op)));
            }
        }
        if !dialect::is_terminator(ctx, last) {
            self.error(format!(
                "block {block} does not end with a terminator (last op is {})",
                op_name(ctx, last)
            ));
        } else if in_loop != scf::is_yield(ctx, last) {
            let expected = if in_loop { "scf.yield" } else { "a branch or func.return" };
            self.error(format!(
                "block {block} ends with {}, expected {expected}",
                op_name(ctx, last)
            ));
        }

        for &op in ops {
            self.check_operands(op, visible);
            self.check_successors(region, op);
            if func::is_return(ctx, op) {
                self.check_return(op);
            }
            if scf::is_for(ctx, op) {
                self.check_for(op);
            }
            for &nested in &ctx.op(op).regions {
                self.check_region(nested, visible, scf::is_for(ctx, op));
            }
        }
    }

    fn check_operands(&mut self, op: OpRef, visible: &HashSet<ValueRef>) {
        let ctx = self.ctx;
        for (i, &operand) in ctx.op_operands(op).iter().enumerate() {
            if !visible.contains(&operand) {
                self.error(format!(
                    "operand #{i} of {} references {}, which is not in scope",
                    op_name(ctx, op),
                    describe_value(ctx, operand)
                ));
            }
        }
    }

    fn check_successors(&mut self, region: RegionRef, op: OpRef) {
        let ctx = self.ctx;
        let successors = &ctx.op(op).successors;
        for &dest in successors {
            if ctx.block(dest).parent_region != Some(region) {
                self.error(format!(
                    "{} branches to {dest}, which is outside its region",
                    op_name(ctx, op)
                ));
            }
        }

        let Some(groups) = cf::successor_operands(ctx, op) else {
            if cf::is_cond_br(ctx, op) {
                self.error("cf.cond_br has malformed operand groups".to_owned());
            }
            return;
        };
        for (&dest, args) in successors.iter().zip(groups) {
            let expected = &ctx.block(dest).arg_types;
            if args.len() != expected.len() {
                self.error(format!(
                    "{} passes {} argument(s) to {dest}, which takes {}",
                    op_name(ctx, op),
                    args.len(),
                    expected.len()
                ));
                continue;
            }
            for (i, (&arg, &ty)) in args.iter().zip(expected.iter()).enumerate() {
                if ctx.value_ty(arg) != ty {
                    self.error(format!(
                        "argument #{i} passed to {dest} by {} has the wrong type",
                        op_name(ctx, op)
                    ));
                }
            }
        }
    }

    fn check_return(&mut self, op: OpRef) {
        let ctx = self.ctx;
        let expected = self.function.results(ctx);
        let actual = ctx.op_operands(op);
        if actual.len() != expected.len() {
            self.error(format!(
                "func.return has {} value(s), function returns {}",
                actual.len(),
                expected.len()
            ));
            return;
        }
        for (i, (&v, &ty)) in actual.iter().zip(expected.iter()).enumerate() {
            if ctx.value_ty(v) != ty {
                self.error(format!("returned value #{i} has the wrong type"));
            }
        }
    }

    fn check_for(&mut self, op: OpRef) {
        let ctx = self.ctx;
        let regions = &ctx.op(op).regions;
        let blocks = regions.first().map(|&r| ctx.region(r).blocks.as_slice());
        let Some(&[body]) = blocks else {
            self.error("scf.for must have exactly one body block".to_owned());
            return;
        };
        let args = &ctx.block(body).arg_types;
        let iv_is_index = matches!(
            args.as_slice(),
            [ty] if matches!(ctx.types.builtin(*ty), Some(BuiltinType::Index))
        );
        if !iv_is_index {
            self.error("scf.for body must take a single index argument".to_owned());
        }
        if ctx.op_operands(op).len() != 3 {
            self.error("scf.for takes lower bound, upper bound and step".to_owned());
        }
    }
}

// ============================================================================
// Use-chain consistency
// ============================================================================

fn check_use_chains(ctx: &IrContext, body: RegionRef, diagnostics: &mut Vec<Diagnostic>) {
    let mut actual: HashSet<(ValueRef, OpRef, u32)> = HashSet::new();
    let mut values: HashSet<ValueRef> = HashSet::new();

    let _ = walk::walk_region::<()>(ctx, body, &mut |op| {
        for (idx, &operand) in ctx.op_operands(op).iter().enumerate() {
            actual.insert((operand, op, idx as u32));
            values.insert(operand);
        }
        values.extend(ctx.op_results(op).iter().copied());
        for &region in &ctx.op(op).regions {
            for &block in &ctx.region(region).blocks {
                values.extend(ctx.block_args(block).iter().copied());
            }
        }
        ControlFlow::Continue(WalkAction::Advance)
    });

    for &(val, op, idx) in &actual {
        let found = ctx
            .uses(val)
            .iter()
            .any(|u| u.user == op && u.operand_index == idx);
        if !found {
            diagnostics.push(Diagnostic {
                function: String::new(),
                message: format!(
                    "operand #{idx} of {} ({op}) uses {val} but no use-chain entry exists",
                    op_name(ctx, op)
                ),
            });
        }
    }

    for &val in &values {
        for u in ctx.uses(val) {
            if !actual.contains(&(val, u.user, u.operand_index)) {
                diagnostics.push(Diagnostic {
                    function: String::new(),
                    message: format!(
                        "use-chain entry for {val} claims use by {} operand #{}, \
                         but no such operand exists",
                        u.user, u.operand_index
                    ),
                });
            }
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn op_name(ctx: &IrContext, op: OpRef) -> String {
    let data = ctx.op(op);
    format!("{}.{}", data.dialect, data.name)
}

fn describe_value(ctx: &IrContext, v: ValueRef) -> String {
    match ctx.value_def(v) {
        ValueDef::OpResult(op, idx) => format!("result #{idx} of {}", op_name(ctx, op)),
        ValueDef::BlockArg(block, idx) => format!("block arg #{idx} of {block}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::OpBuilder;
    use crate::dialect::arith;
    use crate::types::{Attribute, FloatKind};

    fn setup() -> (IrContext, ModuleOp) {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        (ctx, module)
    }

    #[test]
    fn declarations_and_simple_bodies_pass() {
        let (mut ctx, module) = setup();
        let i32_ty = ctx.types.int(32);
        FunctionHandle::declare(&mut ctx, module, "ext", &[i32_ty], &[i32_ty]).unwrap();
        let f = FunctionHandle::make(&mut ctx, module, "id", &[i32_ty], &[i32_ty]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let arg = f.arguments(&ctx)[0];
        OpBuilder::at_end(&mut ctx, entry).insert(func::return_(&[arg]));

        assert!(verify_module(&ctx, module).is_ok());
    }

    #[test]
    fn missing_terminator_is_reported() {
        let (mut ctx, module) = setup();
        let i32_ty = ctx.types.int(32);
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        OpBuilder::at_end(&mut ctx, entry).insert(arith::constant(i32_ty, Attribute::from(1i64)));

        let err = verify_function(&ctx, f).unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        assert!(err.diagnostics[0].message.contains("does not end with a terminator"));
        assert_eq!(err.diagnostics[0].function, "f");
    }

    #[test]
    fn empty_defined_function_is_reported() {
        let (mut ctx, module) = setup();
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[]).unwrap();
        let err = verify_function(&ctx, f).unwrap_err();
        assert!(err.to_string().contains("is empty"));
    }

    #[test]
    fn return_type_mismatch_is_reported() {
        let (mut ctx, module) = setup();
        let i32_ty = ctx.types.int(32);
        let f32_ty = ctx.types.float(FloatKind::F32);
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[i32_ty]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let mut b = OpBuilder::at_end(&mut ctx, entry);
        let c = b.insert(arith::constant(f32_ty, Attribute::float(1.0)));
        let v = b.ctx().op_result(c, 0);
        b.insert(func::return_(&[v]));

        let err = verify_function(&ctx, f).unwrap_err();
        assert!(err.diagnostics[0].message.contains("wrong type"));
    }

    #[test]
    fn loop_values_are_not_visible_after_the_loop() {
        let (mut ctx, module) = setup();
        let index = ctx.types.index();
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[index]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();

        let mut b = OpBuilder::at_end(&mut ctx, entry);
        let c = b.insert(arith::constant(index, Attribute::from(0i64)));
        let zero = b.ctx().op_result(c, 0);
        let body = b.create_block(&[index]);
        let region = b.create_region(&[body]);
        b.insert(scf::for_loop(zero, zero, zero, region));
        b.set_insertion_point(body);
        let iv = b.ctx().block_args(body)[0];
        b.insert(scf::yield_());
        b.set_insertion_point(entry);
        b.insert(func::return_(&[iv]));

        let err = verify_function(&ctx, f).unwrap_err();
        assert_eq!(err.diagnostics.len(), 1);
        assert!(err.diagnostics[0].message.contains("not in scope"));
    }

    #[test]
    fn branch_argument_count_must_match() {
        let (mut ctx, module) = setup();
        let i32_ty = ctx.types.int(32);
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();

        let mut b = OpBuilder::at_end(&mut ctx, entry);
        let dest = b.create_block(&[i32_ty]);
        b.append_block(dest);
        b.insert(cf::br(dest, &[]));
        b.set_insertion_point(dest);
        b.insert(func::return_(&[]));

        let err = verify_function(&ctx, f).unwrap_err();
        assert!(err.diagnostics[0].message.contains("passes 0 argument(s)"));
    }

    #[test]
    fn yield_outside_loop_is_rejected() {
        let (mut ctx, module) = setup();
        let f = FunctionHandle::make(&mut ctx, module, "f", &[], &[]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        OpBuilder::at_end(&mut ctx, entry).insert(scf::yield_());

        let err = verify_function(&ctx, f).unwrap_err();
        assert!(err.diagnostics[0].message.contains("expected a branch or func.return"));
    }
}
