//! Sample kernels built with the DSL, each with a driver that runs the
//! compiled code on fixed inputs.

use std::fmt::Write as _;

use tessera_edsc::EdscContext;
use tessera_jit::MemRefDescriptor;

use crate::module::{Module, ModuleError, ModuleResult, ScalarKind};

/// A named kernel: how to emit it and how to run it once compiled.
pub struct Kernel {
    pub name: &'static str,
    pub description: &'static str,
    emit: fn(&mut Module) -> ModuleResult<()>,
    drive: fn(&Module) -> ModuleResult<String>,
}

pub const KERNELS: &[Kernel] = &[
    Kernel {
        name: "add",
        description: "add(x: i32, y: i32) -> i32",
        emit: emit_add,
        drive: drive_add,
    },
    Kernel {
        name: "abs",
        description: "absolute value of an i64 through a conditional branch",
        emit: emit_abs,
        drive: drive_abs,
    },
    Kernel {
        name: "axpy",
        description: "y[i] = a * x[i] + y[i] over the common length of x and y",
        emit: emit_axpy,
        drive: drive_axpy,
    },
    Kernel {
        name: "transpose",
        description: "copy a 2-d f32 buffer into its transpose",
        emit: emit_transpose,
        drive: drive_transpose,
    },
    Kernel {
        name: "sum_squares",
        description: "a*a + b*b through a host-provided square function",
        emit: emit_sum_squares,
        drive: drive_sum_squares,
    },
];

pub fn find(name: &str) -> Option<&'static Kernel> {
    KERNELS.iter().find(|k| k.name == name)
}

impl Kernel {
    /// Emit the kernel into `module`.
    pub fn emit(&self, module: &mut Module) -> ModuleResult<()> {
        (self.emit)(module)
    }

    /// Run the compiled kernel on its sample inputs and describe the result.
    pub fn run(&self, module: &Module) -> ModuleResult<String> {
        (self.drive)(module)
    }
}

// ============================================================================
// add
// ============================================================================

fn emit_add(m: &mut Module) -> ModuleResult<()> {
    let i32_ty = m.scalar_type(ScalarKind::Int(32))?;
    let f = m.make_function("add", &[i32_ty, i32_ty], &[i32_ty])?;

    let cx = EdscContext::new();
    let scope = cx.enter()?;
    let mut e = m.emitter(&cx, f)?;
    let args = e.bind_arguments()?;
    let sum = cx.add(args[0], args[1])?;
    e.emit(cx.ret(&[sum])?)?;
    e.verify()?;
    drop(e);
    scope.exit();
    Ok(())
}

fn drive_add(m: &Module) -> ModuleResult<String> {
    let addr = m.function_address("add")?;
    // SAFETY: `add` was emitted with signature (i32, i32) -> i32 and `m`
    // outlives the call.
    let add: extern "C" fn(i32, i32) -> i32 = unsafe { std::mem::transmute(addr) };
    Ok(format!("add(2, 40) = {}", add(2, 40)))
}

// ============================================================================
// abs
// ============================================================================

fn emit_abs(m: &mut Module) -> ModuleResult<()> {
    let i64_ty = m.scalar_type(ScalarKind::Int(64))?;
    let f = m.make_function("abs", &[i64_ty], &[i64_ty])?;

    let cx = EdscContext::new();
    let scope = cx.enter()?;
    let mut e = m.emitter(&cx, f)?;
    let x = e.bind_argument(0)?;
    let zero = e.bind_constant_int(64, 0)?;

    let result = cx.bindable(i64_ty)?;
    let exit = cx.block(&[result], &[cx.ret(&[result])?])?;
    let negative = cx.block(&[], &[cx.branch(exit, &[cx.negate(x)?])?])?;
    e.emit(cx.cond_branch(cx.lt(x, zero)?, negative, &[], exit, &[x])?)?;
    e.verify()?;
    drop(e);
    scope.exit();
    Ok(())
}

fn drive_abs(m: &Module) -> ModuleResult<String> {
    let addr = m.function_address("abs")?;
    // SAFETY: `abs` has signature (i64) -> i64.
    let abs: extern "C" fn(i64) -> i64 = unsafe { std::mem::transmute(addr) };
    let mut out = String::new();
    for x in [-7, 0, 12] {
        let _ = writeln!(out, "abs({x}) = {}", abs(x));
    }
    Ok(out.trim_end().to_owned())
}

// ============================================================================
// axpy
// ============================================================================

fn emit_axpy(m: &mut Module) -> ModuleResult<()> {
    let f32_ty = m.scalar_type(ScalarKind::F32)?;
    let index = m.index_type();
    let buf = m.memref_type(f32_ty, &[tessera_ir::DYNAMIC])?;
    let f = m.make_function("axpy", &[f32_ty, buf, buf], &[])?;

    let cx = EdscContext::new();
    let scope = cx.enter()?;
    let mut e = m.emitter(&cx, f)?;
    let a = e.bind_argument(0)?;
    let x = e.bind_argument(1)?;
    let y = e.bind_argument(2)?;
    let nx = e.bind_dim(x, 0)?;
    let ny = e.bind_dim(y, 0)?;
    let zero = e.bind_constant_index(0)?;
    let one = e.bind_constant_index(1)?;

    let xs = cx.indexed(x, &e)?;
    let ys = cx.indexed(y, &e)?;
    let i = cx.bindable(index)?;
    let scaled = cx.mul(a, xs.load(&cx, &[i])?)?;
    let update = ys.store(&cx, &[i], cx.add(scaled, ys.load(&cx, &[i])?)?)?;
    let lower = cx.max(&[zero])?;
    let upper = cx.min(&[nx, ny])?;
    e.emit(cx.max_min_for(i, lower, upper, one, &[update])?)?;
    e.emit(cx.ret(&[])?)?;
    e.verify()?;
    drop(e);
    scope.exit();
    Ok(())
}

fn drive_axpy(m: &Module) -> ModuleResult<String> {
    type Buffer<'a> = MemRefDescriptor<'a, f32, 1>;
    let addr = m.function_address("axpy")?;
    // SAFETY: `axpy` takes an f32 and two rank-1 f32 buffer descriptors.
    let axpy: extern "C" fn(f32, *mut Buffer<'_>, *mut Buffer<'_>) =
        unsafe { std::mem::transmute(addr) };

    let mut x = vec![1.0f32, 2.0, 3.0, 4.0, 5.0];
    let mut y = vec![10.0f32, 20.0, 30.0];
    let (nx, ny) = (x.len() as i64, y.len() as i64);
    let (Some(mut xd), Some(mut yd)) = (
        Buffer::row_major(&mut x, [nx]),
        Buffer::row_major(&mut y, [ny]),
    ) else {
        return Err(ModuleError::InvalidShape(nx));
    };
    axpy(2.0, xd.as_arg(), yd.as_arg());
    Ok(format!("y = {y:?}"))
}

// ============================================================================
// transpose
// ============================================================================

fn emit_transpose(m: &mut Module) -> ModuleResult<()> {
    let f32_ty = m.scalar_type(ScalarKind::F32)?;
    let index = m.index_type();
    let dynamic = tessera_ir::DYNAMIC;
    let buf = m.memref_type(f32_ty, &[dynamic, dynamic])?;
    let f = m.make_function("transpose", &[buf, buf], &[])?;

    let cx = EdscContext::new();
    let scope = cx.enter()?;
    let mut e = m.emitter(&cx, f)?;
    let (src, view) = e.bind_argument_view(0)?;
    let dst = e.bind_argument(1)?;
    let src = cx.indexed(src, &e)?;
    let dst = cx.indexed(dst, &e)?;
    let ivs = [cx.bindable(index)?, cx.bindable(index)?];
    let value = src.load(&cx, &ivs)?;
    let copy = dst.store(&cx, &[ivs[1], ivs[0]], value)?;
    e.emit(cx.for_nest(&ivs, &view.lower, &view.upper, &view.steps, &[copy])?)?;
    e.emit(cx.ret(&[])?)?;
    e.verify()?;
    drop(e);
    scope.exit();
    Ok(())
}

/// Transpose `rows x cols` row-major `src` with the compiled `transpose`.
pub fn run_transpose(m: &Module, src: &[f32], rows: usize, cols: usize) -> ModuleResult<Vec<f32>> {
    type Buffer<'a> = MemRefDescriptor<'a, f32, 2>;
    if src.len() != rows * cols {
        return Err(ModuleError::InvalidShape(src.len() as i64));
    }
    let addr = m.function_address("transpose")?;
    // SAFETY: `transpose` takes two rank-2 f32 buffer descriptors.
    let transpose: extern "C" fn(*mut Buffer<'_>, *mut Buffer<'_>) =
        unsafe { std::mem::transmute(addr) };

    let mut input = src.to_vec();
    let mut output = vec![0.0f32; src.len()];
    let (r, c) = (rows as i64, cols as i64);
    let (Some(mut sd), Some(mut dd)) = (
        Buffer::row_major(&mut input, [r, c]),
        Buffer::row_major(&mut output, [c, r]),
    ) else {
        return Err(ModuleError::InvalidShape(r));
    };
    transpose(sd.as_arg(), dd.as_arg());
    Ok(output)
}

fn drive_transpose(m: &Module) -> ModuleResult<String> {
    let src = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let out = run_transpose(m, &src, 2, 3)?;
    let mut text = String::from("3x2:");
    for row in out.chunks(2) {
        let _ = write!(text, " {row:?}");
    }
    Ok(text)
}

// ============================================================================
// sum_squares
// ============================================================================

extern "C" fn host_square(x: f64) -> f64 {
    x * x
}

fn emit_sum_squares(m: &mut Module) -> ModuleResult<()> {
    let f64_ty = m.scalar_type(ScalarKind::F64)?;
    let square = m.declare_function("host_square", &[f64_ty], &[f64_ty])?;
    m.register_symbol("host_square", host_square as *const () as usize);
    let f = m.make_function("sum_squares", &[f64_ty, f64_ty], &[f64_ty])?;

    let cx = EdscContext::new();
    let scope = cx.enter()?;
    let mut e = m.emitter(&cx, f)?;
    let args = e.bind_arguments()?;
    let callee = e.bind_function_constant(square)?;
    let aa = cx.call_with_result(callee, f64_ty, &[args[0]])?;
    let bb = cx.call_with_result(callee, f64_ty, &[args[1]])?;
    e.emit(cx.ret(&[cx.add(aa, bb)?])?)?;
    e.verify()?;
    drop(e);
    scope.exit();
    Ok(())
}

fn drive_sum_squares(m: &Module) -> ModuleResult<String> {
    let addr = m.function_address("sum_squares")?;
    // SAFETY: `sum_squares` has signature (f64, f64) -> f64.
    let f: extern "C" fn(f64, f64) -> f64 = unsafe { std::mem::transmute(addr) };
    Ok(format!("sum_squares(3, 4) = {}", f(3.0, 4.0)))
}
