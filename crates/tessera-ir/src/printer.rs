//! Text format printer.
//!
//! ```text
//! builtin.module {
//!   func.func @add(%0: i32, %1: i32) -> i32 {
//!     %2 = arith.add %0, %1 : i32
//!     func.return %2
//!   }
//! }
//! ```
//!
//! Values are numbered `%N` and blocks labelled `^bbN`, both per function.

use std::collections::HashMap;
use std::fmt;
use std::fmt::Write;

use crate::context::IrContext;
use crate::dialect::{builtin, func};
use crate::refs::*;
use crate::symbol::Symbol;
use crate::types::*;

/// Print state for value numbering and block labeling.
struct PrintState<'a> {
    ctx: &'a IrContext,
    value_names: HashMap<ValueRef, String>,
    block_labels: HashMap<BlockRef, String>,
    next_value_num: usize,
    next_block_num: usize,
}

impl<'a> PrintState<'a> {
    fn new(ctx: &'a IrContext) -> Self {
        Self {
            ctx,
            value_names: HashMap::new(),
            block_labels: HashMap::new(),
            next_value_num: 0,
            next_block_num: 0,
        }
    }

    fn assign_value_name(&mut self, v: ValueRef) -> String {
        let name = format!("%{}", self.next_value_num);
        self.next_value_num += 1;
        self.value_names.insert(v, name.clone());
        name
    }

    fn value_name(&self, v: ValueRef) -> &str {
        self.value_names.get(&v).map(|s| s.as_str()).unwrap_or("%?")
    }

    fn assign_block_label(&mut self, b: BlockRef) {
        let label = format!("^bb{}", self.next_block_num);
        self.next_block_num += 1;
        self.block_labels.insert(b, label);
    }

    fn block_label(&self, b: BlockRef) -> &str {
        self.block_labels
            .get(&b)
            .map(|s| s.as_str())
            .unwrap_or("^bb?")
    }

    fn reset_numbering(&mut self) {
        self.next_value_num = 0;
        self.next_block_num = 0;
        self.value_names.clear();
        self.block_labels.clear();
    }
}

// ============================================================================
// Public API
// ============================================================================

/// Print an operation (and everything nested in it) as IR text.
pub fn print_op(ctx: &IrContext, op: OpRef) -> String {
    let mut state = PrintState::new(ctx);
    let mut out = String::new();
    print_operation(&mut state, &mut out, op, 0).expect("fmt::Write to String never fails");
    out
}

/// Print a type as IR text.
pub fn print_type(ctx: &IrContext, ty: TypeRef) -> String {
    let mut out = String::new();
    write_type(ctx, &mut out, ty).expect("fmt::Write to String never fails");
    out
}

/// Print an attribute as IR text.
pub fn print_attribute(ctx: &IrContext, attr: &Attribute) -> String {
    let mut out = String::new();
    write_attribute(ctx, &mut out, attr).expect("fmt::Write to String never fails");
    out
}

// ============================================================================
// Type printing
// ============================================================================

fn write_type(ctx: &IrContext, f: &mut impl Write, ty: TypeRef) -> fmt::Result {
    if let Some(builtin) = ctx.types.builtin(ty) {
        return write_builtin_type(ctx, f, &builtin);
    }
    let data = ctx.types.get(ty);
    write!(f, "{}.{}", data.dialect, data.name)?;
    if !data.params.is_empty() {
        f.write_char('(')?;
        write_type_list(ctx, f, &data.params)?;
        f.write_char(')')?;
    } else if !data.attrs.is_empty() {
        // Empty parens signal that attrs follow
        f.write_str("()")?;
    }
    if !data.attrs.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in data.attrs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} = ", key)?;
            write_attribute(ctx, f, val)?;
        }
        f.write_char('}')?;
    }
    Ok(())
}

fn write_builtin_type(ctx: &IrContext, f: &mut impl Write, ty: &BuiltinType) -> fmt::Result {
    match ty {
        BuiltinType::Int { width } => write!(f, "i{width}"),
        BuiltinType::Float(FloatKind::BF16) => f.write_str("bf16"),
        BuiltinType::Float(FloatKind::F16) => f.write_str("f16"),
        BuiltinType::Float(FloatKind::F32) => f.write_str("f32"),
        BuiltinType::Float(FloatKind::F64) => f.write_str("f64"),
        BuiltinType::Index => f.write_str("index"),
        BuiltinType::MemRef { elem, shape } => {
            f.write_str("memref<")?;
            for &dim in shape {
                if dim == DYNAMIC {
                    f.write_str("?x")?;
                } else {
                    write!(f, "{dim}x")?;
                }
            }
            write_type(ctx, f, *elem)?;
            f.write_char('>')
        }
        BuiltinType::Function { inputs, results } => {
            f.write_char('(')?;
            write_type_list(ctx, f, inputs)?;
            f.write_str(") -> ")?;
            write_results(ctx, f, results)
        }
    }
}

/// `()` for none, `t` for one, `(a, b)` for several.
fn write_results(ctx: &IrContext, f: &mut impl Write, results: &[TypeRef]) -> fmt::Result {
    if let [single] = results {
        return write_type(ctx, f, *single);
    }
    f.write_char('(')?;
    write_type_list(ctx, f, results)?;
    f.write_char(')')
}

fn write_type_list(ctx: &IrContext, f: &mut impl Write, types: &[TypeRef]) -> fmt::Result {
    for (i, &ty) in types.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_type(ctx, f, ty)?;
    }
    Ok(())
}

// ============================================================================
// Attribute printing
// ============================================================================

fn write_attribute(ctx: &IrContext, f: &mut impl Write, attr: &Attribute) -> fmt::Result {
    match attr {
        Attribute::Bool(b) => write!(f, "{b}"),
        Attribute::IntBits(v) => write!(f, "{v}"),
        Attribute::Integer { value, ty } => {
            write!(f, "{value} : ")?;
            write_type(ctx, f, *ty)
        }
        Attribute::FloatBits(bits) => {
            let v = f64::from_bits(*bits);
            let s = format!("{v}");
            f.write_str(&s)?;
            // Keep a decimal point on finite whole numbers
            if v.is_finite() && !s.contains('.') && !s.contains('e') && !s.contains('E') {
                f.write_str(".0")?;
            }
            Ok(())
        }
        Attribute::Symbol(sym) => write_symbol(f, *sym),
        Attribute::Type(ty) => write_type(ctx, f, *ty),
        Attribute::List(list) => {
            f.write_char('[')?;
            for (i, item) in list.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write_attribute(ctx, f, item)?;
            }
            f.write_char(']')
        }
    }
}

fn write_escaped_string(f: &mut impl Write, s: &str) -> fmt::Result {
    for ch in s.chars() {
        match ch {
            '\\' => f.write_str("\\\\")?,
            '"' => f.write_str("\\\"")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            '\r' => f.write_str("\\r")?,
            c if c.is_control() => write!(f, "\\x{:02x}", c as u32)?,
            c => f.write_char(c)?,
        }
    }
    Ok(())
}

fn write_symbol(f: &mut impl Write, sym: Symbol) -> fmt::Result {
    sym.with_str(|s| {
        let needs_quoting = s.is_empty() || !s.chars().all(|c| c.is_alphanumeric() || c == '_');
        if needs_quoting {
            f.write_str("@\"")?;
            write_escaped_string(f, s)?;
            f.write_char('"')
        } else {
            write!(f, "@{s}")
        }
    })
}

// ============================================================================
// Operation printing
// ============================================================================

fn print_operation(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    if builtin::is_module(state.ctx, op) {
        return print_module_op(state, f, op, indent);
    }
    if func::is_func(state.ctx, op) {
        return print_func_op(state, f, op, indent);
    }
    print_generic_op(state, f, op, indent)
}

fn print_generic_op(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    write!(f, "{indent_str}")?;

    let results = state.ctx.op_results(op);
    if !results.is_empty() {
        for (i, &v) in results.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let name = state.assign_value_name(v);
            f.write_str(&name)?;
        }
        f.write_str(" = ")?;
    }

    let data = state.ctx.op(op);
    write!(f, "{}.{}", data.dialect, data.name)?;

    let operands = state.ctx.op_operands(op);
    if !operands.is_empty() {
        f.write_char(' ')?;
        for (i, &v) in operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.value_name(v))?;
        }
    }

    if !data.successors.is_empty() {
        f.write_str(" [")?;
        for (i, &b) in data.successors.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(state.block_label(b))?;
        }
        f.write_char(']')?;
    }

    if !data.attributes.is_empty() {
        f.write_str(" {")?;
        for (i, (key, val)) in data.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = ")?;
            write_attribute(state.ctx, f, val)?;
        }
        f.write_char('}')?;
    }

    let result_types = state.ctx.op_result_types(op);
    if !result_types.is_empty() {
        f.write_str(" : ")?;
        write_type_list(state.ctx, f, result_types)?;
    }

    for &region in data.regions.iter() {
        f.write_str(" {\n")?;
        print_region(state, f, region, indent + 2)?;
        write!(f, "{indent_str}}}")?;
    }

    f.write_char('\n')
}

// ============================================================================
// Region / Block printing
// ============================================================================

fn print_region(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    region: RegionRef,
    indent: usize,
) -> fmt::Result {
    let blocks = &state.ctx.region(region).blocks;

    for &block in blocks {
        state.assign_block_label(block);
    }

    let can_elide_label = blocks.len() == 1 && state.ctx.block_args(blocks[0]).is_empty();
    for &block in blocks {
        if !can_elide_label {
            print_block_header(state, f, block, indent, true)?;
        }
        print_block_ops(state, f, block, indent + 2)?;
    }
    Ok(())
}

fn print_block_header(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    block: BlockRef,
    indent: usize,
    with_args: bool,
) -> fmt::Result {
    let ctx = state.ctx;
    let label = state.block_label(block).to_owned();
    write!(f, "{}{label}", " ".repeat(indent))?;
    let args = ctx.block_args(block);
    if with_args && !args.is_empty() {
        f.write_char('(')?;
        write_arg_list(state, f, args)?;
        f.write_char(')')?;
    }
    f.write_str(":\n")
}

fn write_arg_list(state: &mut PrintState<'_>, f: &mut impl Write, args: &[ValueRef]) -> fmt::Result {
    for (i, &arg) in args.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        let name = state.assign_value_name(arg);
        write!(f, "{name}: ")?;
        write_type(state.ctx, f, state.ctx.value_ty(arg))?;
    }
    Ok(())
}

fn print_block_ops(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    block: BlockRef,
    indent: usize,
) -> fmt::Result {
    for &op in &state.ctx.block(block).ops {
        print_operation(state, f, op, indent)?;
    }
    Ok(())
}

// ============================================================================
// Special operation printers
// ============================================================================

fn print_module_op(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    writeln!(f, "{indent_str}builtin.module {{")?;
    for &region in &state.ctx.op(op).regions {
        for &block in &state.ctx.region(region).blocks {
            for &child in &state.ctx.block(block).ops {
                state.reset_numbering();
                print_operation(state, f, child, indent + 2)?;
            }
        }
    }
    writeln!(f, "{indent_str}}}")
}

/// `func.func @f(%0: i32) -> i32 { .. }`, or `func.func @f(i32) -> i32`
/// for a declaration.
fn print_func_op(
    state: &mut PrintState<'_>,
    f: &mut impl Write,
    op: OpRef,
    indent: usize,
) -> fmt::Result {
    let indent_str = " ".repeat(indent);
    let Some((name, fn_ty)) = func::signature(state.ctx, op) else {
        return print_generic_op(state, f, op, indent);
    };
    let Some(BuiltinType::Function { inputs, results }) = state.ctx.types.builtin(fn_ty) else {
        return print_generic_op(state, f, op, indent);
    };

    write!(f, "{indent_str}func.func ")?;
    write_symbol(f, name)?;

    state.reset_numbering();
    let ctx = state.ctx;
    let blocks = &ctx.region(ctx.op(op).regions[0]).blocks;

    f.write_char('(')?;
    match blocks.first() {
        Some(&entry) => write_arg_list(state, f, ctx.block_args(entry))?,
        None => write_type_list(ctx, f, &inputs)?,
    }
    f.write_char(')')?;
    if !results.is_empty() {
        f.write_str(" -> ")?;
        write_results(ctx, f, &results)?;
    }

    if blocks.is_empty() {
        return f.write_char('\n');
    }

    f.write_str(" {\n")?;
    for &block in blocks {
        state.assign_block_label(block);
    }
    for (i, &block) in blocks.iter().enumerate() {
        // The entry block's args are the signature above.
        if blocks.len() > 1 {
            print_block_header(state, f, block, indent + 2, i > 0)?;
        }
        print_block_ops(state, f, block, indent + 4)?;
    }
    writeln!(f, "{indent_str}}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::OpBuilder;
    use crate::dialect::{arith, cf, memref, scf};
    use crate::function::FunctionHandle;
    use crate::module::ModuleOp;

    #[test]
    fn builtin_types() {
        let mut ctx = IrContext::new();
        let i7 = ctx.types.int(7);
        let bf16 = ctx.types.float(FloatKind::BF16);
        let f32_ty = ctx.types.float(FloatKind::F32);
        let index = ctx.types.index();
        let m = ctx.types.memref(f32_ty, &[3, DYNAMIC]);
        let scalar_buf = ctx.types.memref(f32_ty, &[]);
        let fn0 = ctx.types.function(&[], &[]);
        let fn2 = ctx.types.function(&[i7, m], &[index, bf16]);

        assert_eq!(print_type(&ctx, i7), "i7");
        assert_eq!(print_type(&ctx, bf16), "bf16");
        assert_eq!(print_type(&ctx, m), "memref<3x?xf32>");
        assert_eq!(print_type(&ctx, scalar_buf), "memref<f32>");
        assert_eq!(print_type(&ctx, fn0), "() -> ()");
        assert_eq!(print_type(&ctx, fn2), "(i7, memref<3x?xf32>) -> (index, bf16)");
    }

    #[test]
    fn typed_integer_attribute() {
        let mut ctx = IrContext::new();
        let i8_ty = ctx.types.int(8);
        let attr = Attribute::Integer { value: -3, ty: i8_ty };
        assert_eq!(print_attribute(&ctx, &attr), "-3 : i8");
        assert_eq!(print_attribute(&ctx, &Attribute::float(2.0)), "2.0");
    }

    #[test]
    fn add_function() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let i32_ty = ctx.types.int(32);
        let f = FunctionHandle::make(&mut ctx, module, "add", &[i32_ty, i32_ty], &[i32_ty]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let args = f.arguments(&ctx).to_vec();

        let mut b = OpBuilder::at_end(&mut ctx, entry);
        let sum = b.insert(arith::binary(arith::BinaryOp::Add, args[0], args[1], i32_ty));
        let v = b.ctx().op_result(sum, 0);
        b.insert(func::return_(&[v]));

        insta::assert_snapshot!(print_op(&ctx, module.op()), @r"
        builtin.module {
          func.func @add(%0: i32, %1: i32) -> i32 {
            %2 = arith.add %0, %1 : i32
            func.return %2
          }
        }
        ");
    }

    #[test]
    fn declaration_prints_signature_only() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let f32_ty = ctx.types.float(FloatKind::F32);
        FunctionHandle::declare(&mut ctx, module, "sqrtf", &[f32_ty], &[f32_ty]).unwrap();

        assert_eq!(
            print_op(&ctx, module.op()),
            "builtin.module {\n  func.func @sqrtf(f32) -> f32\n}\n"
        );
    }

    #[test]
    fn loops_and_branches() {
        let mut ctx = IrContext::new();
        let module = ModuleOp::create(&mut ctx);
        let f32_ty = ctx.types.float(FloatKind::F32);
        let index = ctx.types.index();
        let buf = ctx.types.memref(f32_ty, &[4]);
        let f = FunctionHandle::make(&mut ctx, module, "zero", &[buf], &[]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let mem = f.arguments(&ctx)[0];

        let mut b = OpBuilder::at_end(&mut ctx, entry);
        let lb = b.insert(arith::constant(index, Attribute::from(0i64)));
        let ub = b.insert(memref::dim(mem, 0, index));
        let zero = b.insert(arith::constant(f32_ty, Attribute::float(0.0)));
        let (lb, ub, zero) = (
            b.ctx().op_result(lb, 0),
            b.ctx().op_result(ub, 0),
            b.ctx().op_result(zero, 0),
        );
        let exit = b.create_block(&[]);
        let body = b.create_block(&[index]);
        let region = b.create_region(&[body]);
        b.insert(scf::for_loop(lb, ub, lb, region));
        b.insert(cf::br(exit, &[]));
        b.append_block(exit);
        b.set_insertion_point(body);
        let iv = b.ctx().block_args(body)[0];
        b.insert(memref::store(zero, mem, &[iv]));
        b.insert(scf::yield_());
        b.set_insertion_point(exit);
        b.insert(func::return_(&[]));

        let text = print_op(&ctx, f.op());
        assert_eq!(
            text,
            "func.func @zero(%0: memref<4xf32>) {\n\
             \x20 ^bb0:\n\
             \x20   %1 = arith.const {value = 0} : index\n\
             \x20   %2 = memref.dim %0 {index = 0} : index\n\
             \x20   %3 = arith.const {value = 0.0} : f32\n\
             \x20   scf.for %1, %2, %1 {\n\
             \x20     ^bb2(%4: index):\n\
             \x20       memref.store %3, %0, %4\n\
             \x20       scf.yield\n\
             \x20   }\n\
             \x20   cf.br [^bb1]\n\
             \x20 ^bb1:\n\
             \x20   func.return\n\
             }\n"
        );
    }
}
