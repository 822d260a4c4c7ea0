//! Debug rendering of node trees.
//!
//! ```text
//! for($3 = 0 to $2 step 1) {
//!   store(load($1[$3]), $2[$3]);
//! }
//! ```

use std::fmt::Write;

use crate::errors::EdscResult;
use crate::node::*;
use crate::scope::EdscContext;

impl EdscContext {
    pub fn render_expr(&self, e: Expr) -> EdscResult<String> {
        let mut out = String::new();
        self.write_expr(&mut out, e)?;
        Ok(out)
    }

    pub fn render_stmt(&self, s: Stmt) -> EdscResult<String> {
        let mut out = String::new();
        self.write_stmt(&mut out, s, "")?;
        Ok(out)
    }

    pub fn render_block(&self, b: Block) -> EdscResult<String> {
        let mut out = String::new();
        self.write_block(&mut out, b, "")?;
        Ok(out)
    }

    fn write_expr(&self, out: &mut String, e: Expr) -> EdscResult<()> {
        match self.expr_kind(e)? {
            ExprKind::Bindable { id, .. } => push(out, format_args!("${id}")),
            ExprKind::Negate(operand) => {
                out.push('~');
                self.write_expr(out, operand)?;
            }
            ExprKind::Binary { op, lhs, rhs } => {
                out.push('(');
                self.write_expr(out, lhs)?;
                push(out, format_args!(" {} ", op.token()));
                self.write_expr(out, rhs)?;
                out.push(')');
            }
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => {
                out.push_str("select(");
                self.write_exprs(out, &[cond, then, otherwise])?;
                out.push(')');
            }
            ExprKind::Reduce { op, candidates } => {
                out.push_str(match op {
                    ReduceOp::Max => "max(",
                    ReduceOp::Min => "min(",
                });
                self.write_exprs(out, &candidates)?;
                out.push(')');
            }
            ExprKind::Call { callee, args, .. } => {
                out.push_str("call(");
                self.write_expr(out, callee)?;
                if !args.is_empty() {
                    out.push_str(", ");
                    self.write_exprs(out, &args)?;
                }
                out.push(')');
            }
            ExprKind::Custom(op) => {
                push(out, format_args!("{}(", op.name));
                self.write_exprs(out, &op.operands)?;
                out.push(')');
            }
            ExprKind::Load { buffer, indices } => {
                out.push_str("load(");
                self.write_expr(out, buffer)?;
                out.push('[');
                self.write_exprs(out, &indices)?;
                out.push_str("])");
            }
            ExprKind::ConstantInteger { value, .. } => push(out, format_args!("{value}")),
        }
        Ok(())
    }

    fn write_exprs(&self, out: &mut String, exprs: &[Expr]) -> EdscResult<()> {
        for (i, &e) in exprs.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_expr(out, e)?;
        }
        Ok(())
    }

    fn write_stmt(&self, out: &mut String, s: Stmt, indent: &str) -> EdscResult<()> {
        match self.stmt_kind(s)? {
            StmtKind::Eval(e) => self.write_expr(out, e)?,
            StmtKind::Store {
                value,
                buffer,
                indices,
            } => {
                out.push_str("store(");
                self.write_expr(out, value)?;
                out.push_str(", ");
                self.write_expr(out, buffer)?;
                out.push('[');
                self.write_exprs(out, &indices)?;
                out.push_str("])");
            }
            StmtKind::Block(b) => self.write_block(out, b, indent)?,
            StmtKind::Branch { args, .. } => {
                out.push_str("br ^bb(");
                self.write_exprs(out, &args)?;
                out.push(')');
            }
            StmtKind::CondBranch {
                cond,
                true_args,
                false_args,
                ..
            } => {
                out.push_str("cond_br ");
                self.write_expr(out, cond)?;
                out.push_str(", ^bb(");
                self.write_exprs(out, &true_args)?;
                out.push_str("), ^bb(");
                self.write_exprs(out, &false_args)?;
                out.push(')');
            }
            StmtKind::For {
                iv,
                lower,
                upper,
                step,
                body,
            } => {
                out.push_str("for(");
                self.write_expr(out, iv)?;
                out.push_str(" = ");
                self.write_expr(out, lower)?;
                out.push_str(" to ");
                self.write_expr(out, upper)?;
                out.push_str(" step ");
                self.write_expr(out, step)?;
                out.push_str(") {\n");
                let inner = format!("{indent}  ");
                for stmt in body {
                    out.push_str(&inner);
                    self.write_stmt(out, stmt, &inner)?;
                    out.push_str(";\n");
                }
                out.push_str(indent);
                out.push('}');
            }
            StmtKind::Return(values) => {
                out.push_str("return");
                if !values.is_empty() {
                    out.push(' ');
                    self.write_exprs(out, &values)?;
                }
            }
        }
        Ok(())
    }

    fn write_block(&self, out: &mut String, b: Block, indent: &str) -> EdscResult<()> {
        let node = self.block_node(b)?;
        out.push_str("^bb");
        if !node.args.is_empty() {
            out.push('(');
            self.write_exprs(out, &node.args)?;
            out.push(')');
        }
        out.push_str(":\n");
        let inner = format!("{indent}  ");
        for stmt in node.body {
            out.push_str(&inner);
            self.write_stmt(out, stmt, &inner)?;
            out.push('\n');
        }
        Ok(())
    }
}

fn push(out: &mut String, args: std::fmt::Arguments<'_>) {
    // Writing to a String cannot fail.
    let _ = out.write_fmt(args);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::{FloatKind, IrContext};

    #[test]
    fn renders_expressions() {
        let mut ir = IrContext::new();
        let i32_ty = ir.types.int(32);
        let cx = EdscContext::new();
        let _scope = cx.enter().unwrap();
        let x = cx.bindable(i32_ty).unwrap();
        let y = cx.bindable(i32_ty).unwrap();
        let sum = cx.add(x, y).unwrap();
        let cmp = cx.lt(sum, y).unwrap();
        let sel = cx.select(cmp, x, cx.negate(y).unwrap()).unwrap();
        let m = cx.max(&[x, y]).unwrap();

        assert_eq!(cx.render_expr(sum).unwrap(), "($1 + $2)");
        assert_eq!(cx.render_expr(sel).unwrap(), "select((($1 + $2) < $2), $1, ~$2)");
        assert_eq!(cx.render_expr(m.into()).unwrap(), "max($1, $2)");
    }

    #[test]
    fn renders_loops() {
        let mut ir = IrContext::new();
        let index = ir.types.index();
        let f32_ty = ir.types.float(FloatKind::F32);
        let buf_ty = ir.types.memref(f32_ty, &[8]);
        let cx = EdscContext::new();
        let _scope = cx.enter().unwrap();
        let a = cx.bindable(buf_ty).unwrap();
        let b = cx.bindable(buf_ty).unwrap();
        let i = cx.bindable(index).unwrap();
        let zero = cx.constant_integer(index, 0).unwrap();
        let n = cx.constant_integer(index, 8).unwrap();
        let one = cx.constant_integer(index, 1).unwrap();
        let (a, b) = (cx.indexed(a, &ir).unwrap(), cx.indexed(b, &ir).unwrap());
        let copy = b.store(&cx, &[i], a.load(&cx, &[i]).unwrap()).unwrap();
        let nest = cx.for_loop(i, zero, n, one, &[copy]).unwrap();

        assert_eq!(
            cx.render_stmt(nest).unwrap(),
            "for($3 = 0 to 8 step 1) {\n  store(load($1[$3]), $2[$3]);\n}"
        );
    }
}
