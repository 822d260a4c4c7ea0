//! Node constructors.
//!
//! Every constructor validates the handles it is given, allocates exactly
//! one node (loop nests: one per level) and never simplifies. A failing
//! constructor allocates nothing.

use std::collections::HashSet;

use smallvec::SmallVec;
use tessera_ir::TypeRef;

use crate::errors::{EdscError, EdscResult};
use crate::ir_builder::TypeLookup;
use crate::node::*;
use crate::scope::EdscContext;

macro_rules! binary_ctors {
    ($($(#[$meta:meta])* $name:ident => $op:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            pub fn $name(&self, lhs: Expr, rhs: Expr) -> EdscResult<Expr> {
                self.binary(BinaryOp::$op, lhs, rhs)
            }
        )*
    };
}

impl EdscContext {
    // ========================================================================
    // Expressions
    // ========================================================================

    /// A fresh symbolic leaf of type `ty`.
    pub fn bindable(&self, ty: TypeRef) -> EdscResult<Expr> {
        self.alloc_bindable(ty)
    }

    /// Logical not on `i1`, arithmetic negation otherwise.
    pub fn negate(&self, operand: Expr) -> EdscResult<Expr> {
        self.check_exprs(&[operand])?;
        self.alloc_expr(ExprKind::Negate(operand))
    }

    pub fn binary(&self, op: BinaryOp, lhs: Expr, rhs: Expr) -> EdscResult<Expr> {
        self.check_exprs(&[lhs, rhs])?;
        self.alloc_expr(ExprKind::Binary { op, lhs, rhs })
    }

    binary_ctors! {
        add => Add,
        sub => Sub,
        mul => Mul,
        div => Div,
        rem => Rem,
        lt => Lt,
        le => Le,
        gt => Gt,
        ge => Ge,
        eq => Eq,
        ne => Ne,
        and => And,
        or => Or,
    }

    pub fn select(&self, cond: Expr, then: Expr, otherwise: Expr) -> EdscResult<Expr> {
        self.check_exprs(&[cond, then, otherwise])?;
        self.alloc_expr(ExprKind::Select {
            cond,
            then,
            otherwise,
        })
    }

    pub fn max(&self, candidates: &[Expr]) -> EdscResult<MaxExpr> {
        self.reduce(ReduceOp::Max, candidates).map(MaxExpr)
    }

    pub fn min(&self, candidates: &[Expr]) -> EdscResult<MinExpr> {
        self.reduce(ReduceOp::Min, candidates).map(MinExpr)
    }

    fn reduce(&self, op: ReduceOp, candidates: &[Expr]) -> EdscResult<Expr> {
        if candidates.is_empty() {
            return Err(EdscError::EmptyReduction);
        }
        self.check_exprs(candidates)?;
        self.alloc_expr(ExprKind::Reduce {
            op,
            candidates: SmallVec::from_slice(candidates),
        })
    }

    /// Call with no result.
    pub fn call(&self, callee: Expr, args: &[Expr]) -> EdscResult<Expr> {
        self.make_call(callee, args, None)
    }

    /// Call producing one value of type `result`.
    pub fn call_with_result(&self, callee: Expr, result: TypeRef, args: &[Expr]) -> EdscResult<Expr> {
        self.make_call(callee, args, Some(result))
    }

    fn make_call(&self, callee: Expr, args: &[Expr], result: Option<TypeRef>) -> EdscResult<Expr> {
        self.check_exprs(&[callee])?;
        self.check_exprs(args)?;
        self.alloc_expr(ExprKind::Call {
            callee,
            args: SmallVec::from_slice(args),
            result,
        })
    }

    /// A custom `dialect.op` operation.
    ///
    /// Attribute names must be unique; a repeated name fails with
    /// [`EdscError::DuplicateAttribute`] whatever the order of entries.
    pub fn op(
        &self,
        name: &str,
        result: Option<TypeRef>,
        operands: &[Expr],
        successors: &[Block],
        attributes: &[(&str, Attr)],
    ) -> EdscResult<Expr> {
        let valid_name = name
            .split_once('.')
            .is_some_and(|(dialect, op)| !dialect.is_empty() && !op.is_empty());
        if !valid_name {
            return Err(EdscError::InvalidOpName(name.to_owned()));
        }
        let mut seen = HashSet::new();
        for (key, _) in attributes {
            if !seen.insert(*key) {
                return Err(EdscError::DuplicateAttribute {
                    name: (*key).to_owned(),
                });
            }
        }
        self.check_exprs(operands)?;
        self.check_blocks(successors)?;
        let attrs: Vec<Attr> = attributes.iter().map(|(_, a)| *a).collect();
        self.check_attrs(&attrs)?;

        self.alloc_expr(ExprKind::Custom(CustomOp {
            name: name.to_owned(),
            result,
            operands: SmallVec::from_slice(operands),
            successors: SmallVec::from_slice(successors),
            attributes: attributes
                .iter()
                .map(|(key, attr)| ((*key).to_owned(), *attr))
                .collect(),
        }))
    }

    /// An integer or index literal, materialized when emitted.
    pub fn constant_integer(&self, ty: TypeRef, value: i64) -> EdscResult<Expr> {
        self.alloc_expr(ExprKind::ConstantInteger { ty, value })
    }

    /// View `buffer` as an indexable memref.
    ///
    /// Fails with [`EdscError::NotABuffer`] unless the declared type of
    /// `buffer` is a memref type.
    pub fn indexed(&self, buffer: Expr, types: &impl TypeLookup) -> EdscResult<Indexed> {
        let ty = self.declared_type(buffer, types)?;
        match ty.and_then(|ty| types.buffer_shape(ty)) {
            Some(shape) => Ok(Indexed {
                base: buffer,
                rank: shape.len(),
            }),
            None => Err(EdscError::NotABuffer(self.render_expr(buffer)?)),
        }
    }

    /// The type `e` is known to have before emission, if any.
    ///
    /// Comparisons and zero-result calls have none.
    pub fn declared_type(&self, e: Expr, types: &impl TypeLookup) -> EdscResult<Option<TypeRef>> {
        Ok(match self.expr_kind(e)? {
            ExprKind::Bindable { ty, .. } | ExprKind::ConstantInteger { ty, .. } => Some(ty),
            ExprKind::Call { result, .. } => result,
            ExprKind::Custom(op) => op.result,
            ExprKind::Negate(operand) => self.declared_type(operand, types)?,
            ExprKind::Binary { op, lhs, .. } if !op.is_comparison() => {
                self.declared_type(lhs, types)?
            }
            ExprKind::Binary { .. } => None,
            ExprKind::Select { then, .. } => self.declared_type(then, types)?,
            ExprKind::Reduce { candidates, .. } => self.declared_type(candidates[0], types)?,
            ExprKind::Load { buffer, .. } => self
                .declared_type(buffer, types)?
                .and_then(|ty| types.buffer_element(ty)),
        })
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Evaluate `expr` for its effects.
    pub fn eval(&self, expr: Expr) -> EdscResult<Stmt> {
        self.check_exprs(&[expr])?;
        self.alloc_stmt(StmtKind::Eval(expr))
    }

    /// A block whose arguments are the bindables `args`.
    pub fn block(&self, args: &[Expr], body: &[Stmt]) -> EdscResult<Block> {
        self.bindable_ids(args)?;
        self.check_stmts(body)?;
        self.alloc_block(BlockNode {
            args: SmallVec::from_slice(args),
            body: body.to_vec(),
        })
    }

    /// Replace the body of `block`, e.g. after using it as a branch target.
    pub fn set_block_body(&self, block: Block, body: &[Stmt]) -> EdscResult<()> {
        self.check_stmts(body)?;
        self.replace_block_body(block, body.to_vec())
    }

    /// Emit `block` as a new block at this point.
    pub fn block_stmt(&self, block: Block) -> EdscResult<Stmt> {
        self.check_blocks(&[block])?;
        self.alloc_stmt(StmtKind::Block(block))
    }

    pub fn branch(&self, dest: Block, args: &[Expr]) -> EdscResult<Stmt> {
        self.check_blocks(&[dest])?;
        self.check_exprs(args)?;
        self.alloc_stmt(StmtKind::Branch {
            dest,
            args: SmallVec::from_slice(args),
        })
    }

    pub fn cond_branch(
        &self,
        cond: Expr,
        true_dest: Block,
        true_args: &[Expr],
        false_dest: Block,
        false_args: &[Expr],
    ) -> EdscResult<Stmt> {
        self.check_exprs(&[cond])?;
        self.check_blocks(&[true_dest, false_dest])?;
        self.check_exprs(true_args)?;
        self.check_exprs(false_args)?;
        self.alloc_stmt(StmtKind::CondBranch {
            cond,
            true_dest,
            true_args: SmallVec::from_slice(true_args),
            false_dest,
            false_args: SmallVec::from_slice(false_args),
        })
    }

    /// `for iv = lower to upper step step { body }`
    pub fn for_loop(
        &self,
        iv: Expr,
        lower: Expr,
        upper: Expr,
        step: Expr,
        body: &[Stmt],
    ) -> EdscResult<Stmt> {
        self.bindable_ids(&[iv])?;
        self.check_exprs(&[lower, upper, step])?;
        self.check_stmts(body)?;
        self.alloc_stmt(StmtKind::For {
            iv,
            lower,
            upper,
            step,
            body: body.to_vec(),
        })
    }

    /// A perfect loop nest, outermost level first.
    ///
    /// All four lists must have the same, non-zero length.
    pub fn for_nest(
        &self,
        ivs: &[Expr],
        lower: &[Expr],
        upper: &[Expr],
        steps: &[Expr],
        body: &[Stmt],
    ) -> EdscResult<Stmt> {
        check_nest_arity(ivs.len(), lower.len(), upper.len(), steps.len())?;
        self.bindable_ids(ivs)?;
        self.check_exprs(lower)?;
        self.check_exprs(upper)?;
        self.check_exprs(steps)?;
        self.check_stmts(body)?;

        let mut inner = body.to_vec();
        for level in (0..ivs.len()).rev() {
            let stmt = self.alloc_stmt(StmtKind::For {
                iv: ivs[level],
                lower: lower[level],
                upper: upper[level],
                step: steps[level],
                body: inner,
            })?;
            inner = vec![stmt];
        }
        Ok(inner[0])
    }

    /// A loop whose bounds are `max(..)` and `min(..)` sets.
    pub fn max_min_for(
        &self,
        iv: Expr,
        lower: MaxExpr,
        upper: MinExpr,
        step: Expr,
        body: &[Stmt],
    ) -> EdscResult<Stmt> {
        self.for_loop(iv, lower.into(), upper.into(), step, body)
    }

    pub fn max_min_for_nest(
        &self,
        ivs: &[Expr],
        lower: &[MaxExpr],
        upper: &[MinExpr],
        steps: &[Expr],
        body: &[Stmt],
    ) -> EdscResult<Stmt> {
        let lower: Vec<Expr> = lower.iter().map(|&e| e.into()).collect();
        let upper: Vec<Expr> = upper.iter().map(|&e| e.into()).collect();
        self.for_nest(ivs, &lower, &upper, steps, body)
    }

    pub fn ret(&self, values: &[Expr]) -> EdscResult<Stmt> {
        self.check_exprs(values)?;
        self.alloc_stmt(StmtKind::Return(SmallVec::from_slice(values)))
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    pub fn bool_attr(&self, value: bool) -> EdscResult<Attr> {
        self.alloc_attr(AttrValue::Bool(value))
    }

    pub fn integer_attr(&self, ty: TypeRef, value: i64) -> EdscResult<Attr> {
        self.alloc_attr(AttrValue::Integer { ty, value })
    }
}

fn check_nest_arity(ivs: usize, lower: usize, upper: usize, steps: usize) -> EdscResult<()> {
    if ivs != lower || ivs != upper || ivs != steps {
        return Err(EdscError::LoopNestArity {
            ivs,
            lower,
            upper,
            steps,
        });
    }
    if ivs == 0 {
        return Err(EdscError::EmptyLoopNest);
    }
    Ok(())
}

impl Indexed {
    /// `buffer[indices]`
    pub fn load(self, cx: &EdscContext, indices: &[Expr]) -> EdscResult<Expr> {
        self.check_rank(indices)?;
        cx.check_exprs(&[self.base])?;
        cx.check_exprs(indices)?;
        cx.alloc_expr(ExprKind::Load {
            buffer: self.base,
            indices: SmallVec::from_slice(indices),
        })
    }

    /// `buffer[indices] = value`
    pub fn store(self, cx: &EdscContext, indices: &[Expr], value: Expr) -> EdscResult<Stmt> {
        self.check_rank(indices)?;
        cx.check_exprs(&[self.base, value])?;
        cx.check_exprs(indices)?;
        cx.alloc_stmt(StmtKind::Store {
            value,
            buffer: self.base,
            indices: SmallVec::from_slice(indices),
        })
    }

    fn check_rank(self, indices: &[Expr]) -> EdscResult<()> {
        if indices.len() != self.rank {
            return Err(EdscError::RankMismatch {
                expected: self.rank,
                found: indices.len(),
            });
        }
        Ok(())
    }
}

/// Whether `ty` is an integer or index type.
pub(crate) fn is_integer_like(types: &impl TypeLookup, ty: TypeRef) -> bool {
    types
        .builtin_type(ty)
        .is_some_and(|b| b.is_integer_like())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_ir::{DYNAMIC, FloatKind, IrContext};

    struct Fixture {
        ir: IrContext,
        cx: EdscContext,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                ir: IrContext::new(),
                cx: EdscContext::new(),
            }
        }
    }

    #[test]
    fn operators_allocate_one_node_each() {
        let mut f = Fixture::new();
        let i32_ty = f.ir.types.int(32);
        let _scope = f.cx.enter().unwrap();
        let x = f.cx.bindable(i32_ty).unwrap();
        let y = f.cx.bindable(i32_ty).unwrap();
        let before = f.cx.node_count();
        let sum = f.cx.add(x, y).unwrap();
        let same = f.cx.add(x, y).unwrap();

        assert_ne!(sum, same);
        assert_eq!(f.cx.node_count(), before + 2);
        assert_eq!(
            f.cx.expr_kind(sum).unwrap(),
            ExprKind::Binary {
                op: BinaryOp::Add,
                lhs: x,
                rhs: y
            }
        );
    }

    #[test]
    fn loop_nest_arity_is_checked() {
        let mut f = Fixture::new();
        let index = f.ir.types.index();
        let _scope = f.cx.enter().unwrap();
        let i = f.cx.bindable(index).unwrap();
        let j = f.cx.bindable(index).unwrap();
        let zero = f.cx.constant_integer(index, 0).unwrap();
        let n = f.cx.bindable(index).unwrap();
        let before = f.cx.node_count();

        let err = f.cx.for_nest(&[i, j], &[zero, zero], &[n], &[zero, zero], &[]);
        assert_eq!(
            err,
            Err(EdscError::LoopNestArity {
                ivs: 2,
                lower: 2,
                upper: 1,
                steps: 2
            })
        );
        assert_eq!(f.cx.for_nest(&[], &[], &[], &[], &[]), Err(EdscError::EmptyLoopNest));
        assert_eq!(f.cx.node_count(), before);
    }

    #[test]
    fn loop_nest_builds_nested_levels() {
        let mut f = Fixture::new();
        let index = f.ir.types.index();
        let _scope = f.cx.enter().unwrap();
        let i = f.cx.bindable(index).unwrap();
        let j = f.cx.bindable(index).unwrap();
        let one = f.cx.constant_integer(index, 1).unwrap();
        let body = f.cx.ret(&[]).unwrap();

        let nest = f.cx.for_nest(&[i, j], &[one, one], &[one, one], &[one, one], &[body]).unwrap();
        let StmtKind::For { iv, body: outer_body, .. } = f.cx.stmt_kind(nest).unwrap() else {
            panic!("expected a loop");
        };
        assert_eq!(iv, i);
        let StmtKind::For { iv, body: inner_body, .. } = f.cx.stmt_kind(outer_body[0]).unwrap() else {
            panic!("expected a nested loop");
        };
        assert_eq!(iv, j);
        assert_eq!(inner_body, vec![body]);
    }

    #[test]
    fn loop_ivs_must_be_bindable() {
        let mut f = Fixture::new();
        let index = f.ir.types.index();
        let _scope = f.cx.enter().unwrap();
        let one = f.cx.constant_integer(index, 1).unwrap();
        let err = f.cx.for_loop(one, one, one, one, &[]).unwrap_err();
        assert!(matches!(err, EdscError::NotBindable(_)));
    }

    #[test]
    fn duplicate_attributes_fail_in_either_order() {
        let mut f = Fixture::new();
        let i32_ty = f.ir.types.int(32);
        let _scope = f.cx.enter().unwrap();
        let flag = f.cx.bool_attr(true).unwrap();
        let count = f.cx.integer_attr(i32_ty, 4).unwrap();

        for attrs in [[("a", flag), ("a", count)], [("a", count), ("a", flag)]] {
            let err = f.cx.op("test.op", None, &[], &[], &attrs).unwrap_err();
            assert_eq!(err, EdscError::DuplicateAttribute { name: "a".to_owned() });
        }
        assert!(f.cx.op("test.op", None, &[], &[], &[("a", flag), ("b", count)]).is_ok());
    }

    #[test]
    fn op_names_need_a_dialect() {
        let f = Fixture::new();
        let _scope = f.cx.enter().unwrap();
        for name in ["plain", ".op", "dialect."] {
            assert!(matches!(
                f.cx.op(name, None, &[], &[], &[]),
                Err(EdscError::InvalidOpName(_))
            ));
        }
    }

    #[test]
    fn calls_with_and_without_result_differ() {
        let mut f = Fixture::new();
        let i32_ty = f.ir.types.int(32);
        let fn_ty = f.ir.types.function(&[i32_ty], &[i32_ty]);
        let _scope = f.cx.enter().unwrap();
        let callee = f.cx.bindable(fn_ty).unwrap();
        let x = f.cx.bindable(i32_ty).unwrap();

        let c0 = f.cx.call(callee, &[x]).unwrap();
        let c1 = f.cx.call_with_result(callee, i32_ty, &[x]).unwrap();
        assert_eq!(f.cx.declared_type(c0, &f.ir).unwrap(), None);
        assert_eq!(f.cx.declared_type(c1, &f.ir).unwrap(), Some(i32_ty));
    }

    #[test]
    fn indexed_requires_a_buffer() {
        let mut f = Fixture::new();
        let f32_ty = f.ir.types.float(FloatKind::F32);
        let buf_ty = f.ir.types.memref(f32_ty, &[4, DYNAMIC]);
        let index = f.ir.types.index();
        let _scope = f.cx.enter().unwrap();
        let scalar = f.cx.bindable(f32_ty).unwrap();
        let buf = f.cx.bindable(buf_ty).unwrap();
        let i = f.cx.bindable(index).unwrap();

        assert!(matches!(f.cx.indexed(scalar, &f.ir), Err(EdscError::NotABuffer(_))));
        let a = f.cx.indexed(buf, &f.ir).unwrap();
        assert_eq!(a.rank(), 2);

        let v = a.load(&f.cx, &[i, i]).unwrap();
        assert_eq!(f.cx.declared_type(v, &f.ir).unwrap(), Some(f32_ty));
        assert_eq!(
            a.store(&f.cx, &[i], v),
            Err(EdscError::RankMismatch {
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn empty_reductions_are_rejected() {
        let f = Fixture::new();
        let _scope = f.cx.enter().unwrap();
        assert_eq!(f.cx.max(&[]), Err(EdscError::EmptyReduction));
        assert_eq!(f.cx.min(&[]), Err(EdscError::EmptyReduction));
    }
}
