//! Binding and emission of node trees into one function.
//!
//! An [`Emitter`] resolves bindables to IR values (constants, function
//! arguments, buffer sizes) and lowers expressions and statements at the
//! insertion point of its [`IrBuilder`].
//!
//! Emitted non-bindable expressions are remembered per IR block. A later
//! emission of the same node reuses the value when the insertion block is
//! that block or a loop body nested in it; blocks created for branch
//! targets start empty, so no value is used outside the region it
//! dominates. Rebinding a bound bindable, either through [`Emitter::bind`]
//! or as a loop induction variable, forgets everything remembered so far.
//!
//! Loop bodies are single blocks: blocks and branches cannot be emitted
//! inside them.

use std::collections::HashMap;

use smallvec::SmallVec;
use tessera_ir::dialect::{arith, cf, func, memref, scf};
use tessera_ir::{
    Attribute, BlockRef, BuiltinType, DYNAMIC, FloatKind, FunctionHandle, OperationDataBuilder,
    Symbol, TypeRef, ValueRef,
};

use crate::build::is_integer_like;
use crate::errors::{EdscError, EdscResult};
use crate::ir_builder::{IrBuilder, TypeLookup};
use crate::node::*;
use crate::scope::EdscContext;

/// A literal to materialize with [`Emitter::bind_constant`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    BF16(f32),
    F16(f32),
    F32(f32),
    F64(f64),
    /// Integer of any width of at least 1.
    Int { width: u32, value: i64 },
    Index(i64),
}

/// Iteration space over a buffer: per dimension `lower..upper` by `step`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct View {
    pub lower: Vec<Expr>,
    pub upper: Vec<Expr>,
    pub steps: Vec<Expr>,
}

impl View {
    pub fn rank(&self) -> usize {
        self.upper.len()
    }
}

pub struct Emitter<'cx, B> {
    cx: &'cx EdscContext,
    builder: B,
    function: FunctionHandle,
    /// Values bound to bindables.
    bindings: HashMap<Expr, ValueRef>,
    /// Values of emitted expressions, by the block they were emitted in,
    /// with the binding generation they were emitted under.
    emitted: HashMap<BlockRef, HashMap<Expr, (ValueRef, u64)>>,
    /// Bumped each time a bound bindable is bound to another value.
    generation: u64,
    /// Loop body block to the block holding the loop.
    enclosing: HashMap<BlockRef, BlockRef>,
    /// Blocks materialized for `Block` nodes.
    blocks: HashMap<Block, BlockRef>,
}

impl<'cx, B: IrBuilder> Emitter<'cx, B> {
    /// Emitter for `function`, inserting wherever `builder` points.
    ///
    /// Fails with [`EdscError::FunctionNotDefined`] if `function` has no
    /// body.
    pub fn new(cx: &'cx EdscContext, builder: B, function: FunctionHandle) -> EdscResult<Self> {
        if builder.function_entry(function).is_none() {
            let name = builder.function_name(function);
            return Err(EdscError::FunctionNotDefined(name.to_string()));
        }
        Ok(Self {
            cx,
            builder,
            function,
            bindings: HashMap::new(),
            emitted: HashMap::new(),
            generation: 0,
            enclosing: HashMap::new(),
            blocks: HashMap::new(),
        })
    }

    pub fn context(&self) -> &'cx EdscContext {
        self.cx
    }

    pub fn function(&self) -> FunctionHandle {
        self.function
    }

    pub fn builder(&self) -> &B {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut B {
        &mut self.builder
    }

    pub fn into_builder(self) -> B {
        self.builder
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Bind `bindable` to `value`. The value must have the declared type.
    pub fn bind(&mut self, bindable: Expr, value: ValueRef) -> EdscResult<Expr> {
        let ExprKind::Bindable { ty, id } = self.cx.expr_kind(bindable)? else {
            return Err(EdscError::NotBindable(self.cx.render_expr(bindable)?));
        };
        if self.builder.value_type(value) != ty {
            return Err(EdscError::TypeMismatch {
                symbol: format!("${id}"),
            });
        }
        self.set_binding(bindable, value);
        Ok(bindable)
    }

    /// Bind `e`, returning its previous value.
    fn set_binding(&mut self, e: Expr, value: ValueRef) -> Option<ValueRef> {
        let previous = self.bindings.insert(e, value);
        if previous.is_some_and(|old| old != value) {
            self.generation += 1;
        }
        previous
    }

    /// A fresh bindable already bound to `value`.
    fn bind_value(&mut self, value: ValueRef) -> EdscResult<Expr> {
        let e = self.cx.bindable(self.builder.value_type(value))?;
        self.bindings.insert(e, value);
        Ok(e)
    }

    /// Materialize `constant` at the insertion point.
    pub fn bind_constant(&mut self, constant: Constant) -> EdscResult<Expr> {
        let (ty, value) = match constant {
            Constant::BF16(v) => (self.builder.float_type(FloatKind::BF16), Attribute::float(v.into())),
            Constant::F16(v) => (self.builder.float_type(FloatKind::F16), Attribute::float(v.into())),
            Constant::F32(v) => (self.builder.float_type(FloatKind::F32), Attribute::float(v.into())),
            Constant::F64(v) => (self.builder.float_type(FloatKind::F64), Attribute::float(v)),
            Constant::Int { width: 0, .. } => return Err(EdscError::InvalidWidth),
            Constant::Int { width, value } => (self.builder.int_type(width), Attribute::from(value)),
            Constant::Index(v) => (self.builder.index_type(), Attribute::from(v)),
        };
        let e = self.cx.bindable(ty)?;
        let op = self.builder.insert(arith::constant(ty, value));
        let v = self.builder.op_results(op)[0];
        self.bindings.insert(e, v);
        Ok(e)
    }

    pub fn bind_constant_bf16(&mut self, value: f32) -> EdscResult<Expr> {
        self.bind_constant(Constant::BF16(value))
    }

    pub fn bind_constant_f16(&mut self, value: f32) -> EdscResult<Expr> {
        self.bind_constant(Constant::F16(value))
    }

    pub fn bind_constant_f32(&mut self, value: f32) -> EdscResult<Expr> {
        self.bind_constant(Constant::F32(value))
    }

    pub fn bind_constant_f64(&mut self, value: f64) -> EdscResult<Expr> {
        self.bind_constant(Constant::F64(value))
    }

    pub fn bind_constant_int(&mut self, width: u32, value: i64) -> EdscResult<Expr> {
        self.bind_constant(Constant::Int { width, value })
    }

    pub fn bind_constant_index(&mut self, value: i64) -> EdscResult<Expr> {
        self.bind_constant(Constant::Index(value))
    }

    /// Reference `function` as a value, for use as a call callee.
    pub fn bind_function_constant(&mut self, function: FunctionHandle) -> EdscResult<Expr> {
        let name = self.builder.function_name(function);
        let fn_ty = self.builder.function_type(function);
        let e = self.cx.bindable(fn_ty)?;
        let op = self.builder.insert(func::constant(name, fn_ty));
        let v = self.builder.op_results(op)[0];
        self.bindings.insert(e, v);
        Ok(e)
    }

    fn arguments(&self) -> EdscResult<&[ValueRef]> {
        match self.builder.function_entry(self.function) {
            Some(entry) => Ok(self.builder.block_args(entry)),
            None => {
                let name = self.builder.function_name(self.function);
                Err(EdscError::FunctionNotDefined(name.to_string()))
            }
        }
    }

    /// The `pos`-th formal parameter.
    pub fn bind_argument(&mut self, pos: usize) -> EdscResult<Expr> {
        let args = self.arguments()?;
        let Some(&value) = args.get(pos) else {
            return Err(EdscError::ArgumentOutOfRange {
                pos,
                arity: args.len(),
            });
        };
        self.bind_value(value)
    }

    /// Every formal parameter, in declaration order.
    pub fn bind_arguments(&mut self) -> EdscResult<Vec<Expr>> {
        let args = self.arguments()?.to_vec();
        args.into_iter().map(|v| self.bind_value(v)).collect()
    }

    /// The `pos`-th parameter, which must be a buffer, with its view.
    pub fn bind_argument_view(&mut self, pos: usize) -> EdscResult<(Expr, View)> {
        let arg = self.bind_argument(pos)?;
        let view = self.bind_view(arg)?;
        Ok((arg, view))
    }

    fn buffer_value(&mut self, buffer: Expr) -> EdscResult<(ValueRef, Vec<i64>)> {
        let value = self.emit_expr(buffer)?;
        match self.builder.buffer_shape(self.builder.value_type(value)) {
            Some(shape) => Ok((value, shape)),
            None => Err(EdscError::NotABuffer(self.cx.render_expr(buffer)?)),
        }
    }

    pub fn buffer_rank(&mut self, buffer: Expr) -> EdscResult<usize> {
        Ok(self.buffer_value(buffer)?.1.len())
    }

    /// Size of dimension `dim`: a constant if static, `memref.dim` if not.
    pub fn bind_dim(&mut self, buffer: Expr, dim: usize) -> EdscResult<Expr> {
        let (value, shape) = self.buffer_value(buffer)?;
        let Some(&size) = shape.get(dim) else {
            return Err(EdscError::DimensionOutOfRange {
                dim,
                rank: shape.len(),
            });
        };
        if size != DYNAMIC {
            return self.bind_constant_index(size);
        }
        let index = self.builder.index_type();
        let e = self.cx.bindable(index)?;
        let dim = u32::try_from(dim).map_err(|_| EdscError::DimensionOutOfRange {
            dim,
            rank: shape.len(),
        })?;
        let op = self.builder.insert(memref::dim(value, dim, index));
        let v = self.builder.op_results(op)[0];
        self.bindings.insert(e, v);
        Ok(e)
    }

    /// One size per dimension.
    pub fn bind_shape(&mut self, buffer: Expr) -> EdscResult<Vec<Expr>> {
        let rank = self.buffer_rank(buffer)?;
        (0..rank).map(|d| self.bind_dim(buffer, d)).collect()
    }

    /// The full iteration space of `buffer`: zeros, sizes, ones.
    pub fn bind_view(&mut self, buffer: Expr) -> EdscResult<View> {
        let upper = self.bind_shape(buffer)?;
        if upper.is_empty() {
            return Ok(View {
                lower: Vec::new(),
                upper,
                steps: Vec::new(),
            });
        }
        let zero = self.bind_constant_index(0)?;
        let one = self.bind_constant_index(1)?;
        Ok(View {
            lower: vec![zero; upper.len()],
            steps: vec![one; upper.len()],
            upper,
        })
    }

    /// The value `e` is bound to or was last emitted as, if visible here.
    pub fn value_of(&self, e: Expr) -> Option<ValueRef> {
        self.bindings.get(&e).copied().or_else(|| self.remembered(e))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    /// Emit `e` and return its value.
    pub fn emit_expr(&mut self, e: Expr) -> EdscResult<ValueRef> {
        match self.emit_value(e)? {
            Some(v) => Ok(v),
            None => Err(EdscError::NoValue(self.cx.render_expr(e)?)),
        }
    }

    fn emit_exprs(&mut self, exprs: &[Expr]) -> EdscResult<SmallVec<[ValueRef; 4]>> {
        exprs.iter().map(|&e| self.emit_expr(e)).collect()
    }

    fn remembered(&self, e: Expr) -> Option<ValueRef> {
        let mut block = Some(self.builder.insertion_block());
        while let Some(b) = block {
            if let Some(&(v, generation)) = self.emitted.get(&b).and_then(|values| values.get(&e)) {
                if generation == self.generation {
                    return Some(v);
                }
            }
            block = self.enclosing.get(&b).copied();
        }
        None
    }

    fn emit_value(&mut self, e: Expr) -> EdscResult<Option<ValueRef>> {
        let kind = self.cx.expr_kind(e)?;
        if let ExprKind::Bindable { id, .. } = kind {
            return match self.bindings.get(&e) {
                Some(&v) => Ok(Some(v)),
                None => Err(EdscError::Unbound {
                    symbol: format!("${id}"),
                }),
            };
        }
        if let Some(v) = self.remembered(e) {
            return Ok(Some(v));
        }

        let value = match kind {
            ExprKind::Bindable { .. } => unreachable!("bindables are resolved above"),
            ExprKind::Negate(operand) => {
                let v = self.emit_expr(operand)?;
                let ty = self.builder.value_type(v);
                Some(self.insert_single(arith::neg(v, ty)))
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.emit_expr(lhs)?;
                let r = self.emit_expr(rhs)?;
                Some(self.emit_binary(op, l, r))
            }
            ExprKind::Select {
                cond,
                then,
                otherwise,
            } => {
                let c = self.emit_expr(cond)?;
                let a = self.emit_expr(then)?;
                let b = self.emit_expr(otherwise)?;
                let ty = self.builder.value_type(a);
                Some(self.insert_single(arith::select(c, a, b, ty)))
            }
            ExprKind::Reduce { op, candidates } => {
                let values = self.emit_exprs(&candidates)?;
                let fold = match op {
                    ReduceOp::Max => arith::BinaryOp::Max,
                    ReduceOp::Min => arith::BinaryOp::Min,
                };
                let mut acc = values[0];
                for &v in &values[1..] {
                    let ty = self.builder.value_type(acc);
                    acc = self.insert_single(arith::binary(fold, acc, v, ty));
                }
                Some(acc)
            }
            ExprKind::Call {
                callee,
                args,
                result,
            } => {
                let f = self.emit_expr(callee)?;
                let is_function = matches!(
                    self.builder.builtin_type(self.builder.value_type(f)),
                    Some(BuiltinType::Function { .. })
                );
                if !is_function {
                    return Err(EdscError::NotAFunction(self.cx.render_expr(callee)?));
                }
                let args = self.emit_exprs(&args)?;
                let results: SmallVec<[TypeRef; 1]> = result.into_iter().collect();
                let op = self.builder.insert(func::call_indirect(f, &args, &results));
                self.builder.op_results(op).first().copied()
            }
            ExprKind::Custom(op) => self.emit_custom(op)?,
            ExprKind::Load { buffer, indices } => {
                let (mem, _) = self.buffer_value(buffer)?;
                let Some(elem) = self.builder.buffer_element(self.builder.value_type(mem)) else {
                    return Err(EdscError::NotABuffer(self.cx.render_expr(buffer)?));
                };
                let indices = self.emit_exprs(&indices)?;
                Some(self.insert_single(memref::load(mem, &indices, elem)))
            }
            ExprKind::ConstantInteger { ty, value } => {
                if !is_integer_like(&self.builder, ty) {
                    return Err(EdscError::NotAnInteger(self.cx.render_expr(e)?));
                }
                Some(self.insert_single(arith::constant(ty, Attribute::from(value))))
            }
        };

        if let Some(v) = value {
            let block = self.builder.insertion_block();
            self.emitted
                .entry(block)
                .or_default()
                .insert(e, (v, self.generation));
        }
        Ok(value)
    }

    fn emit_binary(&mut self, op: BinaryOp, l: ValueRef, r: ValueRef) -> ValueRef {
        match lower_binary(op) {
            LoweredBinary::Cmp(pred) => {
                let bool_ty = self.builder.int_type(1);
                self.insert_single(arith::cmp(pred, l, r, bool_ty))
            }
            LoweredBinary::Arith(bin) => {
                let ty = self.builder.value_type(l);
                self.insert_single(arith::binary(bin, l, r, ty))
            }
        }
    }

    fn emit_custom(&mut self, op: CustomOp) -> EdscResult<Option<ValueRef>> {
        let (dialect, name) = op
            .name
            .split_once('.')
            .ok_or_else(|| EdscError::InvalidOpName(op.name.clone()))?;
        if !op.successors.is_empty() {
            self.outside_loop_body()?;
        }
        let operands = self.emit_exprs(&op.operands)?;
        let mut successors: SmallVec<[BlockRef; 2]> = SmallVec::new();
        for &block in &op.successors {
            successors.push(self.block_target(block)?);
        }

        let mut data = OperationDataBuilder::new(Symbol::from_dynamic(dialect), Symbol::from_dynamic(name))
            .operands(operands)
            .results(op.result)
            .successors(successors);
        for (key, attr) in &op.attributes {
            let value = match self.cx.attr_value(*attr)? {
                AttrValue::Bool(b) => Attribute::Bool(b),
                AttrValue::Integer { ty, value } => Attribute::Integer { value, ty },
            };
            data = data.attr(Symbol::from_dynamic(key), value);
        }
        let created = self.builder.insert(data);
        Ok(self.builder.op_results(created).first().copied())
    }

    fn insert_single(&mut self, op: OperationDataBuilder) -> ValueRef {
        let op = self.builder.insert(op);
        self.builder.op_results(op)[0]
    }

    // ========================================================================
    // Statements
    // ========================================================================

    /// Lower `stmt` at the insertion point.
    pub fn emit(&mut self, stmt: Stmt) -> EdscResult<()> {
        match self.cx.stmt_kind(stmt)? {
            StmtKind::Eval(e) => {
                self.emit_value(e)?;
            }
            StmtKind::Store {
                value,
                buffer,
                indices,
            } => {
                let v = self.emit_expr(value)?;
                let (mem, _) = self.buffer_value(buffer)?;
                let indices = self.emit_exprs(&indices)?;
                self.builder.insert(memref::store(v, mem, &indices));
            }
            StmtKind::Block(block) => {
                self.emit_block(block)?;
            }
            StmtKind::Branch { dest, args } => {
                self.outside_loop_body()?;
                let args = self.emit_exprs(&args)?;
                let dest = self.block_target(dest)?;
                self.builder.insert(cf::br(dest, &args));
            }
            StmtKind::CondBranch {
                cond,
                true_dest,
                true_args,
                false_dest,
                false_args,
            } => {
                self.outside_loop_body()?;
                let c = self.emit_expr(cond)?;
                let true_args = self.emit_exprs(&true_args)?;
                let false_args = self.emit_exprs(&false_args)?;
                let t = self.block_target(true_dest)?;
                let f = self.block_target(false_dest)?;
                self.builder
                    .insert(cf::cond_br(c, t, &true_args, f, &false_args));
            }
            StmtKind::For {
                iv,
                lower,
                upper,
                step,
                body,
            } => self.emit_for(iv, lower, upper, step, &body)?,
            StmtKind::Return(values) => {
                let values = self.emit_exprs(&values)?;
                self.builder.insert(func::return_(&values));
            }
        }
        Ok(())
    }

    pub fn emit_stmts(&mut self, stmts: &[Stmt]) -> EdscResult<()> {
        stmts.iter().try_for_each(|&s| self.emit(s))
    }

    /// One `scf.for`. Max/min bounds fold their candidates first.
    fn emit_for(
        &mut self,
        iv: Expr,
        lower: Expr,
        upper: Expr,
        step: Expr,
        body: &[Stmt],
    ) -> EdscResult<()> {
        let ExprKind::Bindable { ty: iv_ty, .. } = self.cx.expr_kind(iv)? else {
            return Err(EdscError::NotBindable(self.cx.render_expr(iv)?));
        };
        let lb = self.emit_expr(lower)?;
        let ub = self.emit_expr(upper)?;
        let step = self.emit_expr(step)?;

        let parent = self.builder.insertion_block();
        let body_block = self.builder.create_block(&[iv_ty]);
        let region = self.builder.create_region(&[body_block]);
        self.builder.insert(scf::for_loop(lb, ub, step, region));
        self.enclosing.insert(body_block, parent);

        let iv_value = self.builder.block_args(body_block)[0];
        let shadowed = self.set_binding(iv, iv_value);
        self.builder.set_insertion_point(body_block);
        let result = self.emit_stmts(body);
        if result.is_ok() {
            self.builder.set_insertion_point(body_block);
            self.builder.insert(scf::yield_());
        }
        self.builder.set_insertion_point(parent);
        match shadowed {
            Some(v) => {
                self.set_binding(iv, v);
            }
            None => {
                self.bindings.remove(&iv);
            }
        }
        result
    }

    // ========================================================================
    // Blocks
    // ========================================================================

    /// Create a new block for `block` in the current region, bind its
    /// arguments and emit its body. The insertion point is left at the end
    /// of the new block.
    pub fn emit_block(&mut self, block: Block) -> EdscResult<BlockRef> {
        self.outside_loop_body()?;
        if self.blocks.contains_key(&block) {
            return Err(EdscError::BlockAlreadyEmitted);
        }
        self.materialize(block)
    }

    /// Emit the statements of `block` into the current block.
    pub fn emit_block_body(&mut self, block: Block) -> EdscResult<()> {
        let node = self.cx.block_node(block)?;
        self.emit_stmts(&node.body)
    }

    /// The IR block for a branch target, emitting it on first use. The
    /// insertion point is restored afterwards.
    fn block_target(&mut self, block: Block) -> EdscResult<BlockRef> {
        if let Some(&b) = self.blocks.get(&block) {
            return Ok(b);
        }
        let saved = self.builder.insertion_block();
        let result = self.materialize(block);
        self.builder.set_insertion_point(saved);
        result
    }

    fn materialize(&mut self, block: Block) -> EdscResult<BlockRef> {
        let node = self.cx.block_node(block)?;
        let mut arg_types: SmallVec<[TypeRef; 4]> = SmallVec::new();
        for &arg in &node.args {
            match self.cx.expr_kind(arg)? {
                ExprKind::Bindable { ty, .. } => arg_types.push(ty),
                _ => return Err(EdscError::NotBindable(self.cx.render_expr(arg)?)),
            }
        }

        let b = self.builder.create_block(&arg_types);
        self.builder.append_block(b);
        self.blocks.insert(block, b);
        let values = self.builder.block_args(b).to_vec();
        for (&arg, value) in node.args.iter().zip(values) {
            self.set_binding(arg, value);
        }
        tracing::debug!(block = %b, stmts = node.body.len(), "emitting block");

        self.builder.set_insertion_point(b);
        self.emit_stmts(&node.body)?;
        Ok(b)
    }

    /// Blocks and branches need the insertion block to be a function-level
    /// block, not the single body block of a loop.
    fn outside_loop_body(&self) -> EdscResult<()> {
        if self.enclosing.contains_key(&self.builder.insertion_block()) {
            return Err(EdscError::BranchInLoopBody);
        }
        Ok(())
    }

    /// Verify the function emitted into.
    pub fn verify(&self) -> EdscResult<()> {
        self.builder.verify(self.function)?;
        Ok(())
    }
}

enum LoweredBinary {
    Cmp(arith::CmpPredicate),
    Arith(arith::BinaryOp),
}

fn lower_binary(op: BinaryOp) -> LoweredBinary {
    use LoweredBinary::{Arith, Cmp};
    match op {
        BinaryOp::Add => Arith(arith::BinaryOp::Add),
        BinaryOp::Sub => Arith(arith::BinaryOp::Sub),
        BinaryOp::Mul => Arith(arith::BinaryOp::Mul),
        BinaryOp::Div => Arith(arith::BinaryOp::Div),
        BinaryOp::Rem => Arith(arith::BinaryOp::Rem),
        BinaryOp::And => Arith(arith::BinaryOp::And),
        BinaryOp::Or => Arith(arith::BinaryOp::Or),
        BinaryOp::Lt => Cmp(arith::CmpPredicate::Lt),
        BinaryOp::Le => Cmp(arith::CmpPredicate::Le),
        BinaryOp::Gt => Cmp(arith::CmpPredicate::Gt),
        BinaryOp::Ge => Cmp(arith::CmpPredicate::Ge),
        BinaryOp::Eq => Cmp(arith::CmpPredicate::Eq),
        BinaryOp::Ne => Cmp(arith::CmpPredicate::Ne),
    }
}

impl<B: IrBuilder> TypeLookup for Emitter<'_, B> {
    fn builtin_type(&self, ty: TypeRef) -> Option<BuiltinType> {
        self.builder.builtin_type(ty)
    }
}
