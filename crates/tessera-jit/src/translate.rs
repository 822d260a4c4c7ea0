//! Function-level code generation.
//!
//! Translates the ops of one `func.func` body into Cranelift IR with a
//! `FunctionBuilder`. `scf.for` becomes a header/body/exit block triple;
//! memref accesses read the buffer descriptor (see [`crate::abi`]).

use std::collections::HashMap;

use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::types as cl_types;
use cranelift_codegen::ir::{self as cl_ir, InstBuilder, MemFlags};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::FunctionBuilder;
use tessera_ir::dialect::arith::{self, ArithOp, BinaryOp, CmpPredicate};
use tessera_ir::dialect::memref::{self, MemRefOp};
use tessera_ir::dialect::{cf, func, scf};
use tessera_ir::{
    Attribute, BlockRef, BuiltinType, FloatKind, FunctionHandle, IrContext, OpRef, Symbol,
    TypeRef, ValueRef, print_attribute, print_type,
};

use crate::abi;
use crate::errors::{CompilationError, CompilationResult};

/// Translate a builtin type to a Cranelift value type.
///
/// `i1` is carried in a byte; buffers and functions are pointers.
pub(crate) fn translate_type(
    ir: &IrContext,
    ty: TypeRef,
    pointer: cl_types::Type,
) -> CompilationResult<cl_types::Type> {
    match ir.types.builtin(ty) {
        Some(BuiltinType::Int { width: 1 | 8 }) => Ok(cl_types::I8),
        Some(BuiltinType::Int { width: 16 }) => Ok(cl_types::I16),
        Some(BuiltinType::Int { width: 32 }) => Ok(cl_types::I32),
        Some(BuiltinType::Int { width: 64 }) => Ok(cl_types::I64),
        Some(BuiltinType::Index) => Ok(cl_types::I64),
        Some(BuiltinType::Float(FloatKind::F32)) => Ok(cl_types::F32),
        Some(BuiltinType::Float(FloatKind::F64)) => Ok(cl_types::F64),
        Some(BuiltinType::MemRef { .. } | BuiltinType::Function { .. }) => Ok(pointer),
        _ => Err(CompilationError::unsupported_type(print_type(ir, ty))),
    }
}

/// Translate a function type to a Cranelift `Signature`.
pub(crate) fn translate_signature(
    ir: &IrContext,
    fn_ty: TypeRef,
    call_conv: CallConv,
    pointer: cl_types::Type,
) -> CompilationResult<cl_ir::Signature> {
    let Some(BuiltinType::Function { inputs, results }) = ir.types.builtin(fn_ty) else {
        return Err(CompilationError::codegen(format!(
            "{} is not a function type",
            print_type(ir, fn_ty)
        )));
    };
    let mut sig = cl_ir::Signature::new(call_conv);
    for &ty in &inputs {
        sig.params
            .push(cl_ir::AbiParam::new(translate_type(ir, ty, pointer)?));
    }
    for &ty in &results {
        sig.returns
            .push(cl_ir::AbiParam::new(translate_type(ir, ty, pointer)?));
    }
    Ok(sig)
}

/// Translates the ops of one function body to Cranelift IR.
pub(crate) struct FunctionTranslator<'a, 'ir> {
    ir: &'ir IrContext,
    builder: FunctionBuilder<'a>,
    pointer: cl_types::Type,
    call_conv: CallConv,
    /// IR values to Cranelift values.
    values: HashMap<ValueRef, cl_ir::Value>,
    /// IR blocks of the function body to Cranelift blocks.
    blocks: HashMap<BlockRef, cl_ir::Block>,
    /// Callees referenced by `func.constant`.
    func_refs: &'a HashMap<Symbol, cl_ir::FuncRef>,
}

impl<'a, 'ir> FunctionTranslator<'a, 'ir> {
    pub(crate) fn new(
        ir: &'ir IrContext,
        builder: FunctionBuilder<'a>,
        pointer: cl_types::Type,
        call_conv: CallConv,
        func_refs: &'a HashMap<Symbol, cl_ir::FuncRef>,
    ) -> Self {
        Self {
            ir,
            builder,
            pointer,
            call_conv,
            values: HashMap::new(),
            blocks: HashMap::new(),
            func_refs,
        }
    }

    /// Translate the whole body of `f` and finalize the function.
    pub(crate) fn translate_function(mut self, f: FunctionHandle) -> CompilationResult<()> {
        let ir = self.ir;
        let body = &ir.region(f.body(ir)).blocks;

        for (i, &block) in body.iter().enumerate() {
            let cl_block = self.builder.create_block();
            if i == 0 {
                self.builder.append_block_params_for_function_params(cl_block);
            } else {
                for &ty in &ir.block(block).arg_types {
                    let cl_ty = translate_type(ir, ty, self.pointer)?;
                    self.builder.append_block_param(cl_block, cl_ty);
                }
            }
            let params = self.builder.block_params(cl_block).to_vec();
            for (&arg, param) in ir.block_args(block).iter().zip(params) {
                self.values.insert(arg, param);
            }
            self.blocks.insert(block, cl_block);
        }

        for &block in body {
            let cl_block = self.lookup_block(block)?;
            self.builder.switch_to_block(cl_block);
            for &op in &ir.block(block).ops {
                self.translate_op(op)?;
            }
        }

        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn lookup(&self, v: ValueRef) -> CompilationResult<cl_ir::Value> {
        self.values
            .get(&v)
            .copied()
            .ok_or_else(|| CompilationError::codegen(format!("value {v} was never defined")))
    }

    fn lookup_all(&self, vs: &[ValueRef]) -> CompilationResult<Vec<cl_ir::Value>> {
        vs.iter().map(|&v| self.lookup(v)).collect()
    }

    fn lookup_block(&self, b: BlockRef) -> CompilationResult<cl_ir::Block> {
        self.blocks
            .get(&b)
            .copied()
            .ok_or_else(|| CompilationError::codegen(format!("branch to {b} outside the function body")))
    }

    fn block_args(&self, vs: &[ValueRef]) -> CompilationResult<Vec<cl_ir::BlockArg>> {
        vs.iter()
            .map(|&v| self.lookup(v).map(cl_ir::BlockArg::from))
            .collect()
    }

    fn result_type(&self, op: OpRef) -> CompilationResult<(TypeRef, cl_types::Type)> {
        let ty = self
            .ir
            .op_result_types(op)
            .first()
            .copied()
            .ok_or_else(|| CompilationError::codegen(format!("{} has no result", self.op_name(op))))?;
        Ok((ty, translate_type(self.ir, ty, self.pointer)?))
    }

    fn define(&mut self, op: OpRef, value: cl_ir::Value) {
        let result = self.ir.op_result(op, 0);
        self.values.insert(result, value);
    }

    fn op_name(&self, op: OpRef) -> String {
        let data = self.ir.op(op);
        format!("{}.{}", data.dialect, data.name)
    }

    /// Translate a single op at the current position.
    fn translate_op(&mut self, op: OpRef) -> CompilationResult<()> {
        let ir = self.ir;
        if let Some(arith_op) = arith::classify(ir, op) {
            return self.translate_arith(op, arith_op);
        }
        if let Some(memref_op) = memref::classify(ir, op) {
            return self.translate_memref(op, memref_op);
        }
        if scf::is_for(ir, op) {
            return self.translate_for(op);
        }
        if scf::is_yield(ir, op) {
            return Err(CompilationError::codegen("scf.yield outside of scf.for"));
        }

        // === Control Flow ===
        if cf::is_br(ir, op) {
            let dest = self.successor(op, 0)?;
            let args = self.block_args(ir.op_operands(op))?;
            self.builder.ins().jump(dest, &args);
            return Ok(());
        }
        if cf::is_cond_br(ir, op) {
            let (cond, on_true, on_false) = cf::cond_br_operands(ir, op)
                .ok_or_else(|| CompilationError::codegen("malformed cf.cond_br"))?;
            let cond = self.lookup(cond)?;
            let then_dest = self.successor(op, 0)?;
            let else_dest = self.successor(op, 1)?;
            let then_args = self.block_args(on_true)?;
            let else_args = self.block_args(on_false)?;
            self.builder
                .ins()
                .brif(cond, then_dest, &then_args, else_dest, &else_args);
            return Ok(());
        }

        // === Functions ===
        if let Some(callee) = func::constant_callee(ir, op) {
            let func_ref = self
                .func_refs
                .get(&callee)
                .copied()
                .ok_or_else(|| CompilationError::function_not_found(callee))?;
            let addr = self.builder.ins().func_addr(self.pointer, func_ref);
            self.define(op, addr);
            return Ok(());
        }
        if func::is_call_indirect(ir, op) {
            let operands = ir.op_operands(op);
            let (&callee, args) = operands
                .split_first()
                .ok_or_else(|| CompilationError::codegen("func.call_indirect without callee"))?;
            let sig = translate_signature(ir, ir.value_ty(callee), self.call_conv, self.pointer)?;
            let sig_ref = self.builder.import_signature(sig);
            let callee = self.lookup(callee)?;
            let args = self.lookup_all(args)?;
            let inst = self.builder.ins().call_indirect(sig_ref, callee, &args);
            let results = self.builder.inst_results(inst).to_vec();
            for (&ir_result, value) in ir.op_results(op).iter().zip(results) {
                self.values.insert(ir_result, value);
            }
            return Ok(());
        }
        if func::is_return(ir, op) {
            let values = self.lookup_all(ir.op_operands(op))?;
            self.builder.ins().return_(&values);
            return Ok(());
        }

        Err(CompilationError::unsupported_operation(self.op_name(op)))
    }

    fn successor(&self, op: OpRef, index: usize) -> CompilationResult<cl_ir::Block> {
        let dest = self
            .ir
            .op(op)
            .successors
            .get(index)
            .copied()
            .ok_or_else(|| CompilationError::codegen(format!("{} is missing a successor", self.op_name(op))))?;
        self.lookup_block(dest)
    }

    // ========================================================================
    // arith
    // ========================================================================

    fn translate_arith(&mut self, op: OpRef, arith_op: ArithOp) -> CompilationResult<()> {
        let operands = self.lookup_all(self.ir.op_operands(op))?;
        let value = match arith_op {
            ArithOp::Const(attr) => {
                let (ty, cl_ty) = self.result_type(op)?;
                self.constant(&attr, ty, cl_ty)?
            }
            ArithOp::Binary(bin) => {
                let [lhs, rhs] = operands[..] else {
                    return Err(CompilationError::codegen("binary arith op needs two operands"));
                };
                self.binary(bin, lhs, rhs)?
            }
            ArithOp::Cmp(pred) => {
                let [lhs, rhs] = operands[..] else {
                    return Err(CompilationError::codegen("arith comparison needs two operands"));
                };
                self.compare(pred, lhs, rhs)
            }
            ArithOp::Neg => {
                let [operand] = operands[..] else {
                    return Err(CompilationError::codegen("arith.neg needs one operand"));
                };
                if self.is_float(operand) {
                    self.builder.ins().fneg(operand)
                } else {
                    self.builder.ins().ineg(operand)
                }
            }
            ArithOp::Select => {
                let [cond, on_true, on_false] = operands[..] else {
                    return Err(CompilationError::codegen("arith.select needs three operands"));
                };
                self.builder.ins().select(cond, on_true, on_false)
            }
        };
        self.define(op, value);
        Ok(())
    }

    fn is_float(&self, v: cl_ir::Value) -> bool {
        self.builder.func.dfg.value_type(v).is_float()
    }

    fn constant(
        &mut self,
        attr: &Attribute,
        ty: TypeRef,
        cl_ty: cl_types::Type,
    ) -> CompilationResult<cl_ir::Value> {
        let ir = self.ir;
        let invalid = || {
            CompilationError::codegen(format!(
                "constant {} does not fit {}",
                print_attribute(ir, attr),
                print_type(ir, ty)
            ))
        };
        if cl_ty == cl_types::F32 {
            let value = attr.as_f64().ok_or_else(invalid)?;
            return Ok(self.builder.ins().f32const(value as f32));
        }
        if cl_ty == cl_types::F64 {
            let value = attr.as_f64().ok_or_else(invalid)?;
            return Ok(self.builder.ins().f64const(value));
        }
        if !cl_ty.is_int() {
            return Err(invalid());
        }
        let value = attr.as_i64().ok_or_else(invalid)?;
        // iconst immediates of narrow types must be zero-extended
        let bits = cl_ty.bits();
        let value = if bits < 64 {
            value & ((1i64 << bits) - 1)
        } else {
            value
        };
        Ok(self.builder.ins().iconst(cl_ty, value))
    }

    fn binary(
        &mut self,
        op: BinaryOp,
        lhs: cl_ir::Value,
        rhs: cl_ir::Value,
    ) -> CompilationResult<cl_ir::Value> {
        if self.is_float(lhs) {
            let ins = self.builder.ins();
            return match op {
                BinaryOp::Add => Ok(ins.fadd(lhs, rhs)),
                BinaryOp::Sub => Ok(ins.fsub(lhs, rhs)),
                BinaryOp::Mul => Ok(ins.fmul(lhs, rhs)),
                BinaryOp::Div => Ok(ins.fdiv(lhs, rhs)),
                BinaryOp::Max => Ok(ins.fmax(lhs, rhs)),
                BinaryOp::Min => Ok(ins.fmin(lhs, rhs)),
                BinaryOp::Rem | BinaryOp::And | BinaryOp::Or => {
                    Err(CompilationError::unsupported_operation(format!(
                        "arith.{} on floats",
                        op.symbol()
                    )))
                }
            };
        }
        let ins = self.builder.ins();
        Ok(match op {
            BinaryOp::Add => ins.iadd(lhs, rhs),
            BinaryOp::Sub => ins.isub(lhs, rhs),
            BinaryOp::Mul => ins.imul(lhs, rhs),
            BinaryOp::Div => ins.sdiv(lhs, rhs),
            BinaryOp::Rem => ins.srem(lhs, rhs),
            BinaryOp::And => ins.band(lhs, rhs),
            BinaryOp::Or => ins.bor(lhs, rhs),
            BinaryOp::Max => ins.smax(lhs, rhs),
            BinaryOp::Min => ins.smin(lhs, rhs),
        })
    }

    fn compare(&mut self, pred: CmpPredicate, lhs: cl_ir::Value, rhs: cl_ir::Value) -> cl_ir::Value {
        if self.is_float(lhs) {
            let cc = match pred {
                CmpPredicate::Eq => FloatCC::Equal,
                CmpPredicate::Ne => FloatCC::NotEqual,
                CmpPredicate::Lt => FloatCC::LessThan,
                CmpPredicate::Le => FloatCC::LessThanOrEqual,
                CmpPredicate::Gt => FloatCC::GreaterThan,
                CmpPredicate::Ge => FloatCC::GreaterThanOrEqual,
            };
            return self.builder.ins().fcmp(cc, lhs, rhs);
        }
        let cc = match pred {
            CmpPredicate::Eq => IntCC::Equal,
            CmpPredicate::Ne => IntCC::NotEqual,
            CmpPredicate::Lt => IntCC::SignedLessThan,
            CmpPredicate::Le => IntCC::SignedLessThanOrEqual,
            CmpPredicate::Gt => IntCC::SignedGreaterThan,
            CmpPredicate::Ge => IntCC::SignedGreaterThanOrEqual,
        };
        self.builder.ins().icmp(cc, lhs, rhs)
    }

    // ========================================================================
    // memref
    // ========================================================================

    fn translate_memref(&mut self, op: OpRef, memref_op: MemRefOp) -> CompilationResult<()> {
        let ir = self.ir;
        let operands = ir.op_operands(op);
        match memref_op {
            MemRefOp::Load => {
                let (&mem, indices) = operands
                    .split_first()
                    .ok_or_else(|| CompilationError::codegen("memref.load without buffer"))?;
                let (_, elem_ty) = self.result_type(op)?;
                let addr = self.element_address(mem, indices, elem_ty)?;
                let value = self.builder.ins().load(elem_ty, MemFlags::trusted(), addr, 0);
                self.define(op, value);
            }
            MemRefOp::Store => {
                let [value, mem, indices @ ..] = operands else {
                    return Err(CompilationError::codegen("memref.store needs a value and a buffer"));
                };
                let value = self.lookup(*value)?;
                let elem_ty = self.builder.func.dfg.value_type(value);
                let addr = self.element_address(*mem, indices, elem_ty)?;
                self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
            }
            MemRefOp::Dim(dim) => {
                let mem = operands
                    .first()
                    .copied()
                    .ok_or_else(|| CompilationError::codegen("memref.dim without buffer"))?;
                let desc = self.lookup(mem)?;
                let offset = abi::size_offset(dim as usize);
                let size = self
                    .builder
                    .ins()
                    .load(cl_types::I64, MemFlags::trusted(), desc, offset);
                self.define(op, size);
            }
        }
        Ok(())
    }

    /// `data + sum(index[d] * stride[d]) * sizeof(elem)`
    fn element_address(
        &mut self,
        mem: ValueRef,
        indices: &[ValueRef],
        elem_ty: cl_types::Type,
    ) -> CompilationResult<cl_ir::Value> {
        let desc = self.lookup(mem)?;
        let rank = indices.len();
        let data = self
            .builder
            .ins()
            .load(self.pointer, MemFlags::trusted(), desc, abi::DATA_OFFSET);
        if rank == 0 {
            return Ok(data);
        }
        let mut offset = None;
        for (d, &index) in indices.iter().enumerate() {
            let index = self.lookup(index)?;
            let index = self.widen(index);
            let stride = self.builder.ins().load(
                cl_types::I64,
                MemFlags::trusted(),
                desc,
                abi::stride_offset(rank, d),
            );
            let term = self.builder.ins().imul(index, stride);
            offset = Some(match offset {
                Some(acc) => self.builder.ins().iadd(acc, term),
                None => term,
            });
        }
        let Some(offset) = offset else {
            return Ok(data);
        };
        let bytes = self
            .builder
            .ins()
            .imul_imm(offset, i64::from(elem_ty.bytes()));
        Ok(self.builder.ins().iadd(data, bytes))
    }

    /// Sign-extend an integer to 64 bits.
    fn widen(&mut self, v: cl_ir::Value) -> cl_ir::Value {
        if self.builder.func.dfg.value_type(v) == cl_types::I64 {
            v
        } else {
            self.builder.ins().sextend(cl_types::I64, v)
        }
    }

    // ========================================================================
    // scf
    // ========================================================================

    /// ```text
    ///   jump header(lb)
    /// header(iv):
    ///   brif iv < ub, body, exit
    /// body:
    ///   ...
    ///   jump header(iv + step)
    /// exit:
    /// ```
    fn translate_for(&mut self, op: OpRef) -> CompilationResult<()> {
        let ir = self.ir;
        let [lower, upper, step] = ir.op_operands(op) else {
            return Err(CompilationError::codegen("scf.for needs lower, upper and step"));
        };
        let body = scf::for_body(ir, op)
            .ok_or_else(|| CompilationError::codegen("scf.for without a body block"))?;
        let &iv_arg = ir
            .block_args(body)
            .first()
            .ok_or_else(|| CompilationError::codegen("scf.for body has no induction variable"))?;
        let lower = self.lookup(*lower)?;
        let upper = self.lookup(*upper)?;
        let step = self.lookup(*step)?;
        let iv_ty = self.builder.func.dfg.value_type(lower);

        let header = self.builder.create_block();
        let body_block = self.builder.create_block();
        let exit = self.builder.create_block();
        let iv = self.builder.append_block_param(header, iv_ty);

        self.builder.ins().jump(header, &[lower.into()]);

        self.builder.switch_to_block(header);
        let in_range = self.builder.ins().icmp(IntCC::SignedLessThan, iv, upper);
        self.builder.ins().brif(in_range, body_block, &[], exit, &[]);

        self.builder.switch_to_block(body_block);
        self.values.insert(iv_arg, iv);
        for &inner in &ir.block(body).ops {
            if scf::is_yield(ir, inner) {
                break;
            }
            self.translate_op(inner)?;
        }
        let next = self.builder.ins().iadd(iv, step);
        self.builder.ins().jump(header, &[next.into()]);

        self.builder.switch_to_block(exit);
        Ok(())
    }
}
