//! Compiling hand-built IR and calling the result.

use std::io::Write as _;

use tessera_ir::dialect::{arith, cf, func, memref, scf};
use tessera_ir::{
    Attribute, BlockRef, DYNAMIC, FloatKind, FunctionHandle, IrContext, ModuleOp, OpBuilder,
    OperationDataBuilder, TypeRef, ValueRef,
};
use tessera_jit::{
    CompilationErrorKind, Engine, MemRefDescriptor, OptLevel, SymbolMap, emit_object,
};

fn setup() -> (IrContext, ModuleOp) {
    let mut ir = IrContext::new();
    let module = ModuleOp::create(&mut ir);
    (ir, module)
}

fn define(
    ir: &mut IrContext,
    module: ModuleOp,
    name: &str,
    ins: &[TypeRef],
    outs: &[TypeRef],
) -> (BlockRef, Vec<ValueRef>) {
    let f = FunctionHandle::make(ir, module, name, ins, outs).unwrap();
    let entry = f.entry_block(ir).unwrap();
    (entry, f.arguments(ir).to_vec())
}

fn value(b: &mut OpBuilder<'_>, op: OperationDataBuilder) -> ValueRef {
    let op = b.insert(op);
    b.ctx().op_result(op, 0)
}

fn compile(ir: &IrContext, module: ModuleOp) -> Engine {
    Engine::new(ir, module, OptLevel::Speed, &SymbolMap::new()).unwrap()
}

#[test]
fn literal_return() {
    let (mut ir, module) = setup();
    let i32_ty = ir.types.int(32);
    let (entry, _) = define(&mut ir, module, "answer", &[], &[i32_ty]);
    let mut b = OpBuilder::at_end(&mut ir, entry);
    let c = value(&mut b, arith::constant(i32_ty, Attribute::from(42i64)));
    b.insert(func::return_(&[c]));

    let engine = compile(&ir, module);
    let addr = engine.function_address("answer").unwrap();
    assert!(!addr.is_null());
    let answer: extern "C" fn() -> i32 = unsafe { std::mem::transmute(addr) };
    assert_eq!(answer(), 42);
}

#[test]
fn narrow_integers_wrap() {
    let (mut ir, module) = setup();
    let i8_ty = ir.types.int(8);
    let (entry, args) = define(&mut ir, module, "sub3", &[i8_ty], &[i8_ty]);
    let mut b = OpBuilder::at_end(&mut ir, entry);
    let c = value(&mut b, arith::constant(i8_ty, Attribute::from(-3i64)));
    let sum = value(&mut b, arith::binary(arith::BinaryOp::Add, args[0], c, i8_ty));
    b.insert(func::return_(&[sum]));

    let engine = compile(&ir, module);
    let sub3: extern "C" fn(i8) -> i8 =
        unsafe { std::mem::transmute(engine.function_address("sub3").unwrap()) };
    assert_eq!(sub3(10), 7);
    assert_eq!(sub3(-127), 126);
}

#[test]
fn float_arithmetic() {
    let (mut ir, module) = setup();
    let f64_ty = ir.types.float(FloatKind::F64);
    let (entry, args) = define(&mut ir, module, "f", &[f64_ty, f64_ty], &[f64_ty]);
    let mut b = OpBuilder::at_end(&mut ir, entry);
    let product = value(&mut b, arith::binary(arith::BinaryOp::Mul, args[0], args[1], f64_ty));
    let half = value(&mut b, arith::constant(f64_ty, Attribute::float(0.5)));
    let scaled = value(&mut b, arith::binary(arith::BinaryOp::Mul, product, half, f64_ty));
    let result = value(&mut b, arith::binary(arith::BinaryOp::Max, scaled, args[0], f64_ty));
    b.insert(func::return_(&[result]));

    let engine = compile(&ir, module);
    let f: extern "C" fn(f64, f64) -> f64 =
        unsafe { std::mem::transmute(engine.function_address("f").unwrap()) };
    assert_eq!(f(2.0, 6.0), 6.0);
    assert_eq!(f(4.0, 1.0), 4.0);
}

#[test]
fn branches_pass_block_arguments() {
    let (mut ir, module) = setup();
    let i32_ty = ir.types.int(32);
    let i1 = ir.types.bool();
    let f = FunctionHandle::make(&mut ir, module, "max", &[i32_ty, i32_ty], &[i32_ty]).unwrap();
    let entry = f.entry_block(&ir).unwrap();
    let args = f.arguments(&ir).to_vec();

    let mut b = OpBuilder::at_end(&mut ir, entry);
    let exit = b.create_block(&[i32_ty]);
    b.append_block(exit);
    let greater = value(&mut b, arith::cmp(arith::CmpPredicate::Gt, args[0], args[1], i1));
    b.insert(cf::cond_br(greater, exit, &[args[0]], exit, &[args[1]]));
    b.set_insertion_point(exit);
    let result = b.ctx().block_arg(exit, 0);
    b.insert(func::return_(&[result]));

    let engine = compile(&ir, module);
    let max: extern "C" fn(i32, i32) -> i32 =
        unsafe { std::mem::transmute(engine.function_address("max").unwrap()) };
    assert_eq!(max(3, 9), 9);
    assert_eq!(max(-1, -8), -1);
}

#[test]
fn loop_over_dynamic_buffer() {
    let (mut ir, module) = setup();
    let f64_ty = ir.types.float(FloatKind::F64);
    let index = ir.types.index();
    let buf_ty = ir.types.memref(f64_ty, &[DYNAMIC]);
    let (entry, args) = define(&mut ir, module, "double", &[buf_ty], &[]);
    let buf = args[0];

    let mut b = OpBuilder::at_end(&mut ir, entry);
    let zero = value(&mut b, arith::constant(index, Attribute::from(0i64)));
    let one = value(&mut b, arith::constant(index, Attribute::from(1i64)));
    let two = value(&mut b, arith::constant(f64_ty, Attribute::float(2.0)));
    let n = value(&mut b, memref::dim(buf, 0, index));
    let body = b.create_block(&[index]);
    let region = b.create_region(&[body]);
    b.insert(scf::for_loop(zero, n, one, region));

    b.set_insertion_point(body);
    let i = b.ctx().block_arg(body, 0);
    let x = value(&mut b, memref::load(buf, &[i], f64_ty));
    let y = value(&mut b, arith::binary(arith::BinaryOp::Mul, x, two, f64_ty));
    b.insert(memref::store(y, buf, &[i]));
    b.insert(scf::yield_());
    b.set_insertion_point(entry);
    b.insert(func::return_(&[]));

    let engine = compile(&ir, module);
    let double: extern "C" fn(*mut MemRefDescriptor<'_, f64, 1>) =
        unsafe { std::mem::transmute(engine.function_address("double").unwrap()) };

    let mut data = vec![1.0, 2.5, -4.0, 0.0, 8.0];
    let len = data.len() as i64;
    let mut desc = MemRefDescriptor::row_major(&mut data, [len]).unwrap();
    double(desc.as_arg());
    assert_eq!(data, [2.0, 5.0, -8.0, 0.0, 16.0]);
}

extern "C" fn triple(x: i64) -> i64 {
    x * 3
}

fn calls_external(ir: &mut IrContext, module: ModuleOp) {
    let i64_ty = ir.types.int(64);
    let callee_ty = ir.types.function(&[i64_ty], &[i64_ty]);
    FunctionHandle::declare(ir, module, "triple", &[i64_ty], &[i64_ty]).unwrap();
    let (entry, args) = define(ir, module, "f", &[i64_ty], &[i64_ty]);

    let mut b = OpBuilder::at_end(ir, entry);
    let callee = value(&mut b, func::constant("triple".into(), callee_ty));
    let tripled = value(&mut b, func::call_indirect(callee, &[args[0]], &[i64_ty]));
    let one = value(&mut b, arith::constant(i64_ty, Attribute::from(1i64)));
    let result = value(&mut b, arith::binary(arith::BinaryOp::Add, tripled, one, i64_ty));
    b.insert(func::return_(&[result]));
}

#[test]
fn registered_symbols_are_callable() {
    let (mut ir, module) = setup();
    calls_external(&mut ir, module);

    let mut symbols = SymbolMap::new();
    symbols.insert("triple".to_owned(), triple as *const () as usize);
    let engine = Engine::new(&ir, module, OptLevel::None, &symbols).unwrap();
    assert_eq!(engine.function_names(), ["f"]);
    let f: extern "C" fn(i64) -> i64 =
        unsafe { std::mem::transmute(engine.function_address("f").unwrap()) };
    assert_eq!(f(5), 16);
}

#[test]
fn unregistered_externals_are_rejected() {
    let (mut ir, module) = setup();
    calls_external(&mut ir, module);

    let err = Engine::new(&ir, module, OptLevel::Speed, &SymbolMap::new()).unwrap_err();
    assert!(
        matches!(err.kind(), CompilationErrorKind::UnresolvedSymbol(name) if name == "triple"),
        "{err}"
    );
}

#[test]
fn unverified_modules_do_not_compile() {
    let (mut ir, module) = setup();
    define(&mut ir, module, "empty", &[], &[]);

    let err = Engine::new(&ir, module, OptLevel::Speed, &SymbolMap::new()).unwrap_err();
    assert!(matches!(err.kind(), CompilationErrorKind::Verify(_)), "{err}");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn unsupported_types_are_typed_errors() {
    let (mut ir, module) = setup();
    let f16_ty = ir.types.float(FloatKind::F16);
    let (entry, _) = define(&mut ir, module, "half", &[f16_ty], &[]);
    OpBuilder::at_end(&mut ir, entry).insert(func::return_(&[]));

    let err = Engine::new(&ir, module, OptLevel::Speed, &SymbolMap::new()).unwrap_err();
    assert!(matches!(err.kind(), CompilationErrorKind::UnsupportedType(_)), "{err}");
}

#[test]
fn unknown_function_address() {
    let (mut ir, module) = setup();
    let (entry, _) = define(&mut ir, module, "noop", &[], &[]);
    OpBuilder::at_end(&mut ir, entry).insert(func::return_(&[]));

    let engine = compile(&ir, module);
    assert!(engine.function_address("noop").is_ok());
    let err = engine.function_address("missing").unwrap_err();
    assert!(matches!(err.kind(), CompilationErrorKind::FunctionNotFound(_)), "{err}");
}

#[test]
fn object_emission() {
    let (mut ir, module) = setup();
    calls_external(&mut ir, module);

    let bytes = emit_object(&ir, module, None, OptLevel::Speed).unwrap();
    assert!(!bytes.is_empty());

    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&bytes).unwrap();
    assert_eq!(file.as_file().metadata().unwrap().len(), bytes.len() as u64);
}
