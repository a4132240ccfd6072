//! The target-generator contract and the in-memory back end. The code
//! generator speaks only the [TargetGenerator] trait; the concrete back
//! end here builds the crate's own IR, executes it with an interpreting
//! JIT (which also powers preprocess-time evaluation), and serializes
//! finalized modules for offline builds.
mod backend;
mod emitter;
mod ir;
mod jit;

pub use self::backend::*;
pub use self::emitter::*;
pub use self::ir::*;
pub use self::jit::*;

use std::{error::Error, fmt::Display};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetError(pub String);

impl Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for TargetError {}

/// The abstract emitter the code generator drives.
///
/// Grouped by concern: type construction, module and functions, basic
/// blocks, instructions, constants, and linkage. Layout decisions
/// belong to the implementation.
pub trait TargetGenerator {
    // type construction
    fn make_void_type(&mut self) -> TypeId;
    fn make_int_type(&mut self, bits: u8, signed: bool) -> TypeId;
    fn make_float_type(&mut self, bits: u8) -> TypeId;
    fn make_pointer(&mut self, pointee: TypeId) -> TypeId;
    fn make_array(&mut self, elem: TypeId, len: u64) -> TypeId;
    fn make_struct(&mut self, name: &str, fields: &[TypeId]) -> TypeId;
    fn make_function_type(&mut self, params: &[TypeId], ret: TypeId, variadic: bool) -> TypeId;
    fn type_of(&self, id: TypeId) -> IrType;

    // module & function
    fn create_function(&mut self, name: &str, ty: TypeId) -> Result<FuncId, TargetError>;
    fn declare_function(&mut self, name: &str, ty: TypeId) -> Result<FuncId, TargetError>;
    fn prepare_function_body(&mut self, func: FuncId) -> Result<(), TargetError>;
    fn finish_function_body(&mut self, func: FuncId) -> Result<(), TargetError>;
    fn declare_global(&mut self, name: &str, ty: TypeId, init: ConstValue)
        -> Result<(), TargetError>;
    fn param_value(&self, func: FuncId, index: usize) -> Value;

    // basic blocks
    fn prepare_block(&mut self, func: FuncId, label: &str) -> BlockId;
    fn set_insertion_block(&mut self, block: BlockId);
    fn finish_block(&mut self, block: BlockId);
    fn current_block(&self) -> BlockId;

    // instructions
    fn emit_binary(&mut self, op: BinOp, ty: TypeId, lhs: Value, rhs: Value) -> Value;
    fn emit_cmp(&mut self, op: CmpOp, ty: TypeId, lhs: Value, rhs: Value) -> Value;
    fn emit_alloca(&mut self, ty: TypeId) -> Value;
    fn emit_load(&mut self, ty: TypeId, addr: Value) -> Value;
    fn emit_store(&mut self, ty: TypeId, addr: Value, value: Value);
    fn emit_field_ptr(&mut self, base: Value, index: u32) -> Value;
    fn emit_index_ptr(&mut self, base: Value, index: Value) -> Value;
    fn emit_call(&mut self, callee: &str, ret: TypeId, args: &[Value]) -> Option<Value>;
    fn emit_cast(&mut self, kind: CastKind, to: TypeId, value: Value) -> Value;
    fn emit_phi(&mut self, ty: TypeId, incoming: Vec<(BlockId, Value)>) -> Value;
    fn emit_br(&mut self, target: BlockId);
    fn emit_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId);
    fn emit_ret(&mut self, value: Option<Value>);
    fn emit_unreachable(&mut self);

    // constants
    fn const_int(&mut self, ty: TypeId, value: i64) -> Value;
    fn const_float(&mut self, ty: TypeId, value: f64) -> Value;
    fn const_string(&mut self, value: &str) -> Value;
    fn const_zero(&mut self, ty: TypeId) -> Value;
    fn const_null(&mut self, ty: TypeId) -> Value;

    // global constructor/destructor orchestration
    fn register_ctor(&mut self, func_name: &str);
    fn register_dtor(&mut self, func_name: &str);

    // linkage
    fn finalize_module(&mut self) -> Result<(), TargetError>;
    fn emit_module_file(&self, path: &std::path::Path) -> Result<(), TargetError>;
}
