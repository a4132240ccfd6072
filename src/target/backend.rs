use std::collections::HashMap;

use log::{debug, trace};

use super::{
    BinOp, BlockId, CastKind, CmpOp, ConstValue, FuncId, Instr, IrBlock, IrFunction, IrGlobal,
    IrModule, IrType, TargetError, TargetGenerator, TypeId, Value,
};

/// The in-memory back end: builds an [IrModule] the JIT executes and
/// the emitter serializes. Types are interned structurally so repeated
/// construction of the same shape yields the same [TypeId].
pub struct IrBackend {
    module: IrModule,
    type_index: HashMap<String, TypeId>,
    current_func: Option<FuncId>,
    insertion: Option<BlockId>,
    finalized: bool,
}

impl IrBackend {
    pub fn new(name: &str) -> Self {
        Self {
            module: IrModule {
                name: name.to_owned(),
                ..Default::default()
            },
            type_index: HashMap::new(),
            current_func: None,
            insertion: None,
            finalized: false,
        }
    }

    /// Hand the finished module over (after `finalize_module`).
    pub fn take_module(self) -> IrModule {
        self.module
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    fn intern(&mut self, key: String, ty: IrType) -> TypeId {
        if let Some(id) = self.type_index.get(&key) {
            return *id;
        }
        let id = TypeId(self.module.types.len() as u32);
        self.module.types.push(ty);
        self.type_index.insert(key, id);
        id
    }

    fn func_mut(&mut self) -> &mut IrFunction {
        let id = self.current_func.expect("no function in progress");
        &mut self.module.functions[id.0 as usize]
    }

    fn new_reg(&mut self) -> u32 {
        let func = self.func_mut();
        func.reg_count += 1;
        func.reg_count - 1
    }

    fn push(&mut self, instr: Instr) {
        let block = self.insertion.expect("no insertion block set");
        let func = self.func_mut();
        let block = &mut func.blocks[block.0 as usize];
        // Nothing may follow a terminator; the generator skips
        // unreachable statements, this is the backstop.
        if block.instrs.last().map(Instr::is_terminator).unwrap_or(false) {
            trace!("backend: dropping instruction after terminator");
            return;
        }
        block.instrs.push(instr);
    }
}

impl TargetGenerator for IrBackend {
    fn make_void_type(&mut self) -> TypeId {
        self.intern("void".to_owned(), IrType::Void)
    }

    fn make_int_type(&mut self, bits: u8, signed: bool) -> TypeId {
        self.intern(
            format!("i{bits}{}", if signed { "s" } else { "u" }),
            IrType::Int { bits, signed },
        )
    }

    fn make_float_type(&mut self, bits: u8) -> TypeId {
        self.intern(format!("f{bits}"), IrType::Float { bits })
    }

    fn make_pointer(&mut self, pointee: TypeId) -> TypeId {
        self.intern(format!("p{}", pointee.0), IrType::Pointer { pointee })
    }

    fn make_array(&mut self, elem: TypeId, len: u64) -> TypeId {
        self.intern(format!("a{}x{len}", elem.0), IrType::Array { elem, len })
    }

    fn make_struct(&mut self, name: &str, fields: &[TypeId]) -> TypeId {
        debug!("backend: struct `{name}` with {} field(s)", fields.len());
        self.intern(
            format!("s:{name}"),
            IrType::Struct {
                name: name.to_owned(),
                fields: fields.to_vec(),
            },
        )
    }

    fn make_function_type(&mut self, params: &[TypeId], ret: TypeId, variadic: bool) -> TypeId {
        let key = format!(
            "fn({}){}->{}",
            params
                .iter()
                .map(|p| p.0.to_string())
                .collect::<Vec<_>>()
                .join(","),
            if variadic { "..." } else { "" },
            ret.0
        );
        self.intern(
            key,
            IrType::Function {
                params: params.to_vec(),
                ret,
                variadic,
            },
        )
    }

    fn type_of(&self, id: TypeId) -> IrType {
        self.module.types[id.0 as usize].clone()
    }

    fn create_function(&mut self, name: &str, ty: TypeId) -> Result<FuncId, TargetError> {
        if self.module.function(name).is_some() {
            return Err(TargetError(format!("function `{name}` already exists")));
        }
        let param_count = match self.module.ty(ty) {
            IrType::Function { params, .. } => params.len(),
            _ => return Err(TargetError(format!("`{name}` needs a function type"))),
        };
        let id = FuncId(self.module.functions.len() as u32);
        self.module.functions.push(IrFunction {
            name: name.to_owned(),
            ty,
            params: (0..param_count as u32).collect(),
            blocks: vec![],
            reg_count: param_count as u32,
            is_declaration: false,
        });
        debug!("backend: function `{name}`");
        Ok(id)
    }

    fn declare_function(&mut self, name: &str, ty: TypeId) -> Result<FuncId, TargetError> {
        if let Some(index) = self
            .module
            .functions
            .iter()
            .position(|func| func.name == name)
        {
            return Ok(FuncId(index as u32));
        }
        let id = self.create_function(name, ty)?;
        self.module.functions[id.0 as usize].is_declaration = true;
        Ok(id)
    }

    fn prepare_function_body(&mut self, func: FuncId) -> Result<(), TargetError> {
        let function = &mut self.module.functions[func.0 as usize];
        if !function.blocks.is_empty() {
            return Err(TargetError(format!(
                "function `{}` already has a body",
                function.name
            )));
        }
        function.is_declaration = false;
        self.current_func = Some(func);
        let entry = self.prepare_block(func, "entry");
        self.set_insertion_block(entry);
        Ok(())
    }

    fn finish_function_body(&mut self, func: FuncId) -> Result<(), TargetError> {
        let function = &self.module.functions[func.0 as usize];
        let IrType::Function { ret, .. } = self.module.ty(function.ty) else {
            return Err(TargetError("corrupt function type".to_owned()));
        };
        let needs_ret = function
            .blocks
            .iter()
            .any(|block| !block.instrs.last().map(Instr::is_terminator).unwrap_or(false));
        if needs_ret {
            // Implicit return for fall-through blocks of void
            // functions.
            let value = match self.module.ty(*ret) {
                IrType::Void => None,
                _ => Some(Value::Const(ConstValue::Zero(*ret))),
            };
            for block in &mut self.module.functions[func.0 as usize].blocks {
                if !block.instrs.last().map(Instr::is_terminator).unwrap_or(false) {
                    block.instrs.push(Instr::Ret {
                        value: value.clone(),
                    });
                }
            }
        }
        self.current_func = None;
        self.insertion = None;
        Ok(())
    }

    fn declare_global(
        &mut self,
        name: &str,
        ty: TypeId,
        init: ConstValue,
    ) -> Result<(), TargetError> {
        if self.module.globals.iter().any(|global| global.name == name) {
            return Err(TargetError(format!("global `{name}` already exists")));
        }
        self.module.globals.push(IrGlobal {
            name: name.to_owned(),
            ty,
            init,
        });
        Ok(())
    }

    fn param_value(&self, func: FuncId, index: usize) -> Value {
        Value::Reg(self.module.functions[func.0 as usize].params[index])
    }

    fn prepare_block(&mut self, func: FuncId, label: &str) -> BlockId {
        let function = &mut self.module.functions[func.0 as usize];
        function.blocks.push(IrBlock {
            label: format!("{label}{}", function.blocks.len()),
            instrs: vec![],
        });
        BlockId((function.blocks.len() - 1) as u32)
    }

    fn set_insertion_block(&mut self, block: BlockId) {
        self.insertion = Some(block);
    }

    fn finish_block(&mut self, _block: BlockId) {
        // Blocks need no explicit sealing in this back end.
    }

    fn current_block(&self) -> BlockId {
        self.insertion.expect("no insertion block set")
    }

    fn emit_binary(&mut self, op: BinOp, ty: TypeId, lhs: Value, rhs: Value) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Binary { op, ty, lhs, rhs, dest });
        Value::Reg(dest)
    }

    fn emit_cmp(&mut self, op: CmpOp, ty: TypeId, lhs: Value, rhs: Value) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Cmp { op, ty, lhs, rhs, dest });
        Value::Reg(dest)
    }

    fn emit_alloca(&mut self, ty: TypeId) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Alloca { ty, dest });
        Value::Reg(dest)
    }

    fn emit_load(&mut self, ty: TypeId, addr: Value) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Load { ty, addr, dest });
        Value::Reg(dest)
    }

    fn emit_store(&mut self, ty: TypeId, addr: Value, value: Value) {
        self.push(Instr::Store { ty, addr, value });
    }

    fn emit_field_ptr(&mut self, base: Value, index: u32) -> Value {
        let dest = self.new_reg();
        self.push(Instr::FieldPtr { base, index, dest });
        Value::Reg(dest)
    }

    fn emit_index_ptr(&mut self, base: Value, index: Value) -> Value {
        let dest = self.new_reg();
        self.push(Instr::IndexPtr { base, index, dest });
        Value::Reg(dest)
    }

    fn emit_call(&mut self, callee: &str, ret: TypeId, args: &[Value]) -> Option<Value> {
        let dest = match self.module.ty(ret) {
            IrType::Void => None,
            _ => Some(self.new_reg()),
        };
        self.push(Instr::Call {
            callee: callee.to_owned(),
            args: args.to_vec(),
            dest,
        });
        dest.map(Value::Reg)
    }

    fn emit_cast(&mut self, kind: CastKind, to: TypeId, value: Value) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Cast { kind, to, value, dest });
        Value::Reg(dest)
    }

    fn emit_phi(&mut self, ty: TypeId, incoming: Vec<(BlockId, Value)>) -> Value {
        let dest = self.new_reg();
        self.push(Instr::Phi { ty, incoming, dest });
        Value::Reg(dest)
    }

    fn emit_br(&mut self, target: BlockId) {
        self.push(Instr::Br { target });
    }

    fn emit_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.push(Instr::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    fn emit_ret(&mut self, value: Option<Value>) {
        self.push(Instr::Ret { value });
    }

    fn emit_unreachable(&mut self) {
        self.push(Instr::Unreachable);
    }

    fn const_int(&mut self, ty: TypeId, value: i64) -> Value {
        Value::Const(ConstValue::Int { value, ty })
    }

    fn const_float(&mut self, ty: TypeId, value: f64) -> Value {
        Value::Const(ConstValue::Float { value, ty })
    }

    fn const_string(&mut self, value: &str) -> Value {
        Value::Const(ConstValue::Str(value.to_owned()))
    }

    fn const_zero(&mut self, ty: TypeId) -> Value {
        Value::Const(ConstValue::Zero(ty))
    }

    fn const_null(&mut self, ty: TypeId) -> Value {
        Value::Const(ConstValue::Null(ty))
    }

    fn register_ctor(&mut self, func_name: &str) {
        self.module.ctors.push(func_name.to_owned());
    }

    fn register_dtor(&mut self, func_name: &str) {
        self.module.dtors.push(func_name.to_owned());
    }

    fn finalize_module(&mut self) -> Result<(), TargetError> {
        if self.finalized {
            return Err(TargetError("module already finalized".to_owned()));
        }
        if self.current_func.is_some() {
            return Err(TargetError(
                "cannot finalize with a function body in progress".to_owned(),
            ));
        }
        self.finalized = true;
        debug!(
            "backend: finalized `{}` ({} functions, {} globals)",
            self.module.name,
            self.module.functions.len(),
            self.module.globals.len()
        );
        Ok(())
    }

    fn emit_module_file(&self, path: &std::path::Path) -> Result<(), TargetError> {
        super::write_module_file(&self.module, path)
    }
}

#[cfg(test)]
mod tests {
    use crate::target::{BinOp, ConstValue, IrType, TargetGenerator, Value};

    use super::IrBackend;

    #[test]
    fn test_types_are_interned() {
        let mut backend = IrBackend::new("test");
        let a = backend.make_int_type(32, true);
        let b = backend.make_int_type(32, true);
        let c = backend.make_int_type(32, false);
        assert_eq!(a, b);
        assert_ne!(a, c);

        let pa = backend.make_pointer(a);
        let pb = backend.make_pointer(b);
        assert_eq!(pa, pb);
    }

    #[test]
    fn test_struct_is_created_once() {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let s1 = backend.make_struct("Pair", &[int, int]);
        let s2 = backend.make_struct("Pair", &[int, int]);
        assert_eq!(s1, s2);
        let structs = backend
            .module()
            .types
            .iter()
            .filter(|ty| matches!(ty, IrType::Struct { .. }))
            .count();
        assert_eq!(structs, 1);
    }

    #[test]
    fn test_function_body_gets_implicit_return() {
        let mut backend = IrBackend::new("test");
        let void = backend.make_void_type();
        let ty = backend.make_function_type(&[], void, false);
        let func = backend.create_function("noop", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        backend.finish_function_body(func).unwrap();

        let function = backend.module().function("noop").unwrap();
        assert!(matches!(
            function.blocks[0].instrs.last(),
            Some(crate::target::Instr::Ret { value: None })
        ));
    }

    #[test]
    fn test_no_instructions_after_terminator() {
        let mut backend = IrBackend::new("test");
        let void = backend.make_void_type();
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[], void, false);
        let func = backend.create_function("f", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        backend.emit_ret(None);
        backend.emit_binary(
            BinOp::Add,
            int,
            Value::Const(ConstValue::Int { value: 1, ty: int }),
            Value::Const(ConstValue::Int { value: 2, ty: int }),
        );
        backend.finish_function_body(func).unwrap();

        let function = backend.module().function("f").unwrap();
        assert_eq!(function.blocks[0].instrs.len(), 1);
    }
}
