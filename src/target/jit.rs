use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::{error::Error, fmt::Display};

use log::{debug, trace};

use super::{
    BinOp, BlockId, CastKind, CmpOp, ConstValue, Instr, IrFunction, IrModule, IrType, TypeId,
    Value,
};

// Recursion ceiling for interpreted calls.
const MAX_CALL_DEPTH: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitError(pub String);

impl Display for JitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Error for JitError {}

/// A runtime value in the interpreting JIT.
#[derive(Debug, Clone)]
pub enum RtValue {
    Void,
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    Ptr(RtPtr),
    Null,
}

impl RtValue {
    pub fn as_int(&self) -> Result<i64, JitError> {
        match self {
            RtValue::Int(value) => Ok(*value),
            other => Err(JitError(format!("expected integer, got {other:?}"))),
        }
    }

    pub fn as_str(&self) -> Result<Rc<String>, JitError> {
        match self {
            RtValue::Str(value) => Ok(value.clone()),
            other => Err(JitError(format!("expected string, got {other:?}"))),
        }
    }

    fn truthy(&self) -> bool {
        match self {
            RtValue::Int(value) => *value != 0,
            RtValue::Float(value) => *value != 0.0,
            RtValue::Null | RtValue::Void => false,
            _ => true,
        }
    }
}

/// A pointer into interpreter memory: a shared handle on a slot.
#[derive(Debug, Clone)]
pub struct RtPtr(pub Rc<RefCell<RtSlot>>);

#[derive(Debug)]
pub enum RtSlot {
    Scalar(RtValue),
    Aggregate(Vec<RtPtr>),
}

/// A native function callable from generated code.
pub type Builtin = Rc<dyn Fn(&[RtValue]) -> Result<RtValue, JitError>>;

/// The in-memory execution engine over a finalized [IrModule].
///
/// Declarations resolve against the builtin registry, which is how the
/// runtime library and preprocess-time services are exposed to
/// generated code.
pub struct Jit {
    module: IrModule,
    builtins: RefCell<HashMap<String, Builtin>>,
    globals: RefCell<HashMap<String, RtPtr>>,
}

impl Jit {
    pub fn new(module: IrModule) -> Self {
        Self {
            module,
            builtins: RefCell::new(HashMap::new()),
            globals: RefCell::new(HashMap::new()),
        }
    }

    pub fn module(&self) -> &IrModule {
        &self.module
    }

    pub fn register_builtin(&self, name: &str, builtin: Builtin) {
        self.builtins.borrow_mut().insert(name.to_owned(), builtin);
    }

    /// Symbol lookup: whether `name` resolves to a callable.
    pub fn lookup(&self, name: &str) -> bool {
        self.module
            .function(name)
            .map(|func| !func.is_declaration)
            .unwrap_or(false)
            || self.builtins.borrow().contains_key(name)
    }

    /// Initialize globals and run the module's constructor list.
    pub fn run_ctors(&self) -> Result<(), JitError> {
        for global in &self.module.globals {
            let slot = self.slot_from_const(&global.init)?;
            self.globals
                .borrow_mut()
                .insert(global.name.clone(), RtPtr(Rc::new(RefCell::new(slot))));
        }
        for ctor in self.module.ctors.clone() {
            debug!("jit: running ctor `{ctor}`");
            self.call(&ctor, &[])?;
        }
        Ok(())
    }

    /// Run the module's destructor list, in reverse registration order.
    pub fn run_dtors(&self) -> Result<(), JitError> {
        for dtor in self.module.dtors.iter().rev() {
            debug!("jit: running dtor `{dtor}`");
            self.call(dtor, &[])?;
        }
        Ok(())
    }

    pub fn call(&self, name: &str, args: &[RtValue]) -> Result<RtValue, JitError> {
        self.call_depth(name, args, 0)
    }

    fn call_depth(&self, name: &str, args: &[RtValue], depth: usize) -> Result<RtValue, JitError> {
        if depth > MAX_CALL_DEPTH {
            return Err(JitError(format!("call depth exceeded in `{name}`")));
        }
        if let Some(func) = self.module.function(name) {
            if !func.is_declaration {
                return self.exec(func, args, depth);
            }
        }
        let builtin = self.builtins.borrow().get(name).cloned();
        match builtin {
            Some(builtin) => builtin(args),
            None => Err(JitError(format!("unresolved symbol `{name}`"))),
        }
    }

    fn exec(&self, func: &IrFunction, args: &[RtValue], depth: usize) -> Result<RtValue, JitError> {
        trace!("jit: executing `{}`", func.name);
        let mut regs: Vec<RtValue> = vec![RtValue::Void; func.reg_count.max(64) as usize];
        for (reg, value) in func.params.iter().zip(args.iter()) {
            set_reg(&mut regs, *reg, value.clone());
        }

        let mut block = BlockId(0);
        let mut prev_block: Option<BlockId> = None;
        'blocks: loop {
            let instrs = &func
                .blocks
                .get(block.0 as usize)
                .ok_or_else(|| JitError(format!("missing block in `{}`", func.name)))?
                .instrs;
            for instr in instrs {
                match instr {
                    Instr::Binary { op, ty, lhs, rhs, dest } => {
                        let lhs = self.eval(lhs, &regs)?;
                        let rhs = self.eval(rhs, &regs)?;
                        set_reg(&mut regs, *dest, self.binary(*op, *ty, lhs, rhs)?);
                    }
                    Instr::Cmp { op, lhs, rhs, dest, .. } => {
                        let lhs = self.eval(lhs, &regs)?;
                        let rhs = self.eval(rhs, &regs)?;
                        set_reg(&mut regs, *dest, compare(*op, lhs, rhs)?);
                    }
                    Instr::Alloca { ty, dest } => {
                        let slot = self.zero_slot(*ty);
                        set_reg(
                            &mut regs,
                            *dest,
                            RtValue::Ptr(RtPtr(Rc::new(RefCell::new(slot)))),
                        );
                    }
                    Instr::Load { addr, dest, .. } => {
                        let addr = self.eval(addr, &regs)?;
                        let value = load(&addr)?;
                        set_reg(&mut regs, *dest, value);
                    }
                    Instr::Store { addr, value, .. } => {
                        let addr = self.eval(addr, &regs)?;
                        let value = self.eval(value, &regs)?;
                        store(&addr, value)?;
                    }
                    Instr::FieldPtr { base, index, dest } => {
                        let base = self.eval(base, &regs)?;
                        set_reg(&mut regs, *dest, element_ptr(&base, *index as usize)?);
                    }
                    Instr::IndexPtr { base, index, dest } => {
                        let base = self.eval(base, &regs)?;
                        let index = self.eval(index, &regs)?.as_int()?;
                        set_reg(&mut regs, *dest, element_ptr(&base, index as usize)?);
                    }
                    Instr::Call { callee, args, dest } => {
                        let mut values = vec![];
                        for arg in args {
                            values.push(self.eval(arg, &regs)?);
                        }
                        let result = self.call_depth(callee, &values, depth + 1)?;
                        if let Some(dest) = dest {
                            set_reg(&mut regs, *dest, result);
                        }
                    }
                    Instr::Cast { kind, value, dest, .. } => {
                        let value = self.eval(value, &regs)?;
                        set_reg(&mut regs, *dest, cast(*kind, value)?);
                    }
                    Instr::Phi { incoming, dest, .. } => {
                        let Some(prev) = prev_block else {
                            return Err(JitError("phi in entry block".to_owned()));
                        };
                        let value = incoming
                            .iter()
                            .find(|(from, _)| *from == prev)
                            .map(|(_, value)| value)
                            .ok_or_else(|| JitError("phi misses predecessor".to_owned()))?;
                        let value = self.eval(value, &regs)?;
                        set_reg(&mut regs, *dest, value);
                    }
                    Instr::Br { target } => {
                        prev_block = Some(block);
                        block = *target;
                        continue 'blocks;
                    }
                    Instr::CondBr {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let cond = self.eval(cond, &regs)?;
                        prev_block = Some(block);
                        block = if cond.truthy() { *then_block } else { *else_block };
                        continue 'blocks;
                    }
                    Instr::Ret { value } => {
                        return match value {
                            Some(value) => self.eval(value, &regs),
                            None => Ok(RtValue::Void),
                        };
                    }
                    Instr::Unreachable => {
                        return Err(JitError(format!(
                            "reached unreachable code in `{}`",
                            func.name
                        )));
                    }
                }
            }
            return Err(JitError(format!(
                "block fell through without terminator in `{}`",
                func.name
            )));
        }
    }

    fn eval(&self, value: &Value, regs: &[RtValue]) -> Result<RtValue, JitError> {
        Ok(match value {
            Value::Reg(reg) => regs
                .get(*reg as usize)
                .cloned()
                .unwrap_or(RtValue::Void),
            Value::Const(constant) => self.const_value(constant)?,
        })
    }

    fn const_value(&self, constant: &ConstValue) -> Result<RtValue, JitError> {
        Ok(match constant {
            ConstValue::Int { value, .. } => RtValue::Int(*value),
            ConstValue::Float { value, .. } => RtValue::Float(*value),
            ConstValue::Str(value) => RtValue::Str(Rc::new(value.clone())),
            ConstValue::Null(_) => RtValue::Null,
            ConstValue::Zero(ty) => self.zero_value(*ty),
            ConstValue::Global(name) => {
                let existing = self.globals.borrow().get(name).cloned();
                match existing {
                    Some(ptr) => RtValue::Ptr(ptr),
                    None => {
                        // Globals referenced before ctors ran get their
                        // zero image on demand.
                        let ty = self
                            .module
                            .globals
                            .iter()
                            .find(|global| global.name == *name)
                            .map(|global| global.ty)
                            .ok_or_else(|| JitError(format!("unknown global `{name}`")))?;
                        let ptr = RtPtr(Rc::new(RefCell::new(self.zero_slot(ty))));
                        self.globals.borrow_mut().insert(name.clone(), ptr.clone());
                        RtValue::Ptr(ptr)
                    }
                }
            }
        })
    }

    fn zero_value(&self, ty: TypeId) -> RtValue {
        match self.module.ty(ty) {
            IrType::Void => RtValue::Void,
            IrType::Int { .. } => RtValue::Int(0),
            IrType::Float { .. } => RtValue::Float(0.0),
            _ => RtValue::Null,
        }
    }

    fn zero_slot(&self, ty: TypeId) -> RtSlot {
        match self.module.ty(ty) {
            IrType::Array { elem, len } => RtSlot::Aggregate(
                (0..*len)
                    .map(|_| RtPtr(Rc::new(RefCell::new(self.zero_slot(*elem)))))
                    .collect(),
            ),
            IrType::Struct { fields, .. } => RtSlot::Aggregate(
                fields
                    .clone()
                    .into_iter()
                    .map(|field| RtPtr(Rc::new(RefCell::new(self.zero_slot(field)))))
                    .collect(),
            ),
            _ => RtSlot::Scalar(self.zero_value(ty)),
        }
    }

    fn slot_from_const(&self, constant: &ConstValue) -> Result<RtSlot, JitError> {
        Ok(match constant {
            ConstValue::Zero(ty) => self.zero_slot(*ty),
            other => RtSlot::Scalar(self.const_value(other)?),
        })
    }

    fn binary(&self, op: BinOp, ty: TypeId, lhs: RtValue, rhs: RtValue) -> Result<RtValue, JitError> {
        match self.module.ty(ty) {
            IrType::Float { .. } => {
                let (lhs, rhs) = match (lhs, rhs) {
                    (RtValue::Float(a), RtValue::Float(b)) => (a, b),
                    (a, b) => {
                        return Err(JitError(format!("float op on {a:?} and {b:?}")));
                    }
                };
                Ok(RtValue::Float(match op {
                    BinOp::Add => lhs + rhs,
                    BinOp::Sub => lhs - rhs,
                    BinOp::Mul => lhs * rhs,
                    BinOp::Div => lhs / rhs,
                    BinOp::Rem => lhs % rhs,
                    BinOp::And | BinOp::Or => {
                        return Err(JitError("bitwise op on float".to_owned()));
                    }
                }))
            }
            _ => {
                let (lhs, rhs) = (lhs.as_int()?, rhs.as_int()?);
                Ok(RtValue::Int(match op {
                    BinOp::Add => lhs.wrapping_add(rhs),
                    BinOp::Sub => lhs.wrapping_sub(rhs),
                    BinOp::Mul => lhs.wrapping_mul(rhs),
                    BinOp::Div => {
                        if rhs == 0 {
                            return Err(JitError("division by zero".to_owned()));
                        }
                        lhs.wrapping_div(rhs)
                    }
                    BinOp::Rem => {
                        if rhs == 0 {
                            return Err(JitError("remainder by zero".to_owned()));
                        }
                        lhs.wrapping_rem(rhs)
                    }
                    BinOp::And => lhs & rhs,
                    BinOp::Or => lhs | rhs,
                }))
            }
        }
    }
}

fn set_reg(regs: &mut Vec<RtValue>, reg: u32, value: RtValue) {
    let index = reg as usize;
    if index >= regs.len() {
        regs.resize(index + 1, RtValue::Void);
    }
    regs[index] = value;
}

fn compare(op: CmpOp, lhs: RtValue, rhs: RtValue) -> Result<RtValue, JitError> {
    let ordering = match (&lhs, &rhs) {
        (RtValue::Int(a), RtValue::Int(b)) => a.partial_cmp(b),
        (RtValue::Float(a), RtValue::Float(b)) => a.partial_cmp(b),
        (RtValue::Str(a), RtValue::Str(b)) => a.partial_cmp(b),
        (RtValue::Null, RtValue::Null) => Some(std::cmp::Ordering::Equal),
        _ => None,
    };
    let Some(ordering) = ordering else {
        return Err(JitError(format!("cannot compare {lhs:?} and {rhs:?}")));
    };
    let result = match op {
        CmpOp::Eq => ordering.is_eq(),
        CmpOp::Ne => !ordering.is_eq(),
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
    };
    Ok(RtValue::Int(result as i64))
}

fn cast(kind: CastKind, value: RtValue) -> Result<RtValue, JitError> {
    Ok(match (kind, value) {
        (CastKind::IntToInt, value @ RtValue::Int(_)) => value,
        (CastKind::IntToFloat, RtValue::Int(value)) => RtValue::Float(value as f64),
        (CastKind::FloatToInt, RtValue::Float(value)) => RtValue::Int(value as i64),
        (CastKind::FloatToFloat, value @ RtValue::Float(_)) => value,
        (CastKind::PtrToPtr, value) => value,
        (kind, value) => {
            return Err(JitError(format!("invalid cast {kind:?} of {value:?}")));
        }
    })
}

fn load(addr: &RtValue) -> Result<RtValue, JitError> {
    let RtValue::Ptr(ptr) = addr else {
        return Err(JitError(format!("load from non-pointer {addr:?}")));
    };
    let slot = ptr.0.borrow();
    Ok(match &*slot {
        RtSlot::Scalar(value) => value.clone(),
        // Loading an aggregate yields its address; members are reached
        // through element pointers.
        RtSlot::Aggregate(_) => RtValue::Ptr(ptr.clone()),
    })
}

fn store(addr: &RtValue, value: RtValue) -> Result<(), JitError> {
    let RtValue::Ptr(ptr) = addr else {
        return Err(JitError(format!("store to non-pointer {addr:?}")));
    };
    let mut slot = ptr.0.borrow_mut();
    match (&mut *slot, value) {
        (RtSlot::Aggregate(fields), RtValue::Ptr(source)) => {
            let source = source.0.borrow();
            let RtSlot::Aggregate(source_fields) = &*source else {
                return Err(JitError("aggregate store from scalar".to_owned()));
            };
            if fields.len() != source_fields.len() {
                return Err(JitError("aggregate store size mismatch".to_owned()));
            }
            for (dest, src) in fields.iter().zip(source_fields.iter()) {
                copy_slot(dest, src)?;
            }
        }
        (slot, value) => *slot = RtSlot::Scalar(value),
    }
    Ok(())
}

fn copy_slot(dest: &RtPtr, src: &RtPtr) -> Result<(), JitError> {
    let value = load(&RtValue::Ptr(src.clone()))?;
    match value {
        RtValue::Ptr(inner) if Rc::ptr_eq(&inner.0, &src.0) => {
            // Nested aggregate: copy recursively.
            let src_fields = match &*src.0.borrow() {
                RtSlot::Aggregate(fields) => fields.clone(),
                RtSlot::Scalar(_) => unreachable!(),
            };
            let dest_fields = match &*dest.0.borrow() {
                RtSlot::Aggregate(fields) => fields.clone(),
                RtSlot::Scalar(_) => {
                    return Err(JitError("aggregate copy into scalar".to_owned()));
                }
            };
            for (dest, src) in dest_fields.iter().zip(src_fields.iter()) {
                copy_slot(dest, src)?;
            }
            Ok(())
        }
        value => store(&RtValue::Ptr(dest.clone()), value),
    }
}

fn element_ptr(base: &RtValue, index: usize) -> Result<RtValue, JitError> {
    let RtValue::Ptr(ptr) = base else {
        return Err(JitError(format!("element pointer into {base:?}")));
    };
    let slot = ptr.0.borrow();
    let RtSlot::Aggregate(fields) = &*slot else {
        return Err(JitError("element pointer into scalar".to_owned()));
    };
    fields
        .get(index)
        .cloned()
        .map(RtValue::Ptr)
        .ok_or_else(|| JitError(format!("element index {index} out of bounds")))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use crate::target::{
        BinOp, CmpOp, ConstValue, IrBackend, TargetGenerator, Value,
    };

    use super::{Jit, RtValue};

    /// fn add(a, b) { return a + b; }
    fn build_add() -> IrBackend {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[int, int], int, false);
        let func = backend.create_function("add", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let a = backend.param_value(func, 0);
        let b = backend.param_value(func, 1);
        let sum = backend.emit_binary(BinOp::Add, int, a, b);
        backend.emit_ret(Some(sum));
        backend.finish_function_body(func).unwrap();
        backend
    }

    #[test]
    fn test_call_interpreted_function() {
        let mut backend = build_add();
        backend.finalize_module().unwrap();
        let jit = Jit::new(backend.take_module());

        let result = jit
            .call("add", &[RtValue::Int(40), RtValue::Int(2)])
            .unwrap();
        assert!(matches!(result, RtValue::Int(42)));
    }

    #[test]
    fn test_cond_br_and_cmp() {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[int], int, false);
        let func = backend.create_function("sign", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let param = backend.param_value(func, 0);
        let zero = backend.const_int(int, 0);
        let negative = backend.prepare_block(func, "neg");
        let positive = backend.prepare_block(func, "pos");
        let cond = backend.emit_cmp(CmpOp::Lt, int, param, zero);
        backend.emit_cond_br(cond, negative, positive);
        backend.set_insertion_block(negative);
        let minus = backend.const_int(int, -1);
        backend.emit_ret(Some(minus));
        backend.set_insertion_block(positive);
        let plus = backend.const_int(int, 1);
        backend.emit_ret(Some(plus));
        backend.finish_function_body(func).unwrap();
        backend.finalize_module().unwrap();

        let jit = Jit::new(backend.take_module());
        assert!(matches!(
            jit.call("sign", &[RtValue::Int(-5)]).unwrap(),
            RtValue::Int(-1)
        ));
        assert!(matches!(
            jit.call("sign", &[RtValue::Int(5)]).unwrap(),
            RtValue::Int(1)
        ));
    }

    #[test]
    fn test_builtin_dispatch() {
        let mut backend = IrBackend::new("test");
        let void = backend.make_void_type();
        let int = backend.make_int_type(64, true);
        let print_ty = backend.make_function_type(&[int], void, false);
        backend.declare_function("record", print_ty).unwrap();
        let main_ty = backend.make_function_type(&[], void, false);
        let func = backend.create_function("main", main_ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let value = backend.const_int(int, 7);
        backend.emit_call("record", void, &[value]);
        backend.emit_ret(None);
        backend.finish_function_body(func).unwrap();
        backend.finalize_module().unwrap();

        let jit = Jit::new(backend.take_module());
        let seen = Rc::new(RefCell::new(vec![]));
        let sink = seen.clone();
        jit.register_builtin(
            "record",
            Rc::new(move |args| {
                sink.borrow_mut().push(args[0].as_int()?);
                Ok(RtValue::Void)
            }),
        );

        jit.call("main", &[]).unwrap();
        assert_eq!(*seen.borrow(), vec![7]);
    }

    #[test]
    fn test_alloca_load_store() {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[], int, false);
        let func = backend.create_function("slot", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let addr = backend.emit_alloca(int);
        let value = backend.const_int(int, 9);
        backend.emit_store(int, addr.clone(), value);
        let loaded = backend.emit_load(int, addr);
        backend.emit_ret(Some(loaded));
        backend.finish_function_body(func).unwrap();
        backend.finalize_module().unwrap();

        let jit = Jit::new(backend.take_module());
        assert!(matches!(jit.call("slot", &[]).unwrap(), RtValue::Int(9)));
    }

    #[test]
    fn test_division_by_zero_traps() {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let ty = backend.make_function_type(&[int], int, false);
        let func = backend.create_function("invert", ty).unwrap();
        backend.prepare_function_body(func).unwrap();
        let one = backend.const_int(int, 1);
        let param = backend.param_value(func, 0);
        let div = backend.emit_binary(BinOp::Div, int, one, param);
        backend.emit_ret(Some(div));
        backend.finish_function_body(func).unwrap();
        backend.finalize_module().unwrap();

        let jit = Jit::new(backend.take_module());
        assert!(jit.call("invert", &[RtValue::Int(0)]).is_err());
    }

    #[test]
    fn test_globals_and_ctors() {
        let mut backend = IrBackend::new("test");
        let int = backend.make_int_type(64, true);
        let void = backend.make_void_type();
        backend
            .declare_global("counter", int, ConstValue::Zero(int))
            .unwrap();

        let ctor_ty = backend.make_function_type(&[], void, false);
        let ctor = backend.create_function("init_counter", ctor_ty).unwrap();
        backend.prepare_function_body(ctor).unwrap();
        let addr = Value::Const(ConstValue::Global("counter".to_owned()));
        let value = backend.const_int(int, 11);
        backend.emit_store(int, addr, value);
        backend.emit_ret(None);
        backend.finish_function_body(ctor).unwrap();
        backend.register_ctor("init_counter");

        let getter_ty = backend.make_function_type(&[], int, false);
        let getter = backend.create_function("get_counter", getter_ty).unwrap();
        backend.prepare_function_body(getter).unwrap();
        let addr = Value::Const(ConstValue::Global("counter".to_owned()));
        let loaded = backend.emit_load(int, addr);
        backend.emit_ret(Some(loaded));
        backend.finish_function_body(getter).unwrap();
        backend.finalize_module().unwrap();

        let jit = Jit::new(backend.take_module());
        jit.run_ctors().unwrap();
        assert!(matches!(
            jit.call("get_counter", &[]).unwrap(),
            RtValue::Int(11)
        ));
    }
}
