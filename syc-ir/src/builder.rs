//! Cursor-based IR builder
//!
//! The front end drives construction through this API: it creates functions
//! and blocks, positions the cursor at the end of a block, and calls the
//! `build_*` operation for each instruction. The builder owns the module
//! under construction and the name counters, so no state leaks between
//! compilations.
//!
//! Two kinds of work happen eagerly at construction time:
//! - arithmetic on two compile-time constants folds to a constant instead of
//!   emitting an instruction (division or remainder by a constant zero is
//!   left as an ordinary instruction; runtime behavior is target-defined);
//! - mixed int/float operands get an implicit `sitofp` on the int side, and
//!   a `store` of an int value through a `float*` converts the value.

use crate::ir::{
    BasicBlock, BinaryOp, BlockId, CastKind, Function, GlobalInit, GlobalVar, Instruction, IrType,
    Module, Predicate, Value,
};

/// Function index inside the module under construction.
pub type FuncId = usize;

pub struct IrBuilder {
    module: Module,
    cursor: Option<(FuncId, BlockId)>,
}

impl IrBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module: Module::new(module_name),
            cursor: None,
        }
    }

    /// Consume the builder, yielding the finished module
    pub fn finish(self) -> Module {
        self.module
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    // ---- module-level construction ----

    pub fn add_function(&mut self, name: &str, param_types: &[IrType], ret: IrType) -> FuncId {
        let mut func = Function::new(name, ret);
        for ty in param_types {
            let param = self.module.names.fresh("arg", ty.clone());
            func.params.push(param);
        }
        self.module.functions.push(func);
        self.module.functions.len() - 1
    }

    pub fn append_block(&mut self, func: FuncId, label: &str) -> BlockId {
        self.module.functions[func].add_block(BasicBlock::new(label))
    }

    pub fn add_global(&mut self, name: &str, ty: IrType) -> Value {
        self.module.globals.push(GlobalVar {
            name: name.to_string(),
            ty: ty.clone(),
            init: match ty.array_base() {
                IrType::Float if !ty.is_array() => GlobalInit::Float(0.0),
                _ if !ty.is_array() => GlobalInit::Int(0),
                _ => GlobalInit::ZeroArray,
            },
        });
        Value::Global {
            name: name.to_string(),
            ty: ty.ptr_to(),
        }
    }

    /// Set a scalar global's initializer
    pub fn set_initializer(&mut self, name: &str, value: &Value) {
        let init = match value {
            Value::ConstInt(v) => GlobalInit::Int(*v),
            Value::ConstFloat(v) => GlobalInit::Float(*v),
            _ => return,
        };
        if let Some(global) = self.module.globals.iter_mut().find(|g| g.name == name) {
            global.init = init;
        }
    }

    /// Set a global array's initializer from the row-major flattened word
    /// list, outermost dimension first. An all-zero list becomes a
    /// zero-initialized array.
    pub fn set_array_initializer(&mut self, name: &str, values: &[Value]) {
        let all_zero = values.iter().all(|v| match v {
            Value::ConstInt(v) => *v == 0,
            Value::ConstFloat(v) => *v == 0.0,
            _ => false,
        });
        let is_float = matches!(values.first(), Some(Value::ConstFloat(_)));
        let init = if all_zero {
            GlobalInit::ZeroArray
        } else if is_float {
            GlobalInit::FloatArray(
                values
                    .iter()
                    .map(|v| match v {
                        Value::ConstFloat(v) => *v,
                        Value::ConstInt(v) => *v as f32,
                        _ => 0.0,
                    })
                    .collect(),
            )
        } else {
            GlobalInit::IntArray(
                values
                    .iter()
                    .map(|v| match v {
                        Value::ConstInt(v) => *v,
                        _ => 0,
                    })
                    .collect(),
            )
        };
        if let Some(global) = self.module.globals.iter_mut().find(|g| g.name == name) {
            global.init = init;
        }
    }

    // ---- cursor ----

    /// Move the cursor to the end of `block`. Control-flow edges are derived
    /// from terminators as they are appended, not from cursor motion.
    pub fn position_at_end(&mut self, func: FuncId, block: BlockId) {
        self.cursor = Some((func, block));
    }

    fn cursor(&self) -> (FuncId, BlockId) {
        self.cursor.expect("builder is not positioned at a block")
    }

    fn push(&mut self, inst: Instruction) {
        let (func, block) = self.cursor();
        self.module.functions[func].blocks[block].instructions.push(inst);
    }

    fn add_edge(&mut self, to: BlockId) {
        let (func, from) = self.cursor();
        let func = &mut self.module.functions[func];
        if !func.blocks[from].succs.contains(&to) {
            func.blocks[from].succs.push(to);
        }
        if !func.blocks[to].preds.contains(&from) {
            func.blocks[to].preds.push(from);
        }
    }

    fn fresh(&mut self, prefix: &str, ty: IrType) -> Value {
        self.module.names.fresh(prefix, ty)
    }

    // ---- memory ----

    pub fn build_alloca(&mut self, ty: IrType, prefix: &str) -> Value {
        let result = self.fresh(prefix, ty.ptr_to());
        self.push(Instruction::Alloca {
            result: result.clone(),
        });
        result
    }

    pub fn build_load(&mut self, ptr: Value, prefix: &str) -> Value {
        let elem = ptr.ty().elem().cloned().unwrap_or(IrType::I32);
        let result = self.fresh(prefix, elem);
        self.push(Instruction::Load {
            result: result.clone(),
            ptr,
        });
        result
    }

    pub fn build_store(&mut self, mut value: Value, ptr: Value) {
        // int stored through float* converts the value, not the pointer
        let pointee = ptr.ty().elem().cloned().unwrap_or(IrType::I32);
        if value.ty() == IrType::I32 && pointee.is_float() {
            value = self.build_cast(CastKind::IntToFloat, value);
        }
        self.push(Instruction::Store { value, ptr });
    }

    pub fn build_gep(&mut self, base: Value, indices: Vec<Value>, prefix: &str) -> Value {
        let base_ty = match base.ty() {
            IrType::Ptr(inner) => *inner,
            IrType::Array { elem, len } => IrType::Array { elem, len },
            other => other,
        };
        let pointee = match &base_ty {
            IrType::Array { elem, .. } if indices.len() != 1 => (**elem).clone(),
            _ => base_ty,
        };
        let result = self.fresh(prefix, pointee.ptr_to());
        self.push(Instruction::Gep {
            result: result.clone(),
            base,
            indices,
        });
        result
    }

    // ---- arithmetic ----

    pub fn build_add(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        self.build_arith(BinaryOp::Add, BinaryOp::FAdd, lhs, rhs, prefix)
    }

    pub fn build_sub(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        self.build_arith(BinaryOp::Sub, BinaryOp::FSub, lhs, rhs, prefix)
    }

    pub fn build_mul(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        self.build_arith(BinaryOp::Mul, BinaryOp::FMul, lhs, rhs, prefix)
    }

    pub fn build_div(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        self.build_arith(BinaryOp::SDiv, BinaryOp::FDiv, lhs, rhs, prefix)
    }

    /// Signed remainder; defined for int operands only
    pub fn build_rem(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        if let (Value::ConstInt(a), Value::ConstInt(b)) = (&lhs, &rhs) {
            if *b != 0 {
                return Value::ConstInt(a.wrapping_rem(*b));
            }
        }
        let result = self.fresh(prefix, lhs.ty());
        self.push(Instruction::Binary {
            op: BinaryOp::SRem,
            result: result.clone(),
            lhs,
            rhs,
        });
        result
    }

    fn build_arith(
        &mut self,
        int_op: BinaryOp,
        float_op: BinaryOp,
        mut lhs: Value,
        mut rhs: Value,
        prefix: &str,
    ) -> Value {
        if let Some(folded) = fold_constants(int_op, float_op, &lhs, &rhs) {
            return folded;
        }
        if lhs.ty() == IrType::I32 && rhs.ty().is_float() {
            lhs = self.build_cast(CastKind::IntToFloat, lhs);
        } else if lhs.ty().is_float() && rhs.ty() == IrType::I32 {
            rhs = self.build_cast(CastKind::IntToFloat, rhs);
        }
        let op = if lhs.ty().is_float() { float_op } else { int_op };
        let result = self.fresh(prefix, lhs.ty());
        self.push(Instruction::Binary {
            op,
            result: result.clone(),
            lhs,
            rhs,
        });
        result
    }

    pub fn build_icmp(&mut self, pred: Predicate, mut lhs: Value, mut rhs: Value, prefix: &str) -> Value {
        if lhs.ty().is_int() && rhs.ty().is_float() {
            lhs = self.build_cast(CastKind::IntToFloat, lhs);
        } else if lhs.ty().is_float() && rhs.ty().is_int() {
            rhs = self.build_cast(CastKind::IntToFloat, rhs);
        }
        let result = self.fresh(prefix, IrType::I1);
        self.push(Instruction::Icmp {
            pred,
            result: result.clone(),
            lhs,
            rhs,
        });
        result
    }

    /// Boolean negation, lowered as `xor cond, true`
    pub fn build_xor(&mut self, lhs: Value, rhs: Value, prefix: &str) -> Value {
        if let Value::ConstInt(v) = lhs {
            return Value::ConstInt(v ^ 1);
        }
        let result = self.fresh(prefix, rhs.ty());
        self.push(Instruction::Binary {
            op: BinaryOp::Xor,
            result: result.clone(),
            lhs,
            rhs,
        });
        result
    }

    pub fn build_zext(&mut self, value: Value, ty: IrType, prefix: &str) -> Value {
        if value.ty() == ty {
            return value;
        }
        if let Value::ConstInt(v) = value {
            return Value::ConstInt(v);
        }
        let result = self.fresh(prefix, ty);
        self.push(Instruction::Zext {
            result: result.clone(),
            value,
        });
        result
    }

    /// Arithmetic negation, lowered as `0 - x`
    pub fn build_neg(&mut self, value: Value, prefix: &str) -> Value {
        match value {
            Value::ConstInt(v) => Value::ConstInt(v.wrapping_neg()),
            Value::ConstFloat(v) => Value::ConstFloat(-v),
            value if value.ty().is_float() => {
                self.build_sub(Value::ConstFloat(0.0), value, prefix)
            }
            value => self.build_sub(Value::ConstInt(0), value, prefix),
        }
    }

    pub fn build_cast(&mut self, kind: CastKind, value: Value) -> Value {
        let ty = match kind {
            CastKind::IntToFloat => IrType::Float,
            CastKind::FloatToInt => IrType::I32,
        };
        let result = self.fresh("cvt", ty);
        self.push(Instruction::Cast {
            kind,
            result: result.clone(),
            value,
        });
        result
    }

    // ---- calls and control flow ----

    pub fn build_call(&mut self, callee: &str, args: Vec<Value>, prefix: &str) -> Option<Value> {
        let ret = self
            .module
            .return_type_of(callee)
            .unwrap_or(IrType::Void);
        let result = if ret == IrType::Void {
            None
        } else {
            Some(self.fresh(&format!("{}_call", prefix), ret.clone()))
        };
        self.push(Instruction::Call {
            result: result.clone(),
            callee: callee.to_string(),
            ret,
            args,
        });
        result
    }

    /// Instrumentation call: `starttime()` / `stoptime()` in the source is
    /// rewritten at the call site to the runtime entry point with the source
    /// line number as its argument.
    pub fn build_timing_call(&mut self, callee: &str, line: i32) {
        let runtime = match callee {
            "starttime" => "_sysy_starttime",
            "stoptime" => "_sysy_stoptime",
            other => other,
        };
        self.push(Instruction::Call {
            result: None,
            callee: runtime.to_string(),
            ret: IrType::Void,
            args: vec![Value::ConstInt(line)],
        });
    }

    pub fn build_br(&mut self, target: BlockId) {
        self.push(Instruction::Br { target });
        self.add_edge(target);
    }

    pub fn build_cond_br(&mut self, cond: Value, if_true: BlockId, if_false: BlockId) {
        self.push(Instruction::CondBr {
            cond,
            if_true,
            if_false,
        });
        self.add_edge(if_true);
        self.add_edge(if_false);
    }

    pub fn build_ret(&mut self, value: Option<Value>) {
        self.push(Instruction::Ret { value });
        let (func, block) = self.cursor();
        let func = &mut self.module.functions[func];
        if !func.ret_blocks.contains(&block) {
            func.ret_blocks.push(block);
        }
    }
}

/// Fold `const op const` at construction time. Returns `None` when either
/// operand is not a constant, or for division/remainder by a constant zero,
/// which falls through to ordinary instruction emission.
fn fold_constants(int_op: BinaryOp, float_op: BinaryOp, lhs: &Value, rhs: &Value) -> Option<Value> {
    match (lhs, rhs) {
        (Value::ConstInt(a), Value::ConstInt(b)) => {
            let v = match int_op {
                BinaryOp::Add => a.wrapping_add(*b),
                BinaryOp::Sub => a.wrapping_sub(*b),
                BinaryOp::Mul => a.wrapping_mul(*b),
                BinaryOp::SDiv if *b != 0 => a.wrapping_div(*b),
                BinaryOp::SRem if *b != 0 => a.wrapping_rem(*b),
                _ => return None,
            };
            Some(Value::ConstInt(v))
        }
        (Value::ConstFloat(_) | Value::ConstInt(_), Value::ConstFloat(_) | Value::ConstInt(_)) => {
            let a = as_f32(lhs);
            let b = as_f32(rhs);
            let v = match float_op {
                BinaryOp::FAdd => a + b,
                BinaryOp::FSub => a - b,
                BinaryOp::FMul => a * b,
                BinaryOp::FDiv => a / b,
                _ => return None,
            };
            Some(Value::ConstFloat(v))
        }
        _ => None,
    }
}

fn as_f32(value: &Value) -> f32 {
    match value {
        Value::ConstInt(v) => *v as f32,
        Value::ConstFloat(v) => *v,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn one_block_builder() -> (IrBuilder, FuncId, BlockId) {
        let mut b = IrBuilder::new("test");
        let f = b.add_function("main", &[], IrType::I32);
        let entry = b.append_block(f, "entry");
        b.position_at_end(f, entry);
        (b, f, entry)
    }

    #[test]
    fn test_constant_folding_at_construction() {
        let (mut b, f, entry) = one_block_builder();
        let v = b.build_add(Value::ConstInt(2), Value::ConstInt(3), "t");
        assert_eq!(v, Value::ConstInt(5));
        let v = b.build_mul(Value::ConstFloat(2.0), Value::ConstInt(3), "t");
        assert_eq!(v, Value::ConstFloat(6.0));
        // nothing was emitted
        assert!(b.module().functions[f].blocks[entry].instructions.is_empty());
    }

    #[test]
    fn test_division_by_constant_zero_is_emitted() {
        let (mut b, f, entry) = one_block_builder();
        let v = b.build_div(Value::ConstInt(1), Value::ConstInt(0), "t");
        assert!(matches!(v, Value::Reg { .. }));
        assert_eq!(b.module().functions[f].blocks[entry].instructions.len(), 1);
    }

    #[test]
    fn test_mixed_operands_insert_sitofp() {
        let (mut b, f, entry) = one_block_builder();
        let x = b.build_alloca(IrType::I32, "x");
        let x = b.build_load(x, "x");
        let v = b.build_add(x, Value::ConstFloat(1.5), "t");
        assert_eq!(v.ty(), IrType::Float);
        let insts = &b.module().functions[f].blocks[entry].instructions;
        assert!(insts
            .iter()
            .any(|i| matches!(i, Instruction::Cast { kind: CastKind::IntToFloat, .. })));
        assert!(insts
            .iter()
            .any(|i| matches!(i, Instruction::Binary { op: BinaryOp::FAdd, .. })));
    }

    #[test]
    fn test_store_int_through_float_ptr_converts_value() {
        let (mut b, f, entry) = one_block_builder();
        let slot = b.build_alloca(IrType::Float, "x");
        b.build_store(Value::ConstInt(3), slot);
        let insts = &b.module().functions[f].blocks[entry].instructions;
        assert!(insts
            .iter()
            .any(|i| matches!(i, Instruction::Cast { kind: CastKind::IntToFloat, .. })));
        match insts.last().unwrap() {
            Instruction::Store { value, .. } => assert!(value.ty().is_float()),
            other => panic!("expected store, got {:?}", other),
        }
    }

    #[test]
    fn test_branches_record_cfg_edges() {
        let mut b = IrBuilder::new("test");
        let f = b.add_function("main", &[], IrType::Void);
        let entry = b.append_block(f, "entry");
        let exit = b.append_block(f, "exit");
        b.position_at_end(f, entry);
        b.build_br(exit);
        b.position_at_end(f, exit);
        b.build_ret(None);
        let func = &b.module().functions[f];
        assert_eq!(func.blocks[entry].succs, vec![exit]);
        assert_eq!(func.blocks[exit].preds, vec![entry]);
        assert_eq!(func.ret_blocks, vec![exit]);
    }

    #[test]
    fn test_timing_call_rewrite() {
        let (mut b, f, entry) = one_block_builder();
        b.build_timing_call("starttime", 42);
        match &b.module().functions[f].blocks[entry].instructions[0] {
            Instruction::Call { callee, args, .. } => {
                assert_eq!(callee, "_sysy_starttime");
                assert_eq!(args, &vec![Value::ConstInt(42)]);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_xor_and_zext_folding() {
        let (mut b, _, _) = one_block_builder();
        assert_eq!(
            b.build_xor(Value::ConstInt(1), Value::ConstInt(1), "t"),
            Value::ConstInt(0)
        );
        let v = Value::ConstInt(7);
        assert_eq!(b.build_zext(v.clone(), IrType::I32, "t"), v);
    }
}
