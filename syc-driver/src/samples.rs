//! Built-in sample programs
//!
//! Stand-ins for the external front end: small SysY programs hand-built
//! through the Builder API, covering the paths the back end cares about
//! (local arrays, tail recursion, mixed int/float arithmetic, globals).

use syc_ir::{IrBuilder, IrType, Module, Predicate, Value};

pub const NAMES: [&str; 3] = ["arrays", "tailsum", "mixed"];

pub fn build(name: &str) -> Option<Module> {
    match name {
        "arrays" => Some(arrays()),
        "tailsum" => Some(tailsum()),
        "mixed" => Some(mixed()),
        _ => None,
    }
}

/// int main() { int a[3]; a[0] = 1; a[1] = 2; a[2] = a[0] + a[1]; return a[2]; }
fn arrays() -> Module {
    let mut b = IrBuilder::new("arrays");
    let main = b.add_function("main", &[], IrType::I32);
    let entry = b.append_block(main, "entry");
    b.position_at_end(main, entry);

    let a = b.build_alloca(IrType::array_of(IrType::I32, 3), "a");
    let p0 = b.build_gep(a.clone(), vec![Value::ConstInt(0), Value::ConstInt(0)], "p");
    b.build_store(Value::ConstInt(1), p0.clone());
    let p1 = b.build_gep(a.clone(), vec![Value::ConstInt(0), Value::ConstInt(1)], "p");
    b.build_store(Value::ConstInt(2), p1.clone());
    let v0 = b.build_load(p0, "v");
    let v1 = b.build_load(p1, "v");
    let sum = b.build_add(v0, v1, "sum");
    let p2 = b.build_gep(a, vec![Value::ConstInt(0), Value::ConstInt(2)], "p");
    b.build_store(sum, p2.clone());
    let ret = b.build_load(p2, "ret");
    b.build_ret(Some(ret));
    b.finish()
}

/// int f(int n, int acc) { if (n == 0) return acc; return f(n - 1, acc + n); }
/// int main() { putint(f(100000, 0)); return 0; }
fn tailsum() -> Module {
    let mut b = IrBuilder::new("tailsum");

    let f = b.add_function("f", &[IrType::I32, IrType::I32], IrType::I32);
    let entry = b.append_block(f, "entry");
    let base = b.append_block(f, "base");
    let rec = b.append_block(f, "rec");
    let n = b.module().functions[f].params[0].clone();
    let acc = b.module().functions[f].params[1].clone();

    b.position_at_end(f, entry);
    let n_slot = b.build_alloca(IrType::I32, "n_addr");
    let acc_slot = b.build_alloca(IrType::I32, "acc_addr");
    b.build_store(n, n_slot.clone());
    b.build_store(acc, acc_slot.clone());
    let n_val = b.build_load(n_slot.clone(), "n");
    let is_zero = b.build_icmp(Predicate::Eq, n_val, Value::ConstInt(0), "cmp");
    b.build_cond_br(is_zero, base, rec);

    b.position_at_end(f, base);
    let acc_val = b.build_load(acc_slot.clone(), "acc");
    b.build_ret(Some(acc_val));

    b.position_at_end(f, rec);
    let n_val = b.build_load(n_slot, "n");
    let acc_val = b.build_load(acc_slot, "acc");
    let next_n = b.build_sub(n_val.clone(), Value::ConstInt(1), "dec");
    let next_acc = b.build_add(acc_val, n_val, "inc");
    let result = b.build_call("f", vec![next_n, next_acc], "r").unwrap();
    b.build_ret(Some(result));

    let main = b.add_function("main", &[], IrType::I32);
    let entry = b.append_block(main, "entry");
    b.position_at_end(main, entry);
    let total = b
        .build_call("f", vec![Value::ConstInt(100000), Value::ConstInt(0)], "t")
        .unwrap();
    b.build_call("putint", vec![total], "v");
    b.build_ret(Some(Value::ConstInt(0)));

    b.finish()
}

/// float g(int x) { return x + 1.5; }
/// int main() { putfloat(g(2)); return scale; }   // scale is a global
fn mixed() -> Module {
    let mut b = IrBuilder::new("mixed");
    let scale = b.add_global("scale", IrType::I32);
    b.set_initializer("scale", &Value::ConstInt(0));

    let g = b.add_function("g", &[IrType::I32], IrType::Float);
    let entry = b.append_block(g, "entry");
    let x = b.module().functions[g].params[0].clone();
    b.position_at_end(g, entry);
    let sum = b.build_add(x, Value::ConstFloat(1.5), "sum");
    b.build_ret(Some(sum));

    let main = b.add_function("main", &[], IrType::I32);
    let entry = b.append_block(main, "entry");
    b.position_at_end(main, entry);
    let value = b.build_call("g", vec![Value::ConstInt(2)], "g").unwrap();
    b.build_call("putfloat", vec![value], "v");
    let out = b.build_load(scale, "out");
    b.build_ret(Some(out));
    b.finish()
}
