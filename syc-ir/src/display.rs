//! Textual IR dump
//!
//! A human-readable, one-instruction-per-line rendering with explicit type
//! annotations, `%name` for virtual registers, `@name` for globals and
//! functions, and `label:` block labels. Used by `--print-ir` and by golden
//! comparisons in tests; not consumed by any later phase.

use crate::ir::{
    CastKind, Function, GlobalInit, Instruction, IrType, Module, Value, RUNTIME_FUNCTIONS,
};
use std::fmt;

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;
        writeln!(f, "source_filename = \"{}\"", self.name)?;
        writeln!(f)?;
        for (name, signature) in RUNTIME_FUNCTIONS {
            let (ret, params) = signature.split_once(' ').unwrap_or(("void", "()"));
            writeln!(f, "declare {} @{}{}", ret, name, params)?;
        }
        writeln!(f)?;
        for global in &self.globals {
            write!(f, "@{} = global {} ", global.name, global.ty)?;
            match &global.init {
                GlobalInit::Int(v) => writeln!(f, "{}", v)?,
                GlobalInit::Float(v) => writeln!(f, "{}", v)?,
                GlobalInit::ZeroArray => writeln!(f, "zeroinitializer")?,
                GlobalInit::IntArray(values) => {
                    let rendered: Vec<String> =
                        values.iter().map(|v| format!("i32 {}", v)).collect();
                    writeln!(f, "[{}]", rendered.join(", "))?
                }
                GlobalInit::FloatArray(values) => {
                    let rendered: Vec<String> =
                        values.iter().map(|v| format!("float {}", v)).collect();
                    writeln!(f, "[{}]", rendered.join(", "))?
                }
            }
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }
        for func in &self.functions {
            writeln!(f, "{}", func)?;
        }
        Ok(())
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "define {} @{}(", self.ret_type, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} {}", param.ty(), param)?;
        }
        writeln!(f, ") {{")?;
        for block in &self.blocks {
            writeln!(f, "{}:", block.label)?;
            for inst in &block.instructions {
                writeln!(f, "  {}", InstDisplay { func: self, inst })?;
            }
        }
        writeln!(f, "}}")
    }
}

struct InstDisplay<'a> {
    func: &'a Function,
    inst: &'a Instruction,
}

fn typed(value: &Value) -> String {
    format!("{} {}", value.ty(), value)
}

impl fmt::Display for InstDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = |id: &usize| self.func.blocks[*id].label.as_str();
        match self.inst {
            Instruction::Alloca { result } => {
                let pointee = result.ty().elem().cloned().unwrap_or(IrType::I32);
                write!(f, "{} = alloca {}", result, pointee)
            }
            Instruction::Load { result, ptr } => {
                write!(f, "{} = load {}, {}", result, result.ty(), typed(ptr))
            }
            Instruction::Store { value, ptr } => {
                write!(f, "store {}, {}", typed(value), typed(ptr))
            }
            Instruction::Binary {
                op,
                result,
                lhs,
                rhs,
            } => write!(f, "{} = {} {} {}, {}", result, op, lhs.ty(), lhs, rhs),
            Instruction::Icmp {
                pred,
                result,
                lhs,
                rhs,
            } => {
                if lhs.ty().is_float() || rhs.ty().is_float() {
                    write!(
                        f,
                        "{} = fcmp {} {} {}, {}",
                        result,
                        pred.float_text(),
                        lhs.ty(),
                        lhs,
                        rhs
                    )
                } else {
                    write!(
                        f,
                        "{} = icmp {} {} {}, {}",
                        result,
                        pred.int_text(),
                        lhs.ty(),
                        lhs,
                        rhs
                    )
                }
            }
            Instruction::Gep {
                result,
                base,
                indices,
            } => {
                write!(f, "{} = getelementptr {}", result, typed(base))?;
                for idx in indices {
                    write!(f, ", {}", typed(idx))?;
                }
                Ok(())
            }
            Instruction::Call {
                result,
                callee,
                ret,
                args,
            } => {
                if let Some(result) = result {
                    write!(f, "{} = ", result)?;
                }
                write!(f, "call {} @{}(", ret, callee)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", typed(arg))?;
                }
                write!(f, ")")
            }
            Instruction::Br { target } => write!(f, "br label %{}", label(target)),
            Instruction::CondBr {
                cond,
                if_true,
                if_false,
            } => write!(
                f,
                "br i1 {}, label %{}, label %{}",
                cond,
                label(if_true),
                label(if_false)
            ),
            Instruction::Phi { result, incomings } => {
                write!(f, "{} = phi {} ", result, result.ty())?;
                for (i, (block, value)) in incomings.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "[ {}, %{} ]", value, label(block))?;
                }
                Ok(())
            }
            Instruction::Zext { result, value } => {
                write!(f, "{} = zext {} to {}", result, typed(value), result.ty())
            }
            Instruction::Cast {
                kind,
                result,
                value,
            } => match kind {
                CastKind::IntToFloat => {
                    write!(f, "{} = sitofp {} to float", result, typed(value))
                }
                CastKind::FloatToInt => {
                    write!(f, "{} = fptosi {} to i32", result, typed(value))
                }
            },
            Instruction::Ret { value: Some(value) } => write!(f, "ret {}", typed(value)),
            Instruction::Ret { value: None } => write!(f, "ret void"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builder::IrBuilder;
    use crate::ir::{IrType, Predicate, Value};

    #[test]
    fn test_function_dump_shape() {
        let mut b = IrBuilder::new("t");
        let f = b.add_function("max0", &[IrType::I32], IrType::I32);
        let entry = b.append_block(f, "entry");
        let pos = b.append_block(f, "pos");
        let neg = b.append_block(f, "neg");
        let arg = b.module().functions[f].params[0].clone();
        b.position_at_end(f, entry);
        let cond = b.build_icmp(Predicate::Gt, arg.clone(), Value::ConstInt(0), "cmp");
        let cond_name = cond.to_string();
        b.build_cond_br(cond, pos, neg);
        b.position_at_end(f, pos);
        b.build_ret(Some(arg.clone()));
        b.position_at_end(f, neg);
        b.build_ret(Some(Value::ConstInt(0)));

        let text = b.module().functions[f].to_string();
        assert!(text.starts_with(&format!("define i32 @max0(i32 {}) {{", arg)));
        assert!(text.contains("entry:"));
        assert!(text.contains(&format!("icmp sgt i32 {}, 0", arg)));
        assert!(text.contains(&format!(
            "br i1 {}, label %pos, label %neg",
            cond_name
        )));
        assert!(text.contains(&format!("ret i32 {}", arg)));
    }

    #[test]
    fn test_module_dump_declares_runtime() {
        let b = IrBuilder::new("t");
        let text = b.finish().to_string();
        assert!(text.contains("declare i32 @getint()"));
        assert!(text.contains("declare void @_sysy_stoptime(i32)"));
    }
}
