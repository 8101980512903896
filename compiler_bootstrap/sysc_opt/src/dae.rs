//! Dead-argument elimination (spec §4.7): a function parameter that is never read (its
//! `GetArg`'s alloca is only ever stored to, never loaded) is dropped from the signature and
//! every call site in the same module is rewritten to stop passing it.
//!
//! Scoped to whole-program rewriting within a single module: every `Call` naming a function
//! defined in this module is a rewrite site, so removing a parameter never strands a caller
//! that still passes it. Calls to functions outside the module (none exist yet, since this
//! backend only ever sees one translation unit) would block the rewrite; there simply aren't
//! any here.

use crate::pass::Pass;
use hashbrown::{HashMap, HashSet};
use sysc_ir::{Attr, MidModule, MidOp, OpId};

#[derive(Default)]
pub struct Dae {
    args_removed: i64,
}

impl Dae {
    pub fn new() -> Self {
        Self::default()
    }

    fn func_name(ir: &sysc_ir::Ir<MidOp>, func: OpId) -> String {
        ir.op(func).attrs.iter().find_map(|a| a.as_name()).unwrap_or_default().to_string()
    }

    /// A `GetArg`'s single alloca user is dead if nothing ever loads it back.
    fn arg_is_dead(ir: &sysc_ir::Ir<MidOp>, get_arg: OpId) -> bool {
        for &use_op in &ir.op(get_arg).uses {
            if ir.op(use_op).erased {
                continue;
            }
            if ir.op(use_op).kind != MidOp::Store {
                return false;
            }
            let alloca = ir.op(use_op).operands[1];
            for &alloca_use in &ir.op(alloca).uses {
                if !ir.op(alloca_use).erased && ir.op(alloca_use).kind == MidOp::Load {
                    return false;
                }
            }
        }
        true
    }
}

impl Pass for Dae {
    fn name(&self) -> &'static str {
        "dae"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("args_removed".into(), self.args_removed);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        let funcs = module.funcs();

        // index >= 1 arg functions are candidates; main is conventionally left alone since its
        // signature is fixed by the runtime entry point, not by any caller in this module.
        let mut dead_index: HashMap<String, HashSet<usize>> = HashMap::new();
        for &func in &funcs {
            let name = Self::func_name(&module.ir, func);
            if name == "main" {
                continue;
            }
            let region = module.ir.op(func).regions[0];
            let entry = module.ir.region(region).blocks[0];
            for op in module.ir.block_ops(entry) {
                if module.ir.op(op).erased || module.ir.op(op).kind != MidOp::GetArg {
                    continue;
                }
                let idx = module.ir.op(op).attrs.iter().find_map(|a| a.as_int()).unwrap_or(-1);
                if idx >= 0 && Self::arg_is_dead(&module.ir, op) {
                    dead_index.entry(name.clone()).or_default().insert(idx as usize);
                }
            }
        }
        if dead_index.is_empty() {
            return;
        }

        // Rewrite call sites first, while operand indices still match the old signature.
        for &func in &funcs {
            let region = module.ir.op(func).regions[0];
            for &b in &module.ir.region(region).blocks.clone() {
                for op in module.ir.block_ops(b) {
                    if module.ir.op(op).erased || module.ir.op(op).kind != MidOp::Call {
                        continue;
                    }
                    let callee = module.ir.op(op).attrs.iter().find_map(|a| a.as_name()).unwrap_or_default().to_string();
                    let Some(dead) = dead_index.get(&callee) else { continue };
                    let operands = module.ir.op(op).operands.clone();
                    let keep: Vec<OpId> = operands.iter().enumerate().filter(|(i, _)| !dead.contains(i)).map(|(_, &o)| o).collect();
                    let keep_len = keep.len();
                    module.ir.op_mut(op).operands = keep.into();
                    for a in module.ir.op_mut(op).attrs.iter_mut() {
                        if let Attr::ArgCount(n) = a {
                            *n = keep_len;
                        }
                    }
                }
            }
        }

        // Then strip the dead `GetArg`s (and their now-dead store+alloca chain) from each
        // callee and renumber the survivors' indices.
        for &func in &funcs {
            let name = Self::func_name(&module.ir, func);
            let Some(dead) = dead_index.get(&name) else { continue };
            let region = module.ir.op(func).regions[0];
            let entry = module.ir.region(region).blocks[0];
            let mut next_idx: i64 = 0;
            for op in module.ir.block_ops(entry) {
                if module.ir.op(op).erased || module.ir.op(op).kind != MidOp::GetArg {
                    continue;
                }
                let idx = module.ir.op(op).attrs.iter().find_map(|a| a.as_int()).unwrap_or(-1) as usize;
                if dead.contains(&idx) {
                    let uses = module.ir.op(op).uses.clone();
                    for use_op in uses {
                        if module.ir.op(use_op).kind == MidOp::Store {
                            let alloca = module.ir.op(use_op).operands[1];
                            module.ir.erase(use_op);
                            module.ir.erase(alloca);
                        }
                    }
                    module.ir.erase(op);
                    self.args_removed += 1;
                } else {
                    for a in module.ir.op_mut(op).attrs.iter_mut() {
                        if let Attr::Int(n) = a {
                            *n = next_idx;
                        }
                    }
                    next_idx += 1;
                }
            }
            let new_arity = next_idx;
            for a in module.ir.op_mut(func).attrs.iter_mut() {
                if let Attr::Size(n) = a {
                    *n = new_arity;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, Ty};

    #[test]
    fn an_unused_parameter_is_dropped_from_signature_and_call_sites() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);

        let callee_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("callee".into()), Attr::Size(2)], Ty::I32);
        let callee_region = ir.append_region_to(callee_op);
        let callee_entry = ir.append_block(callee_region);
        builder.set_to_block_start(&ir, callee_entry);
        let used_arg = builder.create(&mut ir, MidOp::GetArg, &[], vec![Attr::Int(0), Attr::Name("used".into())], Ty::I32);
        let used_alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![Attr::Name("used".into())], Ty::I64);
        builder.create(&mut ir, MidOp::Store, &[used_arg, used_alloca], vec![], Ty::Void);
        let dead_arg = builder.create(&mut ir, MidOp::GetArg, &[], vec![Attr::Int(1), Attr::Name("dead".into())], Ty::I32);
        let dead_alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![Attr::Name("dead".into())], Ty::I64);
        builder.create(&mut ir, MidOp::Store, &[dead_arg, dead_alloca], vec![], Ty::Void);
        let load = builder.create(&mut ir, MidOp::Load, &[used_alloca], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[load], vec![], Ty::Void);

        let main_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("main".into()), Attr::Size(0)], Ty::I32);
        let main_region = ir.append_region_to(main_op);
        let main_entry = ir.append_block(main_region);
        builder.set_to_block_start(&ir, main_entry);
        let a = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let b = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(2)], Ty::I32);
        let call = builder.create(&mut ir, MidOp::Call, &[a, b], vec![Attr::Name("callee".into()), Attr::ArgCount(2)], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[call], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Dae::new().run(&mut module);

        assert!(module.ir.op(dead_arg).erased);
        assert_eq!(module.ir.op(call).operands.len(), 1, "call site should drop the dead argument");
    }
}
