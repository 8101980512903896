//! Tail-call optimization (spec §4.7): a self-recursive call in tail position — `return
//! f(args...)` where `f` is the enclosing function — is rewritten into argument-slot stores
//! followed by a jump back to the entry block, turning recursion into iteration.
//!
//! Runs after `FlattenCFG`, so "tail position" is just "the call feeds a `Return` directly
//! with no other op in between". The rewritten block becomes a new predecessor of the entry
//! block; `update_preds`/`update_doms` downstream recomputes the loop this creates.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{Attr, BlockId, Builder, MidModule, MidOp, OpId, Ty};

#[derive(Default)]
pub struct Tco {
    converted: i64,
}

impl Tco {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps each parameter index to the alloca the prologue stores it into, by scanning the
    /// entry block for the `GetArg` → `Alloca` → `Store` triple `emit_fn` always produces.
    fn param_allocas(ir: &sysc_ir::Ir<MidOp>, entry: BlockId) -> HashMap<usize, OpId> {
        let mut map = HashMap::new();
        for op in ir.block_ops(entry) {
            if ir.op(op).kind != MidOp::GetArg {
                continue;
            }
            let idx = match ir.op(op).attrs.iter().find_map(|a| a.as_int()) {
                Some(i) if i >= 0 => i as usize,
                _ => continue,
            };
            for &use_op in &ir.op(op).uses {
                if ir.op(use_op).kind == MidOp::Store {
                    map.insert(idx, ir.op(use_op).operands[1]);
                }
            }
        }
        map
    }
}

impl Pass for Tco {
    fn name(&self) -> &'static str {
        "tco"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("converted".into(), self.converted);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let name = module.ir.op(func).attrs.iter().find_map(|a| a.as_name()).unwrap_or_default().to_string();
            let region = module.ir.op(func).regions[0];
            let entry = module.ir.region(region).blocks[0];
            let allocas = Self::param_allocas(&module.ir, entry);

            for &b in &module.ir.region(region).blocks.clone() {
                let Some(term) = module.ir.terminator(b) else { continue };
                if module.ir.op(term).kind != MidOp::Return {
                    continue;
                }
                let ret_operands = module.ir.op(term).operands.clone();
                let Some(&call) = ret_operands.first() else { continue };
                if ret_operands.len() != 1 || module.ir.op(call).kind != MidOp::Call {
                    continue;
                }
                let callee = module.ir.op(call).attrs.iter().find_map(|a| a.as_name()).unwrap_or_default().to_string();
                if callee != name {
                    continue;
                }
                // The call's only use must be this return: nothing else observes its result.
                if module.ir.op(call).uses.len() != 1 {
                    continue;
                }

                let args = module.ir.op(call).operands.clone();
                if args.len() != allocas.len() {
                    continue;
                }
                let mut builder = Builder::new();
                for (i, &arg) in args.iter().enumerate() {
                    let Some(&alloca) = allocas.get(&i) else { continue };
                    builder.set_before_op(&module.ir, term);
                    builder.create(&mut module.ir, MidOp::Store, &[arg, alloca], vec![], Ty::Void);
                }
                builder.set_before_op(&module.ir, term);
                builder.create(&mut module.ir, MidOp::Goto, &[], vec![Attr::Target(entry)], Ty::Void);
                module.ir.erase(call);
                module.ir.erase(term);
                self.converted += 1;
            }

            if self.converted > 0 {
                module.ir.update_preds(region);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Builder, Ir, Ty};

    #[test]
    fn a_self_recursive_tail_call_becomes_a_backedge_to_entry() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);

        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("f".into()), Attr::Size(1)], Ty::I32);
        let region = ir.append_region_to(func_op);
        let entry = ir.append_block(region);
        builder.set_to_block_start(&ir, entry);
        let arg = builder.create(&mut ir, MidOp::GetArg, &[], vec![Attr::Int(0), Attr::Name("n".into())], Ty::I32);
        let alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![Attr::Name("n".into())], Ty::I64);
        builder.create(&mut ir, MidOp::Store, &[arg, alloca], vec![], Ty::Void);
        let load = builder.create(&mut ir, MidOp::Load, &[alloca], vec![], Ty::I32);
        let one = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let next = builder.create(&mut ir, MidOp::SubI, &[load, one], vec![], Ty::I32);
        let call = builder.create(&mut ir, MidOp::Call, &[next], vec![Attr::Name("f".into()), Attr::ArgCount(1)], Ty::I32);
        let ret = builder.create(&mut ir, MidOp::Return, &[call], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Tco::new().run(&mut module);

        assert!(module.ir.op(call).erased);
        assert!(module.ir.op(ret).erased);
        let entry_block_ops = module.ir.block_ops(entry);
        assert!(entry_block_ops.iter().any(|&id| !module.ir.op(id).erased));
    }
}
