//! Dead-code elimination (spec §4.7): side-effect-free ops with no users are removed; after
//! flattening, unreachable blocks are removed too.

use crate::pass::Pass;
use hashbrown::{HashMap, HashSet};
use sysc_ir::{MidModule, MidOp};

#[derive(Default)]
pub struct Dce {
    ops_removed: i64,
    blocks_removed: i64,
}

impl Dce {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_pure(kind: MidOp) -> bool {
        !matches!(
            kind,
            MidOp::Store
                | MidOp::Call
                | MidOp::Return
                | MidOp::Goto
                | MidOp::Branch
                | MidOp::Proceed
                | MidOp::Break
                | MidOp::Continue
                | MidOp::Memcpy
                | MidOp::Module
                | MidOp::Func
        )
    }
}

impl Pass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("ops_removed".into(), self.ops_removed);
        m.insert("blocks_removed".into(), self.blocks_removed);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];

            // Unreachable-block removal: a simple forward reachability sweep from the
            // region's first block, using the already-recomputed `succs`.
            let blocks = module.ir.region(region).blocks.clone();
            if let Some(&entry) = blocks.first() {
                let mut reachable = HashSet::new();
                let mut stack = vec![entry];
                while let Some(b) = stack.pop() {
                    if !reachable.insert(b) {
                        continue;
                    }
                    for &s in &module.ir.block(b).succs.clone() {
                        stack.push(s);
                    }
                }
                for &b in &blocks {
                    if !reachable.contains(&b) {
                        let ops = module.ir.block_ops(b);
                        for &op in ops.iter().rev() {
                            if module.ir.op(op).uses.is_empty() {
                                module.ir.erase(op);
                            }
                        }
                        module.ir.region_mut(region).blocks.retain(|&x| x != b);
                        self.blocks_removed += 1;
                    }
                }
            }

            // Dead-op removal to a fixed point: pure ops with no remaining users.
            let mut changed = true;
            while changed {
                changed = false;
                let blocks = module.ir.region(region).blocks.clone();
                for &b in &blocks {
                    let ops = module.ir.block_ops(b);
                    for op in ops {
                        let data = module.ir.op(op);
                        if data.erased || !data.uses.is_empty() {
                            continue;
                        }
                        if Self::is_pure(data.kind) {
                            module.ir.erase(op);
                            self.ops_removed += 1;
                            changed = true;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::{Attr, Builder, Ir, Ty};

    #[test]
    fn removes_unused_pure_arithmetic() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);

        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("f".into())], Ty::I32);
        let func_region = ir.append_region_to(func_op);
        let entry = ir.append_block(func_region);
        builder.set_to_block_start(&ir, entry);
        let a = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let _unused = builder.create(&mut ir, MidOp::AddI, &[a, a], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[a], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        module.ir.update_preds(func_region);
        Dce::new().run(&mut module);

        let remaining = module.ir.block_ops(entry).into_iter().filter(|&id| !module.ir.op(id).erased).count();
        assert_eq!(remaining, 2, "the dead add should be erased, leaving the literal and the return");
    }
}
