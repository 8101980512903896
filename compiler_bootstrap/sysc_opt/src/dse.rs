//! Dead store elimination (spec §4.7): a store to a precisely-known alloca address that is
//! overwritten by a later store to the same address, with no intervening load or call that
//! might observe it, is dead and erased.
//!
//! Scoped to straight-line runs within a single block. A dominator-tree-scoped table (as used
//! by `Gvn`/`Dle`) would be unsound here: killing a store because a *sibling* branch overwrites
//! it without reading is wrong when another sibling branch still reads the original value, and
//! a scoped table can't see across siblings. Intra-block reasoning sidesteps that trap entirely.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{AliasBase, MidModule, MidOp, OpId};

#[derive(Default)]
pub struct Dse {
    eliminated: i64,
}

impl Dse {
    pub fn new() -> Self {
        Self::default()
    }

    fn precise_key(ir: &sysc_ir::Ir<MidOp>, op: OpId) -> Option<(u32, i64)> {
        let alias = ir.op(op).attrs.iter().find_map(|a| match a {
            sysc_ir::Attr::Alias(info) => Some(info),
            _ => None,
        })?;
        let AliasBase::Op(base) = alias.base else { return None };
        let offsets = alias.offsets.as_ref()?;
        if offsets.len() != 1 {
            return None;
        }
        // Only locally-allocated addresses are safe to drop stores to: nothing outside this
        // function can observe a write that gets overwritten before it's ever read.
        if ir.op(OpId(base)).kind != MidOp::Alloca {
            return None;
        }
        Some((base, *offsets.iter().next().unwrap()))
    }
}

impl Pass for Dse {
    fn name(&self) -> &'static str {
        "dse"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("eliminated".into(), self.eliminated);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            for &b in &module.ir.region(region).blocks.clone() {
                let mut pending: HashMap<(u32, i64), OpId> = HashMap::new();
                for op in module.ir.block_ops(b) {
                    if module.ir.op(op).erased {
                        continue;
                    }
                    match module.ir.op(op).kind {
                        MidOp::Store => match Self::precise_key(&module.ir, op) {
                            Some(key) => {
                                if let Some(&prior) = pending.get(&key) {
                                    module.ir.erase(prior);
                                    self.eliminated += 1;
                                }
                                pending.insert(key, op);
                            }
                            None => pending.clear(),
                        },
                        MidOp::Load => match Self::precise_key(&module.ir, op) {
                            Some(key) => {
                                pending.remove(&key);
                            }
                            None => pending.clear(),
                        },
                        MidOp::Call => pending.clear(),
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::Alias;
    use sysc_ir::{Attr, Builder, Ir, Ty};

    #[test]
    fn a_store_overwritten_before_any_load_is_dead() {
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
        let alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![], Ty::I64);
        let v1 = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(1)], Ty::I32);
        let v2 = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(2)], Ty::I32);
        let store1 = builder.create(&mut ir, MidOp::Store, &[v1, alloca], vec![], Ty::Void);
        builder.create(&mut ir, MidOp::Store, &[v2, alloca], vec![], Ty::Void);
        let load = builder.create(&mut ir, MidOp::Load, &[alloca], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[load], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Alias::new().run(&mut module);
        Dse::new().run(&mut module);

        assert!(module.ir.op(store1).erased, "first store is dead, overwritten before any read");
    }
}
