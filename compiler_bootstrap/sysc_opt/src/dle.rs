//! Dead load elimination (spec §4.7): a dominator-tree-scoped table of precisely-known
//! addresses and their last-known value. Requires `Alias` to have already tagged every
//! load/store with its resolved `Attr::Alias`. Replacing a downstream load with an upstream
//! value is always sound here since the scoped table only flows parent → child.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{AliasBase, BlockId, MidModule, MidOp, OpId};

#[derive(Default)]
pub struct Dle {
    eliminated: i64,
}

impl Dle {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` when the op's `Attr::Alias` is missing, unknown-based, or multi-offset — any
    /// such address can't be safely tracked precisely.
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
        Some((base, *offsets.iter().next().unwrap()))
    }

    fn dom_children(ir: &sysc_ir::Ir<MidOp>, blocks: &[BlockId]) -> HashMap<BlockId, Vec<BlockId>> {
        let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for &b in blocks {
            if let Some(idom) = ir.block(b).idom {
                children.entry(idom).or_default().push(b);
            }
        }
        children
    }
}

impl Pass for Dle {
    fn name(&self) -> &'static str {
        "dle"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("eliminated".into(), self.eliminated);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            module.ir.update_doms(region);
            let blocks = module.ir.region(region).blocks.clone();
            let Some(&entry) = blocks.first() else { continue };
            let children = Self::dom_children(&module.ir, &blocks);
            let mut table: HashMap<(u32, i64), OpId> = HashMap::new();
            self.walk(&mut module.ir, entry, &children, &mut table);
        }
    }
}

impl Dle {
    fn walk(
        &mut self,
        ir: &mut sysc_ir::Ir<MidOp>,
        block: BlockId,
        children: &HashMap<BlockId, Vec<BlockId>>,
        table: &mut HashMap<(u32, i64), OpId>,
    ) {
        for op in ir.block_ops(block) {
            if ir.op(op).erased {
                continue;
            }
            match ir.op(op).kind {
                MidOp::Store => {
                    let value = ir.op(op).operands[0];
                    match Self::precise_key(ir, op) {
                        Some(key) => {
                            table.insert(key, value);
                        }
                        None => table.clear(),
                    }
                }
                MidOp::Load => match Self::precise_key(ir, op) {
                    Some(key) => {
                        if let Some(&value) = table.get(&key) {
                            ir.replace_all_uses_with(op, value);
                            ir.erase(op);
                            self.eliminated += 1;
                        } else {
                            table.insert(key, op);
                        }
                    }
                    None => {}
                },
                _ => {}
            }
        }

        if let Some(kids) = children.get(&block) {
            for &kid in kids {
                self.walk(ir, kid, children, &mut table.clone());
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
    fn a_load_right_after_a_store_to_the_same_alloca_is_forwarded() {
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
        let val = builder.create(&mut ir, MidOp::Int, &[], vec![Attr::Int(7)], Ty::I32);
        builder.create(&mut ir, MidOp::Store, &[val, alloca], vec![], Ty::Void);
        let load = builder.create(&mut ir, MidOp::Load, &[alloca], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[load], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Alias::new().run(&mut module);
        Dle::new().run(&mut module);

        assert!(module.ir.op(load).erased, "load should be forwarded from the preceding store");
    }
}
