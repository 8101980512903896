//! Globalization (spec §4.7): a large local (over 32 bytes) in a function that runs at most
//! once is promoted to a module-level static instead of living on the stack — it can't be
//! recursed into, so there's no need to ever re-allocate it.
//!
//! "Runs at most once" is approximated as "is `main`": this backend has no interprocedural
//! call-count analysis, and `main` is the only function the runtime guarantees a single
//! invocation of. Promoting a local this way also means its initial contents are unspecified
//! (the runtime zero-initializes `.bss`) rather than running the constant-folded initializer
//! chain a fuller implementation would compute from the alloca's leading stores.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{Attr, Builder, Global, MidModule, MidOp, Ty};

const PROMOTE_THRESHOLD_BYTES: i64 = 32;

#[derive(Default)]
pub struct Globalize {
    promoted: i64,
}

impl Globalize {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Pass for Globalize {
    fn name(&self) -> &'static str {
        "globalize"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("promoted".into(), self.promoted);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        for func in module.funcs() {
            let name = module.ir.op(func).attrs.iter().find_map(|a| a.as_name()).unwrap_or_default().to_string();
            if name != "main" {
                continue;
            }
            let region = module.ir.op(func).regions[0];
            for &b in &module.ir.region(region).blocks.clone() {
                for op in module.ir.block_ops(b) {
                    if module.ir.op(op).erased || module.ir.op(op).kind != MidOp::Alloca {
                        continue;
                    }
                    let size = module
                        .ir
                        .op(op)
                        .attrs
                        .iter()
                        .find_map(|a| if let Attr::Size(s) = a { Some(*s) } else { None })
                        .unwrap_or(0);
                    if size <= PROMOTE_THRESHOLD_BYTES {
                        continue;
                    }
                    let global_name = format!("__globalized_{}", op.0);
                    module.globals.push(Global {
                        name: global_name.clone(),
                        size,
                        is_float: false,
                        values: Vec::new(),
                        all_zero: true,
                    });

                    let module_block = module.ir.region(module.module_region).blocks[0];
                    let mut builder = Builder::new();
                    builder.set_to_block_end(&module.ir, module_block);
                    builder.create(&mut module.ir, MidOp::Global, &[], vec![Attr::Name(global_name.clone()), Attr::Size(size)], Ty::Void);

                    builder.set_before_op(&module.ir, op);
                    let get_global = builder.create(&mut module.ir, MidOp::GetGlobal, &[], vec![Attr::Name(global_name)], Ty::I64);
                    module.ir.replace_all_uses_with(op, get_global);
                    module.ir.erase(op);
                    self.promoted += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ir::Ir;

    #[test]
    fn a_large_local_in_main_is_promoted_to_a_global() {
        let mut ir: Ir<MidOp> = Ir::new();
        let module_region = ir.new_region(None);
        let module_block = ir.append_block(module_region);
        let mut builder = Builder::new();
        builder.set_to_block_start(&ir, module_block);
        let module_op = builder.create(&mut ir, MidOp::Module, &[], vec![], Ty::Void);

        let func_op = builder.create(&mut ir, MidOp::Func, &[], vec![Attr::Name("main".into()), Attr::Size(0)], Ty::I32);
        let region = ir.append_region_to(func_op);
        let entry = ir.append_block(region);
        builder.set_to_block_start(&ir, entry);
        let big_alloca = builder.create(&mut ir, MidOp::Alloca, &[], vec![Attr::Name("buf".into()), Attr::Size(64)], Ty::I64);
        let load = builder.create(&mut ir, MidOp::Load, &[big_alloca], vec![], Ty::I32);
        builder.create(&mut ir, MidOp::Return, &[load], vec![], Ty::Void);

        let mut module = MidModule { ir, module_op, module_region, globals: Vec::new() };
        Globalize::new().run(&mut module);

        assert!(module.ir.op(big_alloca).erased);
        assert_eq!(module.globals.len(), 1);
        assert_eq!(module.globals[0].size, 64);
    }
}
