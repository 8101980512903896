//! Structured-to-flat CFG lowering (spec §4.3): rewrites each `if`/`while` op into real
//! blocks and branch/jump terminators, and resolves `break`/`continue` targets that
//! `CodeGen` left unset since the loop's join block doesn't exist until now.

use crate::pass::Pass;
use hashbrown::HashMap;
use sysc_ir::{Attr, BlockId, Builder, Ir, MidModule, MidOp, OpId, RegionId, Ty};

#[derive(Default)]
pub struct FlattenCfg {
    ifs_flattened: i64,
    whiles_flattened: i64,
}

impl FlattenCfg {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_structured_op(&self, ir: &Ir<MidOp>, block: BlockId) -> Option<OpId> {
        ir.block_ops(block).into_iter().find(|&id| matches!(ir.op(id).kind, MidOp::If | MidOp::While))
    }

    /// Moves every op strictly after `op` into a freshly inserted block following `block`,
    /// leaving `op` itself (still to be erased by the caller) as `block`'s last op.
    fn split_block_at(&self, ir: &mut Ir<MidOp>, region: RegionId, block: BlockId, op: OpId) -> BlockId {
        let tail = ir.insert_block_after(region, block);
        let mut cur = ir.op(op).next;
        while let Some(id) = cur {
            let next = ir.op(id).next;
            ir.move_to_block_end(id, tail);
            cur = next;
        }
        tail
    }

    fn ensure_goto(&self, ir: &mut Ir<MidOp>, builder: &mut Builder, block: BlockId, target: BlockId) {
        if ir.terminator(block).is_none() {
            builder.set_to_block_end(ir, block);
            builder.create(ir, MidOp::Goto, &[], vec![Attr::Target(target)], Ty::Void);
        }
    }

    /// Rewrites a resolved `break`/`continue` terminator into a `goto`, and otherwise leaves
    /// `block`'s terminator untouched.
    fn resolve_structural_jump(&self, ir: &mut Ir<MidOp>, builder: &mut Builder, block: BlockId, loop_ctx: Option<(BlockId, BlockId)>) {
        let Some(term) = ir.terminator(block) else { return };
        let target = match ir.op(term).kind {
            MidOp::Break => loop_ctx.expect("`break` outside a loop should have been rejected at codegen").0,
            MidOp::Continue => loop_ctx.expect("`continue` outside a loop should have been rejected at codegen").1,
            _ => return,
        };
        ir.erase(term);
        builder.set_to_block_end(ir, block);
        builder.create(ir, MidOp::Goto, &[], vec![Attr::Target(target)], Ty::Void);
    }

    /// Fully flattens `region` in place. `loop_ctx`, if set, is `(join, before)` of the
    /// innermost enclosing loop, used to resolve `break`/`continue` found along the way.
    fn flatten_region(&mut self, ir: &mut Ir<MidOp>, builder: &mut Builder, region: RegionId, loop_ctx: Option<(BlockId, BlockId)>) {
        let mut i = 0;
        loop {
            let blocks = ir.region(region).blocks.clone();
            let Some(&block) = blocks.get(i) else { break };
            match self.find_structured_op(ir, block) {
                Some(op) => match ir.op(op).kind {
                    MidOp::If => self.flatten_if(ir, builder, region, block, op, loop_ctx),
                    MidOp::While => self.flatten_while(ir, builder, region, block, op, loop_ctx),
                    _ => unreachable!(),
                },
                None => self.resolve_structural_jump(ir, builder, block, loop_ctx),
            }
            i += 1;
        }
    }

    fn flatten_if(
        &mut self,
        ir: &mut Ir<MidOp>,
        builder: &mut Builder,
        region: RegionId,
        block: BlockId,
        if_op: OpId,
        loop_ctx: Option<(BlockId, BlockId)>,
    ) {
        let cond = ir.op(if_op).operands[0];
        let regions = ir.op(if_op).regions.clone();
        let then_region = regions[0];
        let else_region = regions.get(1).copied();

        let tail = self.split_block_at(ir, region, block, if_op);
        ir.erase(if_op);

        self.flatten_region(ir, builder, then_region, loop_ctx);
        if let Some(er) = else_region {
            self.flatten_region(ir, builder, er, loop_ctx);
        }

        let then_first = ir.region(then_region).blocks[0];
        let then_last = *ir.region(then_region).blocks.last().unwrap();
        self.ensure_goto(ir, builder, then_last, tail);

        let else_first = match else_region {
            Some(er) => {
                let else_last = *ir.region(er).blocks.last().unwrap();
                self.ensure_goto(ir, builder, else_last, tail);
                ir.region(er).blocks[0]
            }
            None => tail,
        };

        let moved_then = ir.absorb_region_after(then_region, region, block);
        let last_then_spliced = moved_then.last().copied().unwrap_or(block);
        if let Some(er) = else_region {
            ir.absorb_region_after(er, region, last_then_spliced);
        }

        builder.set_to_block_end(ir, block);
        builder.create(ir, MidOp::Branch, &[cond], vec![Attr::Target(then_first), Attr::Else(else_first)], Ty::Void);

        self.ifs_flattened += 1;
    }

    fn flatten_while(
        &mut self,
        ir: &mut Ir<MidOp>,
        builder: &mut Builder,
        region: RegionId,
        block: BlockId,
        while_op: OpId,
        loop_ctx: Option<(BlockId, BlockId)>,
    ) {
        let regions = ir.op(while_op).regions.clone();
        let before_region = regions[0];
        let after_region = regions[1];

        let tail = self.split_block_at(ir, region, block, while_op);
        ir.erase(while_op);

        let before_entry = ir.region(before_region).blocks[0];

        self.flatten_region(ir, builder, before_region, loop_ctx);
        self.flatten_region(ir, builder, after_region, Some((tail, before_entry)));

        let before_last = *ir.region(before_region).blocks.last().unwrap();
        let proceed = ir.terminator(before_last).expect("while condition region must end in `proceed`");
        debug_assert_eq!(ir.op(proceed).kind, MidOp::Proceed);
        let cond = ir.op(proceed).operands[0];
        let after_first = ir.region(after_region).blocks[0];
        ir.erase(proceed);
        builder.set_to_block_end(ir, before_last);
        builder.create(ir, MidOp::Branch, &[cond], vec![Attr::Target(after_first), Attr::Else(tail)], Ty::Void);

        let after_last = *ir.region(after_region).blocks.last().unwrap();
        self.ensure_goto(ir, builder, after_last, before_entry);

        let moved_before = ir.absorb_region_after(before_region, region, block);
        let last_before_spliced = moved_before.last().copied().unwrap_or(block);
        ir.absorb_region_after(after_region, region, last_before_spliced);

        builder.set_to_block_end(ir, block);
        builder.create(ir, MidOp::Goto, &[], vec![Attr::Target(before_entry)], Ty::Void);

        self.whiles_flattened += 1;
    }
}

impl Pass for FlattenCfg {
    fn name(&self) -> &'static str {
        "flatten-cfg"
    }

    fn stats(&self) -> HashMap<String, i64> {
        let mut m = HashMap::new();
        m.insert("ifs_flattened".into(), self.ifs_flattened);
        m.insert("whiles_flattened".into(), self.whiles_flattened);
        m
    }

    fn run(&mut self, module: &mut MidModule) {
        let mut builder = Builder::new();
        for func in module.funcs() {
            let region = module.ir.op(func).regions[0];
            self.flatten_region(&mut module.ir, &mut builder, region, None);
            module.ir.update_preds(region);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sysc_ast as ast;
    use sysc_common::Span;
    use sysc_ir::CodeGen;

    fn sp() -> Span {
        Span::dummy()
    }

    #[test]
    fn flattens_a_while_loop_into_a_three_block_shape() {
        let body = ast::Node::Block {
            span: sp(),
            nodes: vec![
                ast::Node::VarDecl {
                    name: "s".into(),
                    init: Box::new(ast::Node::Int { value: 0, span: sp() }),
                    mutable: true,
                    span: sp(),
                },
                ast::Node::While {
                    cond: Box::new(ast::Node::Binary {
                        op: ast::BinaryOp::Lt,
                        lhs: Box::new(ast::Node::VarRef { name: "s".into(), span: sp() }),
                        rhs: Box::new(ast::Node::VarRef { name: "n".into(), span: sp() }),
                        span: sp(),
                    }),
                    body: Box::new(ast::Node::Block {
                        span: sp(),
                        nodes: vec![ast::Node::Assign {
                            name: "s".into(),
                            value: Box::new(ast::Node::Binary {
                                op: ast::BinaryOp::Add,
                                lhs: Box::new(ast::Node::VarRef { name: "s".into(), span: sp() }),
                                rhs: Box::new(ast::Node::Int { value: 1, span: sp() }),
                                span: sp(),
                            }),
                            span: sp(),
                        }],
                    }),
                    span: sp(),
                },
                ast::Node::Return { value: Some(Box::new(ast::Node::VarRef { name: "s".into(), span: sp() })), span: sp() },
            ],
        };
        let module = ast::Module {
            functions: vec![ast::FnDecl {
                name: "f".into(),
                params: vec![ast::Param { name: "n".into(), ty: ast::Type::Int }],
                ret: ast::Type::Int,
                body,
                span: sp(),
            }],
        };
        let mut mid = CodeGen::lower(&module).unwrap();
        FlattenCfg::new().run(&mut mid);

        let func = mid.funcs()[0];
        let region = mid.ir.op(func).regions[0];
        assert_eq!(mid.ir.region(region).blocks.len(), 4, "entry, before, after, join");
        for &b in &mid.ir.region(region).blocks {
            assert!(mid.ir.terminator(b).is_some(), "every flattened block must be terminated");
        }
    }
}
