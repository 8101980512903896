//! Textual IR dump. Replaces the original's mutable global `bbid`/`bbmap` with an explicit
//! `DumpContext` threaded through printing (design notes table).

use crate::{Attr, BlockId, Ir, OpId, OpKind, RegionId};
use hashbrown::HashMap;
use std::fmt::Write;

#[derive(Default)]
pub struct DumpContext {
    bb_numbers: HashMap<BlockId, u32>,
    next_bb: u32,
}

impl DumpContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bb_number(&mut self, block: BlockId) -> u32 {
        *self.bb_numbers.entry(block).or_insert_with(|| {
            let n = self.next_bb;
            self.next_bb += 1;
            n
        })
    }
}

fn format_attr(attr: &Attr, ctx: &mut DumpContext) -> String {
    match attr {
        Attr::Name(s) => format!("<name = {s}>"),
        Attr::Int(v) => format!("<int = {v}>"),
        Attr::Float(v) => format!("<float = {v}>"),
        Attr::Size(v) => format!("<size = {v}>"),
        Attr::Target(b) => format!("<bb{}>", ctx.bb_number(*b)),
        Attr::Else(b) => format!("<else = bb{}>", ctx.bb_number(*b)),
        Attr::From(b) => format!("<from = bb{}>", ctx.bb_number(*b)),
        Attr::IntArray { values, all_zero } => {
            if *all_zero {
                format!("<array = 0 x {}>", values.len())
            } else {
                let joined = values.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
                format!("<array = {joined}>")
            }
        }
        Attr::Caller(names) => format!("<caller = {}>", names.join(", ")),
        Attr::Impure => "<impure>".to_string(),
        Attr::AtMostOnce => "<at-most-once>".to_string(),
        Attr::Range(lo, hi) => format!("<range = {lo}..{hi}>"),
        Attr::Alias(_) => "<alias>".to_string(),
        Attr::ArgCount(n) => format!("<argc = {n}>"),
        Attr::Reg(r) => format!("<reg = r{r}>"),
        Attr::SpilledRd { offset, is_fp } => format!("<spilled-rd = {offset}{}>", if *is_fp { "f" } else { "" }),
        Attr::SpilledRs { offset, is_fp } => format!("<spilled-rs = {offset}{}>", if *is_fp { "f" } else { "" }),
        Attr::SpilledRs2 { offset, is_fp } => format!("<spilled-rs2 = {offset}{}>", if *is_fp { "f" } else { "" }),
        Attr::SpilledRs3 { offset, is_fp } => format!("<spilled-rs3 = {offset}{}>", if *is_fp { "f" } else { "" }),
        Attr::StackOffset(v) => format!("<stack-offset = {v}>"),
    }
}

impl<K: OpKind> Ir<K> {
    pub fn dump_op(&self, op: OpId, ctx: &mut DumpContext, depth: usize, out: &mut String) {
        let data = self.op(op);
        let _ = write!(out, "{}%{} = {}", "  ".repeat(depth), data.name, data.kind.mnemonic());
        for &operand in &data.operands {
            let _ = write!(out, " %{}", self.op(operand).name);
        }
        for attr in &data.attrs {
            let _ = write!(out, " {}", format_attr(attr, ctx));
        }
        if !data.regions.is_empty() {
            out.push(' ');
            let regions = data.regions.clone();
            for region in regions {
                self.dump_region(region, ctx, depth + 1, out);
            }
        }
        out.push('\n');
    }

    pub fn dump_region(&self, region: RegionId, ctx: &mut DumpContext, depth: usize, out: &mut String) {
        out.push_str("{\n");
        let blocks = self.region(region).blocks.clone();
        let multi = blocks.len() != 1;
        for block in blocks {
            if multi {
                let _ = writeln!(out, "{}bb{}:", "  ".repeat(depth.saturating_sub(1)), ctx.bb_number(block));
            }
            for op in self.block_ops(block) {
                self.dump_op(op, ctx, depth, out);
            }
        }
        let _ = writeln!(out, "{}}}", "  ".repeat(depth.saturating_sub(1)));
    }

    pub fn dump_region_to_string(&self, region: RegionId) -> String {
        let mut ctx = DumpContext::new();
        let mut out = String::new();
        self.dump_region(region, &mut ctx, 1, &mut out);
        out
    }
}
