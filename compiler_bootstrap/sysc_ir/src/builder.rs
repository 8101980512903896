//! A cursor bound to `(block, position)` that creates and splices ops — the same contract
//! as the original source's `Builder`, including its scoped insertion-point `Guard`.

use crate::{Attr, BlockId, Ir, OpId, OpKind, RegionId, Ty};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Cursor {
    block: BlockId,
    /// Insert immediately before this op; `None` means "append at block end".
    before: Option<OpId>,
}

pub struct Builder {
    cursor: Option<Cursor>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Builder { cursor: None }
    }

    pub fn set_to_region_start<K: OpKind>(&mut self, ir: &Ir<K>, region: RegionId) {
        let block = ir.region(region).blocks[0];
        self.set_to_block_start(ir, block);
    }

    pub fn set_to_region_end<K: OpKind>(&mut self, ir: &Ir<K>, region: RegionId) {
        let block = *ir.region(region).blocks.last().expect("region has no blocks");
        self.set_to_block_end(ir, block);
    }

    pub fn set_to_block_start<K: OpKind>(&mut self, ir: &Ir<K>, block: BlockId) {
        self.cursor = Some(Cursor { block, before: ir.block(block).first });
    }

    pub fn set_to_block_end(&mut self, _ir: &Ir<impl OpKind>, block: BlockId) {
        self.cursor = Some(Cursor { block, before: None });
    }

    pub fn set_before_op<K: OpKind>(&mut self, ir: &Ir<K>, op: OpId) {
        let block = ir.op(op).parent.expect("op must be attached to set insertion point");
        self.cursor = Some(Cursor { block, before: Some(op) });
    }

    pub fn set_after_op<K: OpKind>(&mut self, ir: &Ir<K>, op: OpId) {
        let block = ir.op(op).parent.expect("op must be attached to set insertion point");
        self.cursor = Some(Cursor { block, before: ir.op(op).next });
    }

    pub fn current_block(&self) -> BlockId {
        self.cursor.expect("builder has no insertion point set").block
    }

    pub fn create<K: OpKind>(
        &mut self,
        ir: &mut Ir<K>,
        kind: K,
        operands: &[OpId],
        attrs: Vec<Attr>,
        result_ty: Ty,
    ) -> OpId {
        let cursor = self.cursor.expect("builder has no insertion point set");
        let id = ir.make_op(kind, operands, attrs, result_ty);
        ir.link(id, cursor.block, cursor.before);
        id
    }

    /// Restores the previous insertion point when dropped (the original's `Builder::Guard`).
    pub fn guard(&mut self) -> Guard<'_> {
        let saved = self.cursor;
        Guard { builder: self, saved }
    }
}

pub struct Guard<'a> {
    builder: &'a mut Builder,
    saved: Option<Cursor>,
}

impl<'a> std::ops::Deref for Guard<'a> {
    type Target = Builder;
    fn deref(&self) -> &Builder {
        self.builder
    }
}

impl<'a> std::ops::DerefMut for Guard<'a> {
    fn deref_mut(&mut self) -> &mut Builder {
        self.builder
    }
}

impl<'a> Drop for Guard<'a> {
    fn drop(&mut self) {
        self.builder.cursor = self.saved;
    }
}
