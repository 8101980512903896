//! The arena-backed IR graph: `Op`, `Region`, `BasicBlock`, and the owning `Ir<K>`.
//!
//! `K` is the op-kind enum (`MidOp` for the mid-level IR; `ArmOp`/`RvOp` for the machine
//! layers in `sysc_machine`) so the container, builder, dominance, liveness, and printing
//! code is written once and shared by every level instead of being duplicated per target.

use crate::{Attr, BlockId, OpId, RegionId, Ty};
use smallvec::SmallVec;
use std::fmt;

/// What a concrete op-kind enum must expose so the generic kernel can reason about control
/// flow and printing without knowing the concrete op set.
pub trait OpKind: Clone + fmt::Debug + PartialEq {
    /// Lower-case mnemonic used by `dump`, e.g. `"addi"` (original: `Op::setName`, which
    /// strips the class name's `Op` suffix and lower-cases it).
    fn mnemonic(&self) -> &'static str;
    /// True for unconditional-jump / conditional-branch / return kinds.
    fn is_terminator(&self) -> bool;
    /// True for phi-node kinds (must appear before any non-phi op in a block).
    fn is_phi(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct OpData<K> {
    pub kind: K,
    pub operands: SmallVec<[OpId; 4]>,
    pub attrs: Vec<Attr>,
    pub regions: SmallVec<[RegionId; 1]>,
    pub result_ty: Ty,
    /// Every op that references this op's result as an operand.
    pub uses: Vec<OpId>,
    pub parent: Option<BlockId>,
    pub prev: Option<OpId>,
    pub next: Option<OpId>,
    /// Printable result name (`%12`), assigned at construction.
    pub name: u32,
    pub erased: bool,
}

impl<K> OpData<K> {
    pub fn has_attr(&self, pred: impl Fn(&Attr) -> bool) -> bool {
        self.attrs.iter().any(pred)
    }

    pub fn find_attr(&self, pred: impl Fn(&Attr) -> bool) -> Option<&Attr> {
        self.attrs.iter().find(|a| pred(a))
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockData {
    pub first: Option<OpId>,
    pub last: Option<OpId>,
    pub preds: Vec<BlockId>,
    pub succs: Vec<BlockId>,
    pub idom: Option<BlockId>,
    pub dom_frontier: Vec<BlockId>,
    pub parent_region: Option<RegionId>,
}

#[derive(Debug, Clone, Default)]
pub struct RegionData {
    pub blocks: Vec<BlockId>,
    pub owner: Option<OpId>,
}

/// An owning arena for one IR graph (one compilation unit at some level: mid, arm, or rv).
pub struct Ir<K> {
    pub ops: Vec<OpData<K>>,
    pub blocks: Vec<BlockData>,
    pub regions: Vec<RegionData>,
    next_name: u32,
}

impl<K: OpKind> Default for Ir<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: OpKind> Ir<K> {
    pub fn new() -> Self {
        Ir { ops: Vec::new(), blocks: Vec::new(), regions: Vec::new(), next_name: 0 }
    }

    pub fn op(&self, id: OpId) -> &OpData<K> {
        &self.ops[id.index()]
    }

    pub fn op_mut(&mut self, id: OpId) -> &mut OpData<K> {
        &mut self.ops[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &BlockData {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BlockData {
        &mut self.blocks[id.index()]
    }

    pub fn region(&self, id: RegionId) -> &RegionData {
        &self.regions[id.index()]
    }

    pub fn region_mut(&mut self, id: RegionId) -> &mut RegionData {
        &mut self.regions[id.index()]
    }

    pub fn new_region(&mut self, owner: Option<OpId>) -> RegionId {
        let id = RegionId(self.regions.len() as u32);
        self.regions.push(RegionData { blocks: Vec::new(), owner });
        id
    }

    pub fn append_block(&mut self, region: RegionId) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData { parent_region: Some(region), ..Default::default() });
        self.region_mut(region).blocks.push(id);
        id
    }

    pub fn insert_block_after(&mut self, region: RegionId, after: BlockId) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BlockData { parent_region: Some(region), ..Default::default() });
        let blocks = &mut self.region_mut(region).blocks;
        let pos = blocks.iter().position(|&b| b == after).expect("after-block must live in region");
        blocks.insert(pos + 1, id);
        id
    }

    /// Detaches every block of `region` (in order) and splices them into `dest` directly
    /// after `after`, e.g. flattening a structured `if`/`while`'s child region into its
    /// parent. `region` is left empty; its blocks now belong to `dest`.
    pub fn absorb_region_after(&mut self, region: RegionId, dest: RegionId, after: BlockId) -> Vec<BlockId> {
        let moved = std::mem::take(&mut self.region_mut(region).blocks);
        for &block in &moved {
            self.block_mut(block).parent_region = Some(dest);
        }
        let blocks = &mut self.region_mut(dest).blocks;
        let pos = blocks.iter().position(|&b| b == after).expect("after-block must live in dest region");
        for (offset, &block) in moved.iter().enumerate() {
            blocks.insert(pos + 1 + offset, block);
        }
        moved
    }

    /// Ops belonging to `block`, in order, via the intrusive linked list.
    pub fn block_ops(&self, block: BlockId) -> Vec<OpId> {
        let mut out = Vec::new();
        let mut cur = self.block(block).first;
        while let Some(id) = cur {
            out.push(id);
            cur = self.op(id).next;
        }
        out
    }

    pub fn block_len(&self, block: BlockId) -> usize {
        let mut n = 0;
        let mut cur = self.block(block).first;
        while let Some(id) = cur {
            n += 1;
            cur = self.op(id).next;
        }
        n
    }

    pub fn terminator(&self, block: BlockId) -> Option<OpId> {
        let last = self.block(block).last?;
        self.op(last).kind.is_terminator().then_some(last)
    }

    pub fn phis(&self, block: BlockId) -> Vec<OpId> {
        self.block_ops(block).into_iter().take_while(|&id| self.op(id).kind.is_phi()).collect()
    }

    /// Splices `op` into `block` directly before `before` (`None` => append at the end).
    pub(crate) fn link(&mut self, op: OpId, block: BlockId, before: Option<OpId>) {
        self.op_mut(op).parent = Some(block);
        match before {
            None => {
                let old_last = self.block(block).last;
                self.op_mut(op).prev = old_last;
                self.op_mut(op).next = None;
                if let Some(l) = old_last {
                    self.op_mut(l).next = Some(op);
                } else {
                    self.block_mut(block).first = Some(op);
                }
                self.block_mut(block).last = Some(op);
            }
            Some(before) => {
                let prev = self.op(before).prev;
                self.op_mut(op).prev = prev;
                self.op_mut(op).next = Some(before);
                self.op_mut(before).prev = Some(op);
                match prev {
                    Some(p) => self.op_mut(p).next = Some(op),
                    None => self.block_mut(block).first = Some(op),
                }
            }
        }
    }

    /// Removes `op` from its parent block's linked list without freeing it.
    pub(crate) fn unlink(&mut self, op: OpId) {
        let (prev, next, parent) = {
            let data = self.op(op);
            (data.prev, data.next, data.parent)
        };
        if let Some(p) = prev {
            self.op_mut(p).next = next;
        } else if let Some(block) = parent {
            self.block_mut(block).first = next;
        }
        if let Some(n) = next {
            self.op_mut(n).prev = prev;
        } else if let Some(block) = parent {
            self.block_mut(block).last = prev;
        }
        self.op_mut(op).prev = None;
        self.op_mut(op).next = None;
    }

    /// Creates a new op, links its operands' `uses`, and returns its id. Does not splice it
    /// into a block; callers go through `Builder::create`.
    pub(crate) fn make_op(&mut self, kind: K, operands: &[OpId], attrs: Vec<Attr>, result_ty: Ty) -> OpId {
        let id = OpId(self.ops.len() as u32);
        self.ops.push(OpData {
            kind,
            operands: operands.iter().copied().collect(),
            attrs,
            regions: SmallVec::new(),
            result_ty,
            uses: Vec::new(),
            parent: None,
            prev: None,
            next: None,
            name: self.next_name,
            erased: false,
        });
        self.next_name += 1;
        for &def in operands {
            self.op_mut(def).uses.push(id);
        }
        id
    }

    pub fn append_region_to(&mut self, op: OpId) -> RegionId {
        let region = self.new_region(Some(op));
        self.op_mut(op).regions.push(region);
        region
    }

    /// Rewrites every user of `old`'s operand list to reference `new` instead, leaving `old`
    /// with an empty `uses` list (safe to `erase`).
    pub fn replace_all_uses_with(&mut self, old: OpId, new: OpId) {
        let users = std::mem::take(&mut self.op_mut(old).uses);
        for user in &users {
            for slot in self.op_mut(*user).operands.clone().iter().enumerate() {
                let (i, &operand) = slot;
                if operand == old {
                    self.op_mut(*user).operands[i] = new;
                }
            }
            self.op_mut(new).uses.push(*user);
        }
    }

    pub fn set_operand(&mut self, user: OpId, index: usize, new: OpId) {
        let old = self.op(user).operands[index];
        if old == new {
            return;
        }
        self.op_mut(old).uses.retain(|&u| u != user);
        self.op_mut(user).operands[index] = new;
        self.op_mut(new).uses.push(user);
    }

    pub fn add_operand(&mut self, user: OpId, def: OpId) {
        self.op_mut(user).operands.push(def);
        self.op_mut(def).uses.push(user);
    }

    /// Detaches `op`: unlinks from its block, drops it from every operand's `uses`. Requires
    /// `op` to have no remaining users (panics otherwise — an IR invariant, not a soft
    /// error: callers must `replace_all_uses_with` first).
    pub fn erase(&mut self, op: OpId) {
        assert!(self.op(op).uses.is_empty(), "erasing op {op} with live uses");
        self.unlink(op);
        let operands = self.op(op).operands.clone();
        for def in operands {
            self.op_mut(def).uses.retain(|&u| u != op);
        }
        self.op_mut(op).erased = true;
        self.op_mut(op).operands.clear();
    }

    /// Detaches `op` from wherever it lives and appends it at the end of `block`.
    pub fn move_to_block_end(&mut self, op: OpId, block: BlockId) {
        self.unlink(op);
        self.link(op, block, None);
    }

    pub fn move_before(&mut self, op: OpId, before: OpId) {
        let block = self.op(before).parent.expect("before-op must be attached");
        self.unlink(op);
        self.link(op, block, Some(before));
    }

    pub fn move_after(&mut self, op: OpId, after: OpId) {
        let next = self.op(after).next;
        let block = self.op(after).parent.expect("after-op must be attached");
        self.unlink(op);
        self.link(op, block, next);
    }
}
