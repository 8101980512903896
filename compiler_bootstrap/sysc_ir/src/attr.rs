//! Tagged side-records on ops. A single `Attr` enum replaces the original's
//! `Attr`/`AttrImpl<T, AttrID>` class hierarchy (design note: a tagged sum plus one match
//! per consumer, instead of virtual `toString`/`classof` dispatch).

use crate::BlockId;
use std::collections::BTreeSet;

/// Per-location aliasing info attached to address-typed ops by the `Alias` pass.
/// `offsets = None` means "unknown offset" (the `-1` sentinel of the original source).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInfo {
    pub base: AliasBase,
    pub offsets: Option<BTreeSet<i64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AliasBase {
    /// The defining alloca/global op, identified by arena index.
    Op(u32),
    /// Not traceable to a single known location (e.g. pointer arithmetic on an argument).
    Unknown,
}

impl AliasInfo {
    pub fn unknown() -> Self {
        AliasInfo { base: AliasBase::Unknown, offsets: None }
    }

    /// Two locations definitely refer to the same address: same known base, same singleton
    /// known offset.
    pub fn must_alias(&self, other: &AliasInfo) -> bool {
        if self.base != other.base || self.base == AliasBase::Unknown {
            return false;
        }
        match (&self.offsets, &other.offsets) {
            (Some(a), Some(b)) if a.len() == 1 && b.len() == 1 => a == b,
            _ => false,
        }
    }

    /// Two locations might refer to the same address: share a base, or either is unknown.
    pub fn may_alias(&self, other: &AliasInfo) -> bool {
        if self.base == AliasBase::Unknown || other.base == AliasBase::Unknown {
            return true;
        }
        if self.base != other.base {
            return false;
        }
        match (&self.offsets, &other.offsets) {
            (Some(a), Some(b)) => a.intersection(b).next().is_some(),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Attr {
    Name(String),
    Int(i64),
    Float(f32),
    Size(i64),
    /// Unconditional or taken-branch target.
    Target(BlockId),
    /// Conditional branch's not-taken target.
    Else(BlockId),
    /// Phi operand's originating predecessor block.
    From(BlockId),
    IntArray { values: Vec<i32>, all_zero: bool },
    /// Names of every function observed calling this one (used by `Globalize`).
    Caller(Vec<String>),
    Impure,
    AtMostOnce,
    Range(i64, i64),
    Alias(AliasInfo),
    ArgCount(usize),
    /// A raw, target-agnostic physical register number assigned by the allocator; the
    /// machine layer maps this to its own register enum.
    Reg(u8),
    SpilledRd { offset: i32, is_fp: bool },
    SpilledRs { offset: i32, is_fp: bool },
    SpilledRs2 { offset: i32, is_fp: bool },
    SpilledRs3 { offset: i32, is_fp: bool },
    StackOffset(i32),
    /// Total stack-frame size a function needs for its spill slots, set by the allocator and
    /// read back by `emit` when generating the prologue/epilogue.
    FrameSize(i32),
    /// Class-relative ABI argument/return-register index (0-based, counted separately for the
    /// GP and FP register files) on a `WriteReg`/`ReadReg` op. Distinct from `Reg`: this is the
    /// calling convention's mandated slot, set at instruction selection, not the allocator's own
    /// choice — though the allocator pre-colors a `ReadReg` to match it (spec §4.9 Step 1).
    ArgReg(u8),
}

impl Attr {
    pub fn int_array(values: Vec<i32>) -> Self {
        let all_zero = values.iter().all(|&v| v == 0);
        Attr::IntArray { values, all_zero }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Attr::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Attr::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            Attr::Name(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<BlockId> {
        match self {
            Attr::Target(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_else(&self) -> Option<BlockId> {
        match self {
            Attr::Else(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_from(&self) -> Option<BlockId> {
        match self {
            Attr::From(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_reg(&self) -> Option<u8> {
        match self {
            Attr::Reg(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_arg_reg(&self) -> Option<u8> {
        match self {
            Attr::ArgReg(r) => Some(*r),
            _ => None,
        }
    }
}
