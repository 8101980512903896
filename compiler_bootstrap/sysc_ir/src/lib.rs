//! The SSA IR kernel: `Value`/`Op`/`Region`/`BasicBlock`, the `Builder`, dominance and
//! liveness analyses, and printing (spec §4.1). Also hosts `CodeGen`, the AST-to-mid-IR
//! emitter, since building IR is part of this kernel's own story.

pub mod attr;
pub mod builder;
pub mod codegen;
pub mod dominance;
pub mod ids;
pub mod liveness;
pub mod mid_op;
pub mod op;
pub mod print;
pub mod ty;

pub use attr::{AliasBase, AliasInfo, Attr};
pub use builder::{Builder, Guard};
pub use codegen::{CodeGen, Global, MidModule};
pub use ids::{BlockId, OpId, RegionId};
pub use liveness::Liveness;
pub use mid_op::MidOp;
pub use op::{BlockData, Ir, OpData, OpKind, RegionData};
pub use print::DumpContext;
pub use ty::Ty;

/// The mid-level IR graph type, an alias kept for readability at call sites.
pub type Module = Ir<MidOp>;
