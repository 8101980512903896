//! Stable arena-index handles, replacing the raw-pointer IR graph of the original source
//! (design note: "Arena-allocated ops with stable indices as handles").

use std::fmt;

macro_rules! index_handle {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

index_handle!(OpId);
index_handle!(BlockId);
index_handle!(RegionId);
