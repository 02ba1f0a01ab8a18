//! The queueing disciplines the compiler creates.

use crate::rule::{Netem, Tbf};

use super::codec;

/// Default bands of the PRIO multiplexer, each served by an SFQ leaf.
pub const DEFAULT_BANDS: u16 = 3;

/// The kernel's `TCQ_PRIO_BANDS`.
pub const MAX_PRIO_BANDS: u16 = 16;

/// Maps the 16 packet priorities (TOS derived) to the default bands.
pub const DEFAULT_PRIORITY_MAP: [u8; 16] = [1, 2, 2, 2, 1, 2, 0, 0, 1, 1, 1, 1, 1, 1, 1, 1];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QdiscKind {
    Netem(Netem),
    Tbf(Tbf),
    Prio { bands: u16, priomap: [u8; 16] },
    Sfq,
}

impl QdiscKind {
    /// The qdisc name as understood by `tc`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Netem(_) => "netem",
            Self::Tbf(_) => "tbf",
            Self::Prio { .. } => "prio",
            Self::Sfq => "sfq",
        }
    }

    pub fn args(&self) -> Vec<String> {
        match self {
            Self::Netem(netem) => codec::netem_args(netem),
            Self::Tbf(tbf) => codec::tbf_args(tbf),
            Self::Prio { bands, priomap } => codec::prio_args(*bands, priomap),
            Self::Sfq => Vec::new(),
        }
    }
}
