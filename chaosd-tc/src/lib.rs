//! Compilation of traffic-control rule sets into `tc` qdisc trees.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod classify;
pub mod config;
pub mod error;
pub mod rule;
pub mod shaper;
pub mod tc;

pub use classify::{ChainDescriptor, Direction, PacketFilter, TcFilterBackend};
pub use config::TcConfig;
pub use error::{BoxError, Error, Result};
pub use rule::{Netem, Rule, RuleKind, Tbf};
pub use shaper::TrafficShaper;
pub use tc::handle::{Handle, Parent};
