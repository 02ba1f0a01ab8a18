//! Traffic-control fault injection for network namespaces.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use chaosd_exec::*;
pub use chaosd_tc::*;
