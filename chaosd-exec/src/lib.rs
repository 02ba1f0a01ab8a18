//! Process execution inside network namespaces.

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod command;
pub mod namespace;

pub use command::{CommandRunner, NsenterRunner, Output};
pub use namespace::NetworkNamespace;
