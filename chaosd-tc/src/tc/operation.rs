//! Structured `tc` operations.
//!
//! Operations are built as values and only turned into an argument vector by
//! [`Operation::to_args`], right before they are handed to the command runner.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::handle::{Handle, Parent};
use super::qdisc::QdiscKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Add,
    Del,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Del => "del",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Object {
    Qdisc,
    Filter,
}

impl Object {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qdisc => "qdisc",
            Self::Filter => "filter",
        }
    }
}

/// An already-encoded qdisc request, as sent by control planes that build their own trees.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QdiscRequest {
    /// `None` and `1:0` both mean the root of the device.
    pub parent: Option<Handle>,
    /// Defaults to `1:`.
    pub handle: Option<Handle>,
    pub kind: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub verb: Verb,
    pub object: Object,
    pub device: String,
    pub parent: Parent,
    pub handle: Option<Handle>,
    pub kind: Option<String>,
    pub args: Vec<String>,
}

impl Operation {
    /// `qdisc add dev <device> <parent> handle <handle> <kind> <args>`.
    pub fn add_qdisc(device: &str, parent: Parent, handle: Handle, qdisc: &QdiscKind) -> Self {
        Self {
            verb: Verb::Add,
            object: Object::Qdisc,
            device: device.to_string(),
            parent,
            handle: Some(handle),
            kind: Some(qdisc.name().to_string()),
            args: qdisc.args(),
        }
    }

    /// `qdisc del dev <device> root`, removing the whole tree of the device.
    pub fn del_root(device: &str) -> Self {
        Self {
            verb: Verb::Del,
            object: Object::Qdisc,
            device: device.to_string(),
            parent: Parent::Root,
            handle: None,
            kind: None,
            args: Vec::new(),
        }
    }

    /// A `basic` filter on qdisc `parent` steering packets whose destination belongs to `ipset`
    /// into `class`.
    pub fn add_ipset_filter(device: &str, parent: Handle, ipset: &str, class: Handle) -> Self {
        Self {
            verb: Verb::Add,
            object: Object::Filter,
            device: device.to_string(),
            parent: Parent::Handle(Handle::qdisc(parent.major)),
            handle: None,
            kind: Some("basic".to_string()),
            args: vec![
                "match".to_string(),
                format!("ipset({ipset} dst)"),
                "classid".to_string(),
                format!("{}:{}", class.major, class.minor),
            ],
        }
    }

    pub fn from_request(verb: Verb, device: &str, request: &QdiscRequest) -> Result<Self> {
        if request.kind.is_empty() {
            return Err(Error::InvalidRuleSpec("qdisc kind is required".into()));
        }

        Ok(Self {
            verb,
            object: Object::Qdisc,
            device: device.to_string(),
            parent: Parent::from_request(request.parent),
            handle: Some(request.handle.unwrap_or(Handle::qdisc(1))),
            kind: Some(request.kind.clone()),
            args: request.args.clone(),
        })
    }

    /// The arguments to pass to `tc`.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.object.as_str().to_string(),
            self.verb.as_str().to_string(),
            "dev".to_string(),
            self.device.clone(),
        ];

        args.extend(self.parent.args());

        if let Some(handle) = self.handle {
            args.push("handle".to_string());
            args.push(handle.to_string());
        }

        args.extend(self.kind.iter().cloned());
        args.extend(self.args.iter().cloned());

        args
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}
