//! Planning of the qdisc tree for a rule set.
//!
//! Nothing here touches the kernel. Every step takes the handle [`Cursor`] left by the previous
//! one and returns the nodes it laid out together with the advanced cursor, so the numbering is
//! fully determined by the rule set.

use std::fmt;

use crate::error::{Error, Result};
use crate::rule::Rule;

use super::handle::{Handle, Parent};
use super::operation::Operation;
use super::qdisc::{QdiscKind, DEFAULT_BANDS, MAX_PRIO_BANDS};

/// One `qdisc add`: the parent must exist before the node is created.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub parent: Parent,
    pub handle: Handle,
    pub qdisc: QdiscKind,
}

impl ChainNode {
    pub fn operation(&self, device: &str) -> Operation {
        Operation::add_qdisc(device, self.parent, self.handle, &self.qdisc)
    }
}

impl fmt::Display for ChainNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handle {} {}", self.parent, self.handle, self.qdisc.name())
    }
}

/// Maps a destination set to the PRIO band its sub-chain hangs from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationTarget {
    pub ipset: String,
    pub band: Handle,
}

/// The last allocated qdisc major, zero when nothing has been allocated yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cursor {
    last: u16,
}

impl Cursor {
    pub const fn new() -> Self {
        Self { last: 0 }
    }

    /// The major of the last allocated handle.
    pub const fn last(self) -> u16 {
        self.last
    }

    /// The parent for the next node of a linear chain: the root or the last allocated qdisc.
    pub const fn parent(self) -> Parent {
        Parent::from_major(self.last)
    }

    /// Allocates the next qdisc handle.
    pub fn advance(self) -> Result<(Handle, Self)> {
        let next = self
            .last
            .checked_add(1)
            .ok_or_else(|| Error::InvalidRuleSpec("too many rules, qdisc handles exhausted".into()))?;

        Ok((Handle::qdisc(next), Self { last: next }))
    }
}

/// Rules split by destination set.
#[derive(Debug, Default, PartialEq)]
pub struct Partition<'a> {
    /// Rules without a destination set, in order.
    pub global: Vec<&'a Rule>,
    /// Rules grouped by destination set, groups in order of first appearance.
    pub filtered: Vec<(&'a str, Vec<&'a Rule>)>,
}

pub fn partition(rules: &[Rule]) -> Partition<'_> {
    let mut partition = Partition::default();

    for rule in rules {
        let Some(set) = rule.destination_set() else {
            partition.global.push(rule);
            continue;
        };

        match partition.filtered.iter_mut().find(|(name, _)| *name == set) {
            Some((_, group)) => group.push(rule),
            None => partition.filtered.push((set, vec![rule])),
        }
    }

    partition
}

/// Lays out the global rules as a linear chain starting at the root.
pub fn global_chain(rules: &[&Rule], mut cursor: Cursor) -> Result<(Vec<ChainNode>, Cursor)> {
    let mut nodes = Vec::with_capacity(rules.len());

    for (index, rule) in rules.iter().enumerate() {
        let qdisc = rule.qdisc().map_err(|e| e.context(format_args!("global rule #{index}")))?;

        let parent = cursor.parent();
        let (handle, next) = cursor.advance()?;
        nodes.push(ChainNode { parent, handle, qdisc });
        cursor = next;
    }

    Ok((nodes, cursor))
}

/// The PRIO qdisc and the SFQ leaves of its default bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplexer {
    pub prio: ChainNode,
    pub leaves: Vec<ChainNode>,
}

impl Multiplexer {
    pub fn handle(&self) -> Handle {
        self.prio.handle
    }

    /// The band reserved to the destination set at `index`.
    pub fn band(&self, index: usize) -> Result<Handle> {
        let minor = u16::try_from(index)
            .ok()
            .and_then(|index| index.checked_add(DEFAULT_BANDS + 1))
            .filter(|minor| *minor <= MAX_PRIO_BANDS)
            .ok_or_else(|| Error::InvalidRuleSpec(format!("no PRIO band for destination set #{index}")))?;

        Ok(Handle::class(self.handle().major, minor))
    }
}

/// Appends a PRIO qdisc below the chain ending at `cursor`, with the default bands plus one
/// band per destination set.
pub fn multiplexer(cursor: Cursor, sets: usize, priomap: [u8; 16]) -> Result<(Multiplexer, Cursor)> {
    let bands = u16::try_from(sets)
        .ok()
        .and_then(|sets| sets.checked_add(DEFAULT_BANDS))
        .filter(|bands| *bands <= MAX_PRIO_BANDS)
        .ok_or_else(|| {
            Error::InvalidRuleSpec(format!(
                "{sets} destination sets, at most {} are supported",
                MAX_PRIO_BANDS - DEFAULT_BANDS
            ))
        })?;

    if let Some(band) = priomap.iter().find(|band| u16::from(**band) >= DEFAULT_BANDS) {
        return Err(Error::InvalidRuleSpec(format!("priomap points to non-default band {band}")));
    }

    let parent = cursor.parent();
    let (handle, mut cursor) = cursor.advance()?;
    let prio = ChainNode { parent, handle, qdisc: QdiscKind::Prio { bands, priomap } };

    let mut leaves = Vec::with_capacity(DEFAULT_BANDS as usize);
    for band in 1..=DEFAULT_BANDS {
        let (leaf, next) = cursor.advance()?;
        leaves.push(ChainNode {
            parent: Handle::class(handle.major, band).into(),
            handle: leaf,
            qdisc: QdiscKind::Sfq,
        });
        cursor = next;
    }

    Ok((Multiplexer { prio, leaves }, cursor))
}

/// Chains the rules of every destination set below the band reserved to it.
pub fn filtered_groups(
    multiplexer: &Multiplexer,
    mut cursor: Cursor,
    groups: &[(&str, Vec<&Rule>)],
) -> Result<(Vec<ChainNode>, Vec<ClassificationTarget>, Cursor)> {
    let mut nodes = Vec::new();
    let mut targets = Vec::with_capacity(groups.len());

    for (index, (ipset, rules)) in groups.iter().enumerate() {
        let band = multiplexer.band(index)?;

        let mut parent = Parent::Handle(band);
        for (position, rule) in rules.iter().enumerate() {
            let qdisc = rule
                .qdisc()
                .map_err(|e| e.context(format_args!("rule #{position} of destination set {ipset}")))?;

            let (handle, next) = cursor.advance()?;
            nodes.push(ChainNode { parent, handle, qdisc });
            parent = Parent::Handle(handle);
            cursor = next;
        }

        targets.push(ClassificationTarget { ipset: ipset.to_string(), band });
    }

    Ok((nodes, targets, cursor))
}

/// The complete qdisc tree of a rule set, and where each destination set must be steered.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub global: Vec<ChainNode>,
    pub multiplexer: Multiplexer,
    pub filtered: Vec<ChainNode>,
    pub targets: Vec<ClassificationTarget>,
}

impl Plan {
    /// Plans the tree for `rules`, failing on the first invalid rule.
    pub fn build(rules: &[Rule], priomap: [u8; 16]) -> Result<Self> {
        let partition = partition(rules);

        let (global, cursor) = global_chain(&partition.global, Cursor::new())?;
        let (multiplexer, cursor) = multiplexer(cursor, partition.filtered.len(), priomap)?;
        let (filtered, targets, _) = filtered_groups(&multiplexer, cursor, &partition.filtered)?;

        Ok(Self { global, multiplexer, filtered, targets })
    }

    /// All nodes, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ChainNode> {
        self.global
            .iter()
            .chain(std::iter::once(&self.multiplexer.prio))
            .chain(self.multiplexer.leaves.iter())
            .chain(self.filtered.iter())
    }

    pub fn operations(&self, device: &str) -> Vec<Operation> {
        self.nodes().map(|node| node.operation(device)).collect()
    }
}
