//! Declarative traffic-control rules, as received from the control plane.
//!
//! A rule set is an ordered list of [`Rule`]s. Rules without a destination set apply to all
//! egress traffic of the namespace and are chained in order; rules carrying an ipset only apply to
//! traffic whose destination matches that set.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tc::qdisc::QdiscKind;

/// Network emulation parameters, mapped one-to-one to `tc netem` options.
///
/// Every field is optional: a zero value means the option is not passed to `tc` at all.
/// Times are expressed in microseconds, probabilities and correlations in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Netem {
    /// Fixed delay added to every packet.
    pub delay: u32,
    /// Random variation of `delay`. Ignored without a delay.
    pub jitter: u32,
    pub delay_corr: f32,
    /// Percentage of packets sent immediately, the rest being delayed. Requires a delay.
    pub reorder: f32,
    pub reorder_corr: f32,
    /// Reordering gap, in packets.
    pub gap: u32,
    /// Queue limit, in packets.
    pub limit: u32,
    pub loss: f32,
    pub loss_corr: f32,
    pub duplicate: f32,
    pub duplicate_corr: f32,
    pub corrupt: f32,
    pub corrupt_corr: f32,
}

/// Token bucket parameters for a bandwidth cap, mapped to `tc tbf` options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tbf {
    pub rate: u64,
    /// Bucket size, in bytes.
    pub burst: u32,
    /// Bytes that can be queued waiting for tokens.
    pub limit: u32,
    pub peak_rate: u64,
    /// Size of the peak rate bucket. Only used together with `peak_rate`.
    pub min_burst: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Netem,
    Bandwidth,
    /// Any tag this version doesn't know about.
    #[serde(other)]
    Unknown,
}

/// A single traffic-control rule.
///
/// The payload matching `kind` must be present, the other one is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "type")]
    pub kind: RuleKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netem: Option<Netem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tbf: Option<Tbf>,
    /// Name of the destination ipset this rule is restricted to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipset: Option<String>,
}

impl Netem {
    /// The probability and correlation fields, by name.
    pub fn percentages(&self) -> impl Iterator<Item = (&'static str, f32)> {
        [
            ("delay_corr", self.delay_corr),
            ("reorder", self.reorder),
            ("reorder_corr", self.reorder_corr),
            ("loss", self.loss),
            ("loss_corr", self.loss_corr),
            ("duplicate", self.duplicate),
            ("duplicate_corr", self.duplicate_corr),
            ("corrupt", self.corrupt),
            ("corrupt_corr", self.corrupt_corr),
        ]
        .into_iter()
    }
}

impl Rule {
    pub fn netem(netem: Netem) -> Self {
        Self { kind: RuleKind::Netem, netem: Some(netem), tbf: None, ipset: None }
    }

    pub fn bandwidth(tbf: Tbf) -> Self {
        Self { kind: RuleKind::Bandwidth, netem: None, tbf: Some(tbf), ipset: None }
    }

    /// Restricts the rule to traffic destined to the given ipset.
    pub fn with_ipset(mut self, ipset: impl Into<String>) -> Self {
        self.ipset = Some(ipset.into());
        self
    }

    /// The destination set of this rule, `None` for global rules. An empty name counts as none.
    pub fn destination_set(&self) -> Option<&str> {
        self.ipset.as_deref().filter(|set| !set.is_empty())
    }

    /// Resolves the rule into the qdisc that implements it.
    pub fn qdisc(&self) -> Result<QdiscKind> {
        match self.kind {
            RuleKind::Netem => {
                let netem = self
                    .netem
                    .ok_or_else(|| Error::InvalidRuleSpec("netem is missing for a netem rule".into()))?;

                if let Some((name, value)) = netem.percentages().find(|(_, value)| !value.is_finite()) {
                    return Err(Error::InvalidRuleSpec(format!("netem {name} is {value}")));
                }

                Ok(QdiscKind::Netem(netem))
            }
            RuleKind::Bandwidth => {
                let tbf = self.tbf.ok_or_else(|| {
                    Error::InvalidRuleSpec("tbf is missing for a bandwidth rule".into())
                })?;

                if tbf.rate == 0 {
                    return Err(Error::InvalidRuleSpec("bandwidth rule has no rate".into()));
                }
                if tbf.burst == 0 {
                    return Err(Error::InvalidRuleSpec("bandwidth rule has no burst".into()));
                }

                Ok(QdiscKind::Tbf(tbf))
            }
            RuleKind::Unknown => Err(Error::UnsupportedRuleKind("unknown rule type".into())),
        }
    }
}
