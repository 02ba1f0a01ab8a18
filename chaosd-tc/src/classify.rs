//! Steering of destination sets into their PRIO bands.
//!
//! The compiler describes one classification chain per destination set and hands them all to a
//! [`PacketFilter`]. The usual backend is the daemon's iptables manager, which owns the base
//! chain and appends a `CLASSIFY` rule per descriptor; [`TcFilterBackend`] does the same job
//! with `tc` filters for namespaces without iptables.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chaosd_exec::{CommandRunner, NetworkNamespace};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::TcConfig;
use crate::error::BoxError;
use crate::tc::client::TcClient;
use crate::tc::handle::Handle;
use crate::tc::operation::Operation;
use crate::tc::plan::ClassificationTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Input,
    Output,
}

const CLASSIFY: &str = "CLASSIFY --set-class ";

/// A classification chain: traffic matching any of `ipsets` in `direction` is classified into
/// the `target` band.
///
/// On the wire `target` is the iptables action, e.g. `"CLASSIFY --set-class 3:4"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub name: String,
    pub direction: Direction,
    pub ipsets: Vec<String>,
    #[serde(with = "classify_action")]
    pub target: Handle,
}

impl ChainDescriptor {
    /// The iptables target of the chain, e.g. `CLASSIFY --set-class 3:4`.
    pub fn target_spec(&self) -> String {
        format!("{CLASSIFY}{}:{}", self.target.major, self.target.minor)
    }
}

/// Parses the class of a `CLASSIFY --set-class <major>:<minor>` action.
pub fn parse_classify_action(action: &str) -> Option<Handle> {
    let (major, minor) = action.strip_prefix(CLASSIFY)?.trim().split_once(':')?;
    Some(Handle::class(major.parse().ok()?, minor.parse().ok()?))
}

mod classify_action {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::{parse_classify_action, CLASSIFY};
    use crate::tc::handle::Handle;

    pub(super) fn serialize<S: Serializer>(target: &Handle, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&format_args!("{CLASSIFY}{}:{}", target.major, target.minor))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Handle, D::Error> {
        let action = String::deserialize(deserializer)?;
        parse_classify_action(&action)
            .ok_or_else(|| de::Error::custom(format!("invalid classify action: {action}")))
    }
}

/// One `<prefix>-<index>` output chain per target, in order.
pub fn compile(targets: &[ClassificationTarget], prefix: &str) -> Vec<ChainDescriptor> {
    targets
        .iter()
        .enumerate()
        .map(|(index, target)| ChainDescriptor {
            name: format!("{prefix}-{index}"),
            direction: Direction::Output,
            ipsets: vec![target.ipset.clone()],
            target: target.band,
        })
        .collect()
}

/// Applies classification chains inside a namespace.
#[async_trait]
pub trait PacketFilter: Send + Sync + fmt::Debug {
    async fn set_chains(
        &self,
        namespace: &NetworkNamespace,
        chains: &[ChainDescriptor],
        cancel: &CancellationToken,
    ) -> Result<(), BoxError>;
}

/// A [`PacketFilter`] realising chains as `tc` `basic` filters on the PRIO qdisc, matching the
/// destination ipsets with the `ipset` ematch.
#[derive(Debug, Clone)]
pub struct TcFilterBackend {
    runner: Arc<dyn CommandRunner>,
    config: TcConfig,
}

impl TcFilterBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, config: TcConfig) -> Self {
        Self { runner, config }
    }

    /// The filters installing `chains`, in order.
    pub fn operations(&self, chains: &[ChainDescriptor]) -> Result<Vec<Operation>, BoxError> {
        let mut operations = Vec::new();

        for chain in chains {
            if chain.direction != Direction::Output {
                return Err(format!("chain {}: tc filters only classify egress traffic", chain.name).into());
            }

            for ipset in &chain.ipsets {
                operations.push(Operation::add_ipset_filter(
                    &self.config.device,
                    chain.target,
                    ipset,
                    chain.target,
                ));
            }
        }

        Ok(operations)
    }
}

#[async_trait]
impl PacketFilter for TcFilterBackend {
    async fn set_chains(
        &self,
        namespace: &NetworkNamespace,
        chains: &[ChainDescriptor],
        cancel: &CancellationToken,
    ) -> Result<(), BoxError> {
        let client = TcClient::new(self.runner.as_ref(), namespace, &self.config, cancel);

        for operation in self.operations(chains)? {
            tracing::info!(%operation, "adding classification filter");
            client.execute(&operation).await?;
        }

        Ok(())
    }
}
