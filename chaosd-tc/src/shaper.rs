use std::sync::Arc;

use chaosd_exec::{CommandRunner, NetworkNamespace};
use tokio_util::sync::CancellationToken;
use tracing::Instrument as _;

use crate::classify::{self, PacketFilter};
use crate::config::TcConfig;
use crate::error::{Error, Result};
use crate::rule::Rule;
use crate::tc::client::TcClient;
use crate::tc::plan::Plan;

/// Applies traffic-control rule sets to network namespaces.
///
/// The shaper holds no per-namespace state and can serve concurrent requests for different
/// namespaces. Requests for the same namespace must be serialized by the caller, otherwise the
/// qdisc trees interleave.
#[derive(Debug, Clone)]
pub struct TrafficShaper {
    runner: Arc<dyn CommandRunner>,
    filter: Arc<dyn PacketFilter>,
    config: TcConfig,
}

impl TrafficShaper {
    pub fn new(runner: Arc<dyn CommandRunner>, filter: Arc<dyn PacketFilter>) -> Self {
        Self { runner, filter, config: TcConfig::default() }
    }

    pub fn with_config(mut self, config: TcConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &TcConfig {
        &self.config
    }

    pub fn client<'a>(
        &'a self,
        namespace: &'a NetworkNamespace,
        cancel: &'a CancellationToken,
    ) -> TcClient<'a> {
        TcClient::new(self.runner.as_ref(), namespace, &self.config, cancel)
    }

    /// Removes every qdisc of the device in `namespace`.
    pub async fn flush(&self, cancel: &CancellationToken, namespace: &NetworkNamespace) -> Result<()> {
        self.client(namespace, cancel).flush().await
    }

    /// Replaces the traffic-control configuration of `namespace` with `rules`.
    ///
    /// The rule set is validated before anything is changed. After that the device is flushed
    /// and the tree is created top-down; the first failure is returned as is, leaving the part
    /// of the tree created so far in place until the next flush.
    pub async fn set_traffic_rules(
        &self,
        cancel: &CancellationToken,
        namespace: &NetworkNamespace,
        rules: &[Rule],
    ) -> Result<()> {
        let span = tracing::info_span!("set_traffic_rules", %namespace, rules = rules.len());

        async move {
            let plan = Plan::build(rules, self.config.priomap)?;
            let client = self.client(namespace, cancel);

            client.flush().await?;

            for node in plan.nodes() {
                if let Err(e) = client.add_node(node).await {
                    tracing::error!(?e, %node, "failed to add qdisc");
                    return Err(e);
                }
            }

            let chains = classify::compile(&plan.targets, &self.config.chain_prefix);

            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            tracing::debug!(chains = chains.len(), "setting classification chains");
            if let Err(e) = self.filter.set_chains(namespace, &chains, cancel).await {
                tracing::error!(?e, "failed to set classification chains");
                return Err(Error::ClassificationApplyFailed(e));
            }

            Ok(())
        }
        .instrument(span)
        .await
    }
}
