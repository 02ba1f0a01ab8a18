//! Execution of `tc` operations inside a target namespace.

use chaosd_exec::{command, CommandRunner, NetworkNamespace, Output};
use tokio_util::sync::CancellationToken;

use crate::config::TcConfig;
use crate::error::{Error, Result};
use crate::rule::Rule;

use super::flush::is_nothing_to_delete;
use super::handle::{Handle, Parent};
use super::operation::{Operation, QdiscRequest, Verb};
use super::plan::ChainNode;

/// Runs `tc` operations on the configured device of one namespace.
///
/// Every operation checks the cancellation token first, so a cancelled request never starts a
/// new operation.
#[derive(Debug, Clone, Copy)]
pub struct TcClient<'a> {
    runner: &'a dyn CommandRunner,
    namespace: &'a NetworkNamespace,
    config: &'a TcConfig,
    cancel: &'a CancellationToken,
}

impl<'a> TcClient<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        namespace: &'a NetworkNamespace,
        config: &'a TcConfig,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { runner, namespace, config, cancel }
    }

    pub fn device(&self) -> &str {
        &self.config.device
    }

    pub async fn execute(&self, operation: &Operation) -> Result<Output> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!(%operation, namespace = %self.namespace, "executing tc operation");

        let args = operation.to_args();
        match self.runner.run(self.namespace, &self.config.tc_program, &args, self.cancel).await {
            Ok(output) => Ok(output),
            Err(command::Error::NonZero(output)) => {
                Err(Error::CommandExecutionFailed { operation: operation.to_string(), output })
            }
            Err(command::Error::Cancelled) => Err(Error::Cancelled),
            Err(source) => Err(Error::Exec { operation: operation.to_string(), source }),
        }
    }

    /// Adds the qdisc implementing `rule` at `parent` with handle `handle`.
    pub async fn add_qdisc(&self, parent: Parent, handle: Handle, rule: &Rule) -> Result<()> {
        let qdisc = rule.qdisc()?;
        tracing::info!(%parent, %handle, kind = qdisc.name(), "adding qdisc");

        self.execute(&Operation::add_qdisc(self.device(), parent, handle, &qdisc)).await?;
        Ok(())
    }

    /// Adds or deletes a qdisc described by an already-encoded request.
    pub async fn apply_request(&self, verb: Verb, request: &QdiscRequest) -> Result<()> {
        let operation = Operation::from_request(verb, self.device(), request)?;
        tracing::info!(%operation, "applying qdisc request");

        self.execute(&operation).await?;
        Ok(())
    }

    pub async fn add_node(&self, node: &ChainNode) -> Result<()> {
        tracing::info!(%node, "adding qdisc");

        self.execute(&node.operation(self.device())).await?;
        Ok(())
    }

    /// Removes the root qdisc and everything below it. A device without a root qdisc is
    /// already flushed.
    pub async fn flush(&self) -> Result<()> {
        match self.execute(&Operation::del_root(self.device())).await {
            Ok(_) => Ok(()),
            Err(Error::CommandExecutionFailed { output, .. })
                if is_nothing_to_delete(&output.combined()) =>
            {
                tracing::debug!(namespace = %self.namespace, "no root qdisc to flush");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
