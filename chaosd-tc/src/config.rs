use serde::{Deserialize, Serialize};

use crate::tc::qdisc::DEFAULT_PRIORITY_MAP;

/// Options of the traffic-control compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcConfig {
    /// The device to shape inside the target namespace.
    pub device: String,
    /// The `tc` binary, resolved inside the target namespace.
    pub tc_program: String,
    /// Priority map of the PRIO multiplexer. Entries must point to one of the 3 default bands.
    pub priomap: [u8; 16],
    /// Prefix of the classification chains, suffixed with the index of the destination set.
    pub chain_prefix: String,
}

impl Default for TcConfig {
    fn default() -> Self {
        Self {
            device: "eth0".to_string(),
            tc_program: "tc".to_string(),
            priomap: DEFAULT_PRIORITY_MAP,
            chain_prefix: "TC-TABLES".to_string(),
        }
    }
}

impl TcConfig {
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    pub fn with_tc_program(mut self, tc_program: impl Into<String>) -> Self {
        self.tc_program = tc_program.into();
        self
    }

    pub fn with_priomap(mut self, priomap: [u8; 16]) -> Self {
        self.priomap = priomap;
        self
    }

    pub fn with_chain_prefix(mut self, chain_prefix: impl Into<String>) -> Self {
        self.chain_prefix = chain_prefix.into();
        self
    }
}
