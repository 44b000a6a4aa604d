// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! The tsk stack program: the node's Kubernetes objects, then its tailnet DNS wiring.

use crate::config::Config;
use crate::constants::OUTPUT_DNS_CONFIGURED;
use crate::dns::reconcile_dns;
use crate::engine::{Program, StackContext};
use crate::resources::declare_node;
use anyhow::Result;
use serde_json::Value;

/// Program run by every stack operation for one configuration.
#[derive(Debug, Clone)]
pub struct TskProgram {
    config: Config,
}

impl TskProgram {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[async_trait::async_trait]
impl Program for TskProgram {
    async fn run(&self, ctx: &mut dyn StackContext) -> Result<()> {
        let node = declare_node(ctx, &self.config).await?;
        let dns_configured = reconcile_dns(ctx, &self.config, &node.deployment).await?;
        ctx.export(OUTPUT_DNS_CONFIGURED, Value::Bool(dns_configured));
        Ok(())
    }
}
