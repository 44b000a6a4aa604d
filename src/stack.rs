// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stack session facade.
//!
//! A [`Stack`] binds a project name, a stack name (the node's hostname), a state
//! backend and a [`Program`]. [`get_stack`] prepares the stack for a configuration:
//! pinned provider plugins plus the Tailscale API key (secret) and tailnet (plain) as
//! stack configuration. Every operation loads state, runs, and saves state again.

use crate::config::Config;
use crate::constants::{
    CONFIG_TAILSCALE_API_KEY, CONFIG_TAILSCALE_TAILNET, KUBERNETES_PLUGIN_VERSION,
    OUTPUT_DNS_CONFIGURED, PACKAGE_KUBERNETES, PACKAGE_TAILSCALE, PROJECT_NAME,
    TAILSCALE_PLUGIN_VERSION,
};
use crate::engine::{
    self, ChangeSummary, FileBackend, KubernetesProvider, Plan, Plugins, Program, Providers,
    StackState, UpResult,
};
use crate::program::TskProgram;
use crate::tailscale::{TailscaleClient, TailscaleProvider};
use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

/// A stack configuration value.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigValue {
    pub value: String,
    /// Secret values are never logged or written to state
    pub secret: bool,
}

impl ConfigValue {
    #[must_use]
    pub fn plain(value: &str) -> Self {
        Self {
            value: value.to_string(),
            secret: false,
        }
    }

    #[must_use]
    pub fn secret(value: &str) -> Self {
        Self {
            value: value.to_string(),
            secret: true,
        }
    }
}

impl std::fmt::Debug for ConfigValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let value = if self.secret { "[secret]" } else { &self.value };
        f.debug_struct("ConfigValue")
            .field("value", &value)
            .field("secret", &self.secret)
            .finish()
    }
}

impl UpResult {
    /// Whether the tailnet DNS wiring completed during this update.
    #[must_use]
    pub fn dns_configured(&self) -> bool {
        self.outputs
            .get(OUTPUT_DNS_CONFIGURED)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// A named stack of one project.
pub struct Stack {
    project: String,
    name: String,
    backend: FileBackend,
    program: Arc<dyn Program>,
    plugins: Plugins,
    config: BTreeMap<String, ConfigValue>,
    providers: Option<Providers>,
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("project", &self.project)
            .field("name", &self.name)
            .field("backend", &self.backend)
            .field("plugins", &self.plugins)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Stack {
    /// Select the stack if it exists in the backend, create it otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend URL is not `file://` or existing state is unreadable.
    pub async fn upsert_inline(
        stack_name: &str,
        project: &str,
        backend_url: &Url,
        program: Arc<dyn Program>,
    ) -> Result<Self> {
        let backend = FileBackend::from_url(backend_url)?;

        if backend.load(project, stack_name).await?.is_some() {
            debug!(project = %project, stack = %stack_name, "Selected existing stack");
        } else {
            backend.save(&StackState::new(project, stack_name)).await?;
            info!(project = %project, stack = %stack_name, "Created stack");
        }

        Ok(Self {
            project: project.to_string(),
            name: stack_name.to_string(),
            backend,
            program,
            plugins: Plugins::default(),
            config: BTreeMap::new(),
            providers: None,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    #[must_use]
    pub fn plugins(&self) -> &Plugins {
        &self.plugins
    }

    /// Install a provider plugin at a pinned version.
    ///
    /// # Errors
    ///
    /// Returns an error for plugins tsk has no provider for.
    pub fn install_plugin(&mut self, package: &str, version: &str) -> Result<()> {
        self.plugins.install(package, version)
    }

    /// Set a stack configuration value.
    pub fn set_config(&mut self, key: &str, value: ConfigValue) {
        debug!(key = %key, value = ?value, "Set stack config");
        self.config.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(|v| v.value.as_str())
    }

    /// Run operations against the given providers instead of live ones.
    #[must_use]
    pub fn with_providers(mut self, providers: Providers) -> Self {
        self.providers = Some(providers);
        self
    }

    fn required_config(&self, key: &str) -> Result<&str> {
        self.config_value(key)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("stack config '{key}' is not set"))
    }

    async fn providers(&self) -> Result<Providers> {
        if let Some(providers) = &self.providers {
            return Ok(providers.clone());
        }

        let api_key = self.required_config(CONFIG_TAILSCALE_API_KEY)?;
        let tailnet = self.required_config(CONFIG_TAILSCALE_TAILNET)?;
        let tailscale = Arc::new(TailscaleProvider::new(TailscaleClient::new(api_key, tailnet)?));

        debug!("Initializing Kubernetes client");
        let client = kube::Client::try_default()
            .await
            .context("couldn't create Kubernetes client")?;

        Ok(Providers {
            kubernetes: Arc::new(KubernetesProvider::new(client)),
            tailscale: tailscale.clone(),
            registry: tailscale,
        })
    }

    async fn load_state(&self) -> Result<StackState> {
        Ok(self
            .backend
            .load(&self.project, &self.name)
            .await?
            .unwrap_or_else(|| StackState::new(&self.project, &self.name)))
    }

    /// Save `state`, then surface `outcome`. State is saved even when the operation failed.
    async fn save_then<T>(&self, state: &StackState, outcome: Result<T>) -> Result<T> {
        let saved = self.backend.save(state).await;
        let value = outcome?;
        saved?;
        Ok(value)
    }

    /// Realize the program and return its outputs.
    ///
    /// State is saved after every realized resource, so dropping the returned future
    /// part way through still leaves everything that was created recorded.
    ///
    /// # Errors
    ///
    /// Returns the first program, provider or backend error.
    pub async fn up(&self) -> Result<UpResult> {
        let providers = self.providers().await?;
        let mut state = self.load_state().await?;
        info!(stack = %self.name, "Updating stack");

        let outcome = engine::up(
            &mut state,
            self.program.as_ref(),
            &providers,
            &self.plugins,
            Some(&self.backend),
        )
        .await;
        self.save_then(&state, outcome).await
    }

    /// Compute what [`Stack::up`] would do without changing anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the program or the device query fails.
    pub async fn preview(&self, verbose: bool) -> Result<Plan> {
        let providers = self.providers().await?;
        let state = self.load_state().await?;
        info!(stack = %self.name, verbose, "Previewing stack");

        engine::preview(
            self.program.as_ref(),
            &state,
            providers.registry.clone(),
            &self.plugins,
            verbose,
        )
        .await
    }

    /// Reconcile recorded state with live state.
    ///
    /// # Errors
    ///
    /// Returns the first provider or backend error.
    pub async fn refresh(&self) -> Result<ChangeSummary> {
        let providers = self.providers().await?;
        let mut state = self.load_state().await?;
        info!(stack = %self.name, "Refreshing stack");

        let outcome = engine::refresh(&mut state, &providers, &self.plugins).await;
        self.save_then(&state, outcome).await
    }

    /// Delete every resource of the stack.
    ///
    /// # Errors
    ///
    /// Returns the first provider or backend error.
    pub async fn destroy(&self) -> Result<ChangeSummary> {
        let providers = self.providers().await?;
        let mut state = self.load_state().await?;
        info!(stack = %self.name, "Destroying stack");

        let outcome =
            engine::destroy(&mut state, &providers, &self.plugins, Some(&self.backend)).await;
        self.save_then(&state, outcome).await
    }

    /// Recorded state, for inspection.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read.
    pub async fn export(&self) -> Result<StackState> {
        self.load_state().await
    }
}

/// Prepare the stack for `config`: one stack per hostname, both plugins installed,
/// and the Tailscale credentials set as stack configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened.
pub async fn get_stack(config: &Config) -> Result<Stack> {
    let program = Arc::new(TskProgram::new(config.clone()));
    let mut stack = Stack::upsert_inline(
        &config.tailscale.hostname,
        PROJECT_NAME,
        &config.backend_url,
        program,
    )
    .await?;

    stack.install_plugin(PACKAGE_KUBERNETES, KUBERNETES_PLUGIN_VERSION)?;
    stack.install_plugin(PACKAGE_TAILSCALE, TAILSCALE_PLUGIN_VERSION)?;

    stack.set_config(
        CONFIG_TAILSCALE_API_KEY,
        ConfigValue::secret(&config.tailscale.api_key),
    );
    stack.set_config(
        CONFIG_TAILSCALE_TAILNET,
        ConfigValue::plain(&config.tailscale.tailnet),
    );

    Ok(stack)
}
