//! System coordinator for managing service lifecycle and dependency injection.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use tokio::{sync::broadcast::error::RecvError, task::JoinHandle};

use crate::{
    app_context::AppState,
    config::ConfigManager,
    event::{Event, EventBus},
    providers::{
        AppStateProvider, AsyncProvider, DBusServiceProvider, ServiceProvider,
        StateReporterServiceProvider,
    },
    task_manager::TaskManager,
};

/// Owns the hub state, the services around it and the main event loop.
///
/// Startup registers every entity with the hub (the first registration
/// connects and starts the poller) and runs one immediate poll so the
/// host sees values before the first scan interval elapses.
pub struct SystemCoordinator {
    task_manager: TaskManager,
    event_bus: EventBus,
    shared_state: Option<Arc<AppState>>,
    service_providers: Vec<Box<dyn ServiceProvider>>,
    /// On-demand poll running beside the main loop.
    refresh: Option<JoinHandle<()>>,
}

impl Default for SystemCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCoordinator {
    pub fn new() -> Self {
        Self {
            task_manager: TaskManager::new(),
            event_bus: EventBus::new(),
            shared_state: None,
            service_providers: Vec::new(),
            refresh: None,
        }
    }

    pub async fn initialize(&mut self, config_manager: ConfigManager) -> Result<()> {
        info!(
            "Initializing SystemCoordinator from {}",
            config_manager.path().display()
        );

        let state = AppStateProvider::new(config_manager, self.event_bus.clone())
            .provide()
            .await
            .context("Failed to initialize application state")?;

        self.initialize_with_state(state).await
    }

    /// Registers entities, runs the first poll and prepares services.
    pub async fn initialize_with_state(&mut self, state: Arc<AppState>) -> Result<()> {
        self.shared_state = Some(state.clone());

        state
            .attach_entities()
            .await
            .context("Failed to register entities with the hub")?;
        state.hub.poll_all_entities().await;

        self.register_service_providers(state)
            .await
            .context("Failed to register service providers")?;

        info!("SystemCoordinator initialization completed");
        Ok(())
    }

    async fn register_service_providers(&mut self, state: Arc<AppState>) -> Result<()> {
        let mut providers: Vec<Box<dyn ServiceProvider>> = vec![Box::new(
            StateReporterServiceProvider::new(self.event_bus.clone()),
        )];

        if state.config().await.dbus {
            match DBusServiceProvider::new(state.clone(), self.event_bus.clone()).await {
                Ok(provider) => providers.push(Box::new(provider)),
                Err(e) => warn!("{e:#}, skipping D-Bus service"),
            }
        }

        providers.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        self.service_providers = providers;

        info!(
            "Registered {} service providers in priority order",
            self.service_providers.len()
        );
        Ok(())
    }

    /// Starts services in priority order. Only critical failures abort.
    pub async fn start_all_services(&mut self) -> Result<()> {
        for provider in &self.service_providers {
            match provider.start(&mut self.task_manager).await {
                Ok(()) => info!(
                    "Service '{}' started (priority: {}, critical: {})",
                    provider.name(),
                    provider.priority(),
                    provider.is_critical()
                ),
                Err(e) if provider.is_critical() => {
                    return Err(e).with_context(|| {
                        format!("Critical service '{}' failed to start", provider.name())
                    });
                }
                Err(e) => warn!("Non-critical service '{}' failed to start: {e:#}", provider.name()),
            }
        }
        Ok(())
    }

    pub async fn run_main_loop(&mut self) -> Result<()> {
        let mut event_rx = self.event_bus.subscribe();
        info!("Starting main event loop");

        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("Failed to listen for shutdown signal")?;
                    info!("Received Ctrl+C, initiating graceful shutdown...");
                    break;
                }
                event = event_rx.recv() => {
                    if !self.handle_event(event).await? {
                        break;
                    }
                }
            }
        }

        self.shutdown().await;
        info!("Main event loop terminated");
        Ok(())
    }

    /// Returns `false` once the loop should stop.
    async fn handle_event(&mut self, event: Result<Event, RecvError>) -> Result<bool> {
        match event {
            Ok(Event::RefreshRequested) => self.spawn_refresh(),
            Ok(Event::SystemShutdown) => {
                info!("Processing SystemShutdown event");
                return Ok(false);
            }
            Ok(Event::StateChanged(_)) => {}
            Err(RecvError::Lagged(n)) => warn!("Event bus lagged by {n} messages"),
            Err(RecvError::Closed) => bail!("Event bus channel closed unexpectedly"),
        }
        Ok(true)
    }

    /// Polls in the background so the loop keeps watching for signals.
    /// A request arriving while a refresh runs is folded into it.
    fn spawn_refresh(&mut self) {
        let Some(state) = &self.shared_state else {
            return;
        };
        if self.refresh.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Refresh of '{}' already running", state.hub.name());
            return;
        }

        info!("Polling '{}' on request", state.hub.name());
        let hub = state.hub.clone();
        self.refresh = Some(tokio::spawn(async move {
            hub.poll_all_entities().await;
        }));
    }

    /// Stops services, then the poller, then closes the connection.
    async fn shutdown(&mut self) {
        info!("Initiating graceful shutdown...");

        if let Some(refresh) = self.refresh.take() {
            refresh.abort();
        }

        if let Err(e) = self.task_manager.shutdown_all().await {
            log::error!("Error during task shutdown: {e:#}");
        }
        if let Some(state) = &self.shared_state {
            state.hub.shutdown().await;
        }

        info!("Shutdown complete");
    }

    pub const fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn running_services(&self) -> Vec<&'static str> {
        self.service_providers.iter().map(|p| p.name()).collect()
    }
}
