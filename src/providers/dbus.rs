//! D-Bus service provider for dependency injection.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use zbus::Connection;

use crate::{
    app_context::AppState,
    event::EventBus,
    interface::{DBusInterface, OBJECT_PATH, SERVICE_NAME},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Exposes fan commands, fan properties and sensor values on the session bus.
///
/// - **Priority**: 8 (high)
/// - **Critical**: Yes
/// - **Service Name**: `io.github.recomd`
/// - **Object Path**: `/io/github/recomd`
///
/// Creation fails without a session bus; the coordinator then skips the
/// service.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use recomd::providers::DBusServiceProvider;
/// use recomd::event::EventBus;
/// use recomd::app_context::AppState;
///
/// # async fn example(state: Arc<AppState>) -> anyhow::Result<()> {
/// let provider = DBusServiceProvider::new(state, EventBus::new()).await?;
/// # Ok(())
/// # }
/// ```
pub struct DBusServiceProvider {
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
}

impl DBusServiceProvider {
    pub async fn new(state: Arc<AppState>, event_bus: EventBus) -> Result<Self> {
        let connection = Connection::session()
            .await
            .context("Cannot connect to the session bus")?;
        Ok(Self {
            state,
            event_bus,
            connection,
        })
    }
}

#[async_trait]
impl ServiceProvider for DBusServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        let state = self.state.clone();
        let event_bus = self.event_bus.clone();
        let connection = self.connection.clone();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_dbus_service(state, event_bus, connection, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "DBusService"
    }

    fn priority(&self) -> i32 {
        8
    }

    fn is_critical(&self) -> bool {
        true
    }
}

async fn run_dbus_service(
    state: Arc<AppState>,
    event_bus: EventBus,
    connection: Connection,
    cancel_token: CancellationToken,
) -> Result<()> {
    let interface = DBusInterface::new(state, env!("CARGO_PKG_VERSION").to_string(), event_bus);
    connection.object_server().at(OBJECT_PATH, interface).await?;
    connection.request_name(SERVICE_NAME).await?;
    info!("Serving {SERVICE_NAME} at {OBJECT_PATH}");

    cancel_token.cancelled().await;
    info!("D-Bus service cancelled");

    connection.release_name(SERVICE_NAME).await?;
    Ok(())
}
