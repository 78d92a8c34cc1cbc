use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::broadcast::{Receiver, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::{
    entities::StateUpdate,
    event::{Event, EventBus},
    providers::traits::ServiceProvider,
    task_manager::TaskManager,
};

/// Logs every rendered entity state as a JSON line.
///
/// - **Priority**: 3 (low)
/// - **Critical**: No
pub struct StateReporterServiceProvider {
    event_bus: EventBus,
}

impl StateReporterServiceProvider {
    pub fn new(event_bus: EventBus) -> Self {
        Self { event_bus }
    }
}

#[async_trait]
impl ServiceProvider for StateReporterServiceProvider {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()> {
        // Subscribe before spawning so nothing published meanwhile is lost.
        let events = self.event_bus.subscribe();

        task_manager
            .spawn_task(self.name().to_string(), |cancel_token| async move {
                run_state_reporter(events, cancel_token).await
            })
            .await
    }

    fn name(&self) -> &'static str {
        "StateReporterService"
    }

    fn priority(&self) -> i32 {
        3
    }
}

async fn run_state_reporter(mut events: Receiver<Event>, cancel_token: CancellationToken) -> Result<()> {
    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("State reporter cancelled");
                break;
            }
            event = events.recv() => match event {
                Ok(Event::StateChanged(update)) => match render_line(&update) {
                    Ok(line) => info!("{line}"),
                    Err(e) => warn!("{e:#}"),
                },
                Ok(_) => {}
                Err(RecvError::Lagged(n)) => warn!("State reporter skipped {n} updates"),
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}

fn render_line(update: &StateUpdate) -> Result<String> {
    serde_json::to_string(update)
        .with_context(|| format!("Cannot serialize state of '{}'", update.entity_id))
}
