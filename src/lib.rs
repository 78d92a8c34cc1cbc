//! # recomd
//!
//! A Linux daemon that monitors and controls REC Indovent ventilation
//! units over Modbus/TCP.
//!
//! ## Layers
//!
//! - [`codec`] decodes raw registers into engineering values
//! - [`transport`] owns the single Modbus/TCP connection
//! - [`retry`] serializes calls and reconnects once on socket failures
//! - [`hub`] keeps entity state, polls the unit and executes fan commands
//! - [`entities`] render hub state for the host and forward user commands
//!
//! Around them the daemon wires a [`SystemCoordinator`](coordinator::SystemCoordinator),
//! an [`EventBus`](event::EventBus) and a D-Bus interface.
//!
//! ## Example
//!
//! ```no_run
//! use recomd::{application::Application, config::ConfigManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config_manager = ConfigManager::load(None).await?;
//!     Application::builder()
//!         .with_config_manager(config_manager)
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```

pub mod app_context;
pub mod application;
pub mod cli;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod descriptors;
pub mod entities;
pub mod event;
pub mod hub;
pub mod interface;
pub mod percentage;
pub mod protocol;
pub mod providers;
pub mod retry;
pub mod speed_mode;
pub mod task_manager;
pub mod transport;
