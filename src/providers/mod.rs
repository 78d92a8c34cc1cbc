//! Dependency injection providers for service management.

pub mod app_state;
pub mod dbus;
pub mod state_reporter;
pub mod traits;

pub use app_state::AppStateProvider;
pub use dbus::DBusServiceProvider;
pub use state_reporter::StateReporterServiceProvider;
pub use traits::{AsyncProvider, ServiceProvider};
