use anyhow::Result;
use async_trait::async_trait;

use crate::task_manager::TaskManager;

/// Builds a component that needs async initialization.
///
/// # Example
///
/// ```no_run
/// use recomd::providers::traits::AsyncProvider;
///
/// struct HostProvider;
///
/// #[async_trait::async_trait]
/// impl AsyncProvider<String> for HostProvider {
///     async fn provide(&self) -> anyhow::Result<String> {
///         Ok("10.0.0.5".to_string())
///     }
/// }
/// ```
#[async_trait]
pub trait AsyncProvider<T> {
    async fn provide(&self) -> Result<T>;
}

/// A long-running service started through the [`TaskManager`].
///
/// Higher priorities start first. A critical service that fails to start
/// aborts daemon startup; other failures are logged and skipped.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn start(&self, task_manager: &mut TaskManager) -> Result<()>;

    fn name(&self) -> &'static str;

    fn priority(&self) -> i32 {
        0
    }

    fn is_critical(&self) -> bool {
        false
    }
}
