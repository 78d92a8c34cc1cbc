//! Application entry point and builder pattern implementation.

use crate::{config::ConfigManager, coordinator::SystemCoordinator};
use anyhow::{Result, anyhow};

/// Runs the daemon: initialize, start services, wait for shutdown.
///
/// # Example
///
/// ```no_run
/// use recomd::application::Application;
/// use recomd::config::ConfigManager;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config_manager = ConfigManager::load(None).await?;
/// Application::builder()
///     .with_config_manager(config_manager)
///     .build()?
///     .run()
///     .await
/// # }
/// ```
pub struct Application {
    coordinator: SystemCoordinator,
    config_manager: ConfigManager,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::default()
    }

    pub async fn run(mut self) -> Result<()> {
        self.coordinator.initialize(self.config_manager).await?;
        self.coordinator.start_all_services().await?;
        self.coordinator.run_main_loop().await
    }
}

#[derive(Default)]
pub struct ApplicationBuilder {
    config_manager: Option<ConfigManager>,
}

impl ApplicationBuilder {
    pub fn with_config_manager(mut self, config_manager: ConfigManager) -> Self {
        self.config_manager = Some(config_manager);
        self
    }

    pub fn build(self) -> Result<Application> {
        let config_manager = self
            .config_manager
            .ok_or_else(|| anyhow!("Configuration manager is required"))?;

        Ok(Application {
            coordinator: SystemCoordinator::new(),
            config_manager,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_context::testing::test_config;
    use std::path::PathBuf;

    #[test]
    fn build_requires_config_manager() {
        let err = Application::builder().build().err().unwrap();
        assert!(err.to_string().contains("Configuration manager"));
    }

    #[test]
    fn build_with_config_manager() {
        let manager = ConfigManager::new(test_config(), PathBuf::from("/tmp/recomd-test.yml"));
        assert!(Application::builder().with_config_manager(manager).build().is_ok());
    }
}
