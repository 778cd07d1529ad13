//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::HierarchyService;
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};
use crate::infrastructure::InfraResult;

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,

    pub hierarchy: HierarchyService,
}

impl ServiceContainer {
    /// Create a container with real implementations; the current directory
    /// supplies the local config layer.
    pub fn new() -> InfraResult<Self> {
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let cwd = fs
            .current_dir()
            .map_err(|e| crate::infrastructure::InfraError::io("current directory", e))?;
        let settings = Settings::load(Some(&cwd))?;
        Ok(Self::with_deps(settings, fs))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        let settings = Arc::new(settings);
        let hierarchy = HierarchyService::new(fs.clone(), settings.clone());

        Self {
            settings,
            fs,
            hierarchy,
        }
    }
}
