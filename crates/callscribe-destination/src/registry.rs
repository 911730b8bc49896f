use crate::dest_trait::Destination;
use crate::file_dest::FileDestination;
use crate::log_dest::LogDestination;
use callscribe_core::DestinationError;
use std::collections::HashMap;

type Factory = fn() -> Box<dyn Destination>;

/// Destination plugins by the name used in `[[routes]] plugin = "..."`.
pub struct DestinationRegistry {
    factories: HashMap<String, Factory>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("file", || Box::new(FileDestination::new()));
        registry.register("log", || Box::new(LogDestination::new()));
        registry
    }

    pub fn register(&mut self, name: &str, factory: Factory) {
        self.factories.insert(name.to_string(), factory);
    }

    /// Create the named destination and initialize it with the route's
    /// merged config. A destination that reports unhealthy after
    /// initialization is rejected.
    pub async fn open(
        &self,
        name: &str,
        config: toml::Value,
    ) -> Result<Box<dyn Destination>, DestinationError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| DestinationError::NotFound(name.to_string()))?;
        let mut dest = factory();
        dest.initialize(config).await?;
        if !dest.is_healthy() {
            return Err(DestinationError::InitializationFailed(format!(
                "destination '{name}' is not ready after initialization"
            )));
        }
        Ok(dest)
    }
}

impl Default for DestinationRegistry {
    fn default() -> Self {
        Self::new()
    }
}
