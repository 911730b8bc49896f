use crate::dest_trait::Destination;
use crate::registry::DestinationRegistry;
use callscribe_core::{DestinationError, TranscriptEvent, TranscriptMetadata};
use tokio::sync::mpsc;

struct Route {
    destination: Box<dyn Destination>,
    prefix: String,
    include_partials: bool,
}

impl Route {
    fn accepts(&self, event: &TranscriptEvent) -> bool {
        event.transcript.is_final() || self.include_partials
    }
}

/// Fans every transcript from all sessions out to the configured routes.
pub struct DestinationHost {
    registry: DestinationRegistry,
    routes: Vec<Route>,
    transcript_rx: Option<mpsc::UnboundedReceiver<TranscriptEvent>>,
    task_handle: Option<tokio::task::JoinHandle<Vec<Route>>>,
}

impl DestinationHost {
    pub fn new(transcript_rx: mpsc::UnboundedReceiver<TranscriptEvent>) -> Self {
        Self::with_registry(DestinationRegistry::new(), transcript_rx)
    }

    pub fn with_registry(
        registry: DestinationRegistry,
        transcript_rx: mpsc::UnboundedReceiver<TranscriptEvent>,
    ) -> Self {
        Self {
            registry,
            routes: Vec::new(),
            transcript_rx: Some(transcript_rx),
            task_handle: None,
        }
    }

    pub async fn add_route(
        &mut self,
        plugin_name: &str,
        prefix: &str,
        include_partials: bool,
        config: toml::Value,
    ) -> Result<(), DestinationError> {
        let dest = self.registry.open(plugin_name, config).await?;

        self.routes.push(Route {
            destination: dest,
            prefix: prefix.to_string(),
            include_partials,
        });
        Ok(())
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Spawn the fan-out task. Runs until every transcript sender is dropped.
    pub fn start(&mut self) {
        let Some(mut rx) = self.transcript_rx.take() else {
            tracing::warn!("destination host already started");
            return;
        };
        let routes = std::mem::take(&mut self.routes);

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if event.transcript.text().is_empty() {
                    continue;
                }

                for route in routes.iter().filter(|r| r.accepts(&event)) {
                    let metadata = TranscriptMetadata {
                        session_id: event.session_id.clone(),
                        stream_sid: event.stream_sid.clone(),
                        prefix: route.prefix.clone(),
                    };
                    if let Err(e) = route.destination.send_transcript(&event, &metadata).await {
                        tracing::error!(
                            session_id = %event.session_id,
                            destination = %route.destination.name(),
                            "send_transcript failed: {e}"
                        );
                    }
                }
            }
            routes
        });

        self.task_handle = Some(handle);
    }

    /// Wait for the fan-out task to drain, then shut every destination down.
    pub async fn shutdown(&mut self) {
        let Some(handle) = self.task_handle.take() else {
            return;
        };
        let routes = match handle.await {
            Ok(routes) => routes,
            Err(e) => {
                tracing::error!("destination task failed: {e}");
                return;
            }
        };
        for route in routes {
            if let Err(e) = route.destination.shutdown().await {
                tracing::warn!(destination = %route.destination.name(), "shutdown failed: {e}");
            }
        }
    }
}
