//! Client configuration.

use std::time::Duration;
use tenantdb_protocol::{AuthenticateContext, ContextType};

/// Configuration for a client connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Kind of context to authenticate as.
    pub context_type: ContextType,
    /// Identifier of the execution this connection serves.
    pub execution_id: String,
    /// Read timeout for TCP connections. `None` waits forever.
    pub read_timeout: Option<Duration>,
}

impl ClientConfig {
    /// Creates a backend context configuration.
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            context_type: ContextType::Backend,
            execution_id: execution_id.into(),
            read_timeout: None,
        }
    }

    /// Sets the context type.
    #[must_use]
    pub fn with_context_type(mut self, context_type: ContextType) -> Self {
        self.context_type = context_type;
        self
    }

    /// Sets the TCP read timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub(crate) fn authenticate_message(&self) -> AuthenticateContext {
        AuthenticateContext {
            context_type: self.context_type,
            execution_id: self.execution_id.clone(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("default")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.context_type, ContextType::Backend);
        assert_eq!(config.execution_id, "default");
        assert!(config.read_timeout.is_none());
    }

    #[test]
    fn config_builder() {
        let config = ClientConfig::new("job-7")
            .with_context_type(ContextType::Client)
            .with_read_timeout(Duration::from_secs(5));

        assert_eq!(config.context_type, ContextType::Client);
        assert_eq!(config.read_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.authenticate_message().execution_id, "job-7");
    }
}
