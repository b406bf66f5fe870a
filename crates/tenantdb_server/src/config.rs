//! Server configuration.

use std::net::SocketAddr;

/// Configuration for the database server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Items per cursor batch.
    pub batch_size: usize,
    /// Open cursors allowed per connection and kind.
    pub max_open_cursors: usize,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl ServerConfig {
    /// Creates a configuration bound to `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            batch_size: 100,
            max_open_cursors: 64,
            max_connections: 256,
        }
    }

    /// Sets the cursor batch size. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Sets the open cursor limit per connection and kind.
    #[must_use]
    pub fn with_max_open_cursors(mut self, max: usize) -> Self {
        self.max_open_cursors = max;
        self
    }

    /// Sets the maximum concurrent connections.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7130)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.bind_addr.port(), 7130);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_batch_size(0)
            .with_max_open_cursors(2)
            .with_max_connections(8);

        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_open_cursors, 2);
        assert_eq!(config.max_connections, 8);
    }
}
