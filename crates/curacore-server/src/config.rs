//! Server configuration.

use std::net::{IpAddr, SocketAddr};

use crate::error::{Result, ServerError};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: SocketAddr,
    /// CORS allowed origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from(([127, 0, 0, 1], 8000)),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Build from the `[server]` config section.
    pub fn from_config(config: &curacore_config::ServerConfig) -> Result<Self> {
        let ip: IpAddr = config.bind.parse().map_err(|e| {
            ServerError::Internal(format!("invalid bind address '{}': {}", config.bind, e))
        })?;
        Ok(Self {
            bind_address: SocketAddr::new(ip, config.port),
            cors_origins: config.cors_origins.clone(),
        })
    }

    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let section = curacore_config::ServerConfig {
            bind: "0.0.0.0".to_string(),
            port: 9000,
            cors_origins: vec!["http://localhost:3000".to_string()],
        };
        let config = ServerConfig::from_config(&section).unwrap();
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:9000");
        assert_eq!(config.cors_origins.len(), 1);
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let section = curacore_config::ServerConfig {
            bind: "not-an-ip".to_string(),
            ..Default::default()
        };
        assert!(ServerConfig::from_config(&section).is_err());
    }
}
