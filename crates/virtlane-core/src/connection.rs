//! Lazily established, cached hypervisor connections.
//!
//! A [`ConnectionManager`] owns two cache slots: the primary read/write
//! connection and a read-only connection used for network lease
//! introspection. Each slot is filled at most once; concurrent callers racing
//! on an empty slot share a single establishment attempt. A failed attempt
//! leaves the slot empty and is reported as [`CoreError::Connection`]; it is
//! never retried here.

use crate::config::DriverConfig;
use crate::error::{CoreError, Result};
use crate::machine::MachineId;
use std::sync::Arc;
use tokio::sync::OnceCell;
use virtlane_hypervisor::{ConnectParams, Connection, Connector, Domain};

/// Caches the primary and read-only hypervisor connections of one driver.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    primary_params: ConnectParams,
    read_only_params: ConnectParams,
    primary: OnceCell<Arc<dyn Connection>>,
    read_only: OnceCell<Arc<dyn Connection>>,
}

impl ConnectionManager {
    /// Create a manager; no connection is opened until first use.
    pub fn new(connector: Arc<dyn Connector>, config: &DriverConfig) -> Self {
        let primary_params = ConnectParams::new(&config.uri)
            .with_credentials(config.username.clone(), config.password.clone());
        let read_only_params = ConnectParams::new(&config.system_uri)
            .with_credentials(config.username.clone(), config.password.clone())
            .read_only();

        Self {
            connector,
            primary_params,
            read_only_params,
            primary: OnceCell::new(),
            read_only: OnceCell::new(),
        }
    }

    /// The primary (read/write) connection.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Connection`] if the connection cannot be established.
    pub async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.get_or_connect(&self.primary, &self.primary_params).await
    }

    /// The read-only connection used for network and lease enumeration.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Connection`] if the connection cannot be established.
    pub async fn read_only_connection(&self) -> Result<Arc<dyn Connection>> {
        self.get_or_connect(&self.read_only, &self.read_only_params).await
    }

    /// Resolve a domain by machine id through the primary connection.
    ///
    /// Returns `Ok(None)` when the hypervisor has no such domain; every other
    /// lookup failure is passed through unchanged.
    pub async fn lookup_domain(&self, id: &MachineId) -> Result<Option<Box<dyn Domain>>> {
        let conn = self.connection().await?;
        match conn.lookup_domain(id.as_str()).await {
            Ok(domain) => Ok(Some(domain)),
            Err(e) if e.is_no_domain() => {
                tracing::debug!(machine_id = %id, "Domain not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get_or_connect(
        &self,
        cell: &OnceCell<Arc<dyn Connection>>,
        params: &ConnectParams,
    ) -> Result<Arc<dyn Connection>> {
        let conn = cell
            .get_or_try_init(|| async {
                let start = std::time::Instant::now();
                tracing::debug!(
                    uri = %params.uri,
                    read_only = params.read_only,
                    "Connecting to hypervisor"
                );
                let conn = self.connector.connect(params).await.map_err(|source| {
                    tracing::error!(
                        uri = %params.uri,
                        error = %source,
                        "Hypervisor connection failed"
                    );
                    CoreError::Connection {
                        uri: params.uri.clone(),
                        source,
                    }
                })?;
                tracing::info!(
                    uri = %params.uri,
                    read_only = params.read_only,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Connected to hypervisor"
                );
                Ok::<_, CoreError>(conn)
            })
            .await?;
        Ok(Arc::clone(conn))
    }
}
