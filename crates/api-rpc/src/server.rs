//! JSON-RPC 2.0 server over HTTP on localhost

use crate::handler::RpcHandler;
use crate::types::{
    CleanupRequest, ExportRequest, ImportRequest, JobStatusRequest, ListJobsRequest,
    StatsRequest,
};
use datajob_core::error::{AppError, Result};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::{ErrorObjectOwned, Params};
use jsonrpsee::RpcModule;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9600;

pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

fn parse_required<T: DeserializeOwned>(
    params: &Params<'_>,
) -> std::result::Result<T, ErrorObjectOwned> {
    params.parse()
}

/// Absent params parse as `T::default()`
fn parse_or_default<T: DeserializeOwned + Default>(
    params: &Params<'_>,
) -> std::result::Result<T, ErrorObjectOwned> {
    params.parse::<Option<T>>().map(Option::unwrap_or_default)
}

/// Registers `$method` so that its params are parsed and passed to `$call`
macro_rules! register {
    (@with $parse:ident, $module:expr, $handler:expr, $method:literal, $req:ty, $call:ident) => {{
        let handler = $handler.clone();
        $module
            .register_async_method($method, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req = $parse::<$req>(&params)?;
                    handler.$call(req).await
                }
            })
            .map_err(|e| AppError::Internal(format!("Failed to register {}: {}", $method, e)))?;
    }};
    ($module:expr, $handler:expr, $method:literal, $req:ty, $call:ident) => {
        register!(@with parse_required, $module, $handler, $method, $req, $call)
    };
    ($module:expr, $handler:expr, $method:literal, $req:ty, $call:ident, optional) => {
        register!(@with parse_or_default, $module, $handler, $method, $req, $call)
    };
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, handler: Arc<RpcHandler>) -> Self {
        Self { config, handler }
    }

    fn module(&self) -> Result<RpcModule<()>> {
        let mut module = RpcModule::new(());

        register!(module, self.handler, "jobs.status.v1", JobStatusRequest, job_status);
        register!(module, self.handler, "jobs.list.v1", ListJobsRequest, list_jobs);
        register!(module, self.handler, "users.import.v1", ImportRequest, import_users);
        register!(module, self.handler, "users.export.v1", ExportRequest, export_users);
        register!(module, self.handler, "admin.stats.v1", StatsRequest, stats, optional);
        register!(module, self.handler, "admin.cleanup.v1", CleanupRequest, cleanup);

        Ok(module)
    }

    /// Bind and start serving. Port 0 picks a free port; the bound address is returned.
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle)> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to bind RPC server on {}: {}", addr, e)))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| AppError::Internal(format!("RPC server has no local address: {}", e)))?;

        let module = self.module()?;
        let handle = server.start(module);

        info!(addr = %local_addr, "JSON-RPC server started");
        Ok((local_addr, handle))
    }
}
