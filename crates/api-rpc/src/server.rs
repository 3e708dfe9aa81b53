//! JSON-RPC Server
//!
//! Serves the waitlist over JSON-RPC 2.0 on TCP.

use crate::handler::RpcHandler;
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CreateTicketParams, DeleteAllRequest, ListTicketsRequest, StatsRequest, TicketRef,
    WaitTicketRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use waitlist_core::application::WaitlistService;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9530;
const DEFAULT_RATE_LIMIT_BURST: u32 = 200;
const DEFAULT_RATE_LIMIT_RATE: u32 = 100;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port
    pub port: u16,
    pub rate_limit_burst: u32,
    /// Requests per second
    pub rate_limit_rate: u32,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_rate: DEFAULT_RATE_LIMIT_RATE,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, service: Arc<WaitlistService>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit_burst, config.rate_limit_rate);
        Self {
            config,
            handler: Arc::new(RpcHandler::new(service, rate_limiter)),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// # Returns
    /// The bound address and the handle used to stop the server
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("Failed to build server on {}: {}", addr, e))?;
        let local_addr = server
            .local_addr()
            .map_err(|e| format!("Failed to read bound address: {}", e))?;

        let mut module = RpcModule::new(());

        // Register methods
        let handler = self.handler.clone();
        module
            .register_async_method("tickets.create.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: CreateTicketParams = params.parse()?;
                    handler.create(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("tickets.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListTicketsRequest = params.parse()?;
                    handler.list(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("tickets.get.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: TicketRef = params.parse()?;
                    handler.get(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("tickets.wait.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: WaitTicketRequest = params.parse()?;
                    handler.wait(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("tickets.release.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: TicketRef = params.parse()?;
                    handler.release(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("tickets.delete_all.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: DeleteAllRequest = params.parse()?;
                    handler.delete_all(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        // Admin APIs
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    // Params are optional here
                    let req: Option<StatsRequest> = params.parse()?;
                    handler.stats(req.unwrap_or_default()).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!(addr = %local_addr, "JSON-RPC server started");

        let handle = server.start(module);
        Ok((local_addr, handle))
    }
}
