//! RPC Method Handlers
//!
//! Thin adapters from JSON-RPC parameters to `WaitlistService` calls.

use crate::error::{throttled, to_rpc_error};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    CreateTicketParams, DeleteAllRequest, DeleteAllResponse, ListTicketsRequest,
    ListTicketsResponse, StatsRequest, StatsResponse, TicketRecord, TicketRef, WaitTicketRequest,
};
use jsonrpsee::types::ErrorObjectOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use waitlist_core::application::WaitlistService;

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<WaitlistService>,
    rate_limiter: RateLimiter,
    start_time: Instant,
}

impl RpcHandler {
    pub fn new(service: Arc<WaitlistService>, rate_limiter: RateLimiter) -> Self {
        Self {
            service,
            rate_limiter,
            start_time: Instant::now(),
        }
    }

    fn throttle(&self, method: &str) -> Result<(), ErrorObjectOwned> {
        if self.rate_limiter.try_acquire() {
            Ok(())
        } else {
            debug!(method = method, "Request throttled");
            Err(throttled())
        }
    }

    /// tickets.create.v1
    pub async fn create(&self, params: CreateTicketParams) -> Result<TicketRecord, ErrorObjectOwned> {
        self.throttle("tickets.create.v1")?;

        let req = params.into_request().map_err(to_rpc_error)?;
        let ticket = self.service.create(req).await.map_err(to_rpc_error)?;
        Ok(ticket.into())
    }

    /// tickets.list.v1
    pub async fn list(
        &self,
        params: ListTicketsRequest,
    ) -> Result<ListTicketsResponse, ErrorObjectOwned> {
        self.throttle("tickets.list.v1")?;

        let tickets = self.service.list(&params.resource).await;
        Ok(ListTicketsResponse {
            resource: params.resource,
            tickets: tickets.into_iter().map(TicketRecord::from).collect(),
        })
    }

    /// tickets.get.v1
    pub async fn get(&self, params: TicketRef) -> Result<TicketRecord, ErrorObjectOwned> {
        self.throttle("tickets.get.v1")?;

        let ticket = self.service.get(&params.uuid).await.map_err(to_rpc_error)?;
        Ok(ticket.into())
    }

    /// tickets.wait.v1
    pub async fn wait(&self, params: WaitTicketRequest) -> Result<TicketRecord, ErrorObjectOwned> {
        self.throttle("tickets.wait.v1")?;

        let timeout = params.timeout_ms.map(Duration::from_millis);
        let ticket = self
            .service
            .wait(&params.uuid, timeout)
            .await
            .map_err(to_rpc_error)?;
        Ok(ticket.into())
    }

    /// tickets.release.v1
    pub async fn release(&self, params: TicketRef) -> Result<TicketRecord, ErrorObjectOwned> {
        self.throttle("tickets.release.v1")?;

        let ticket = self
            .service
            .release(&params.uuid)
            .await
            .map_err(to_rpc_error)?;
        Ok(ticket.into())
    }

    /// tickets.delete_all.v1
    pub async fn delete_all(
        &self,
        params: DeleteAllRequest,
    ) -> Result<DeleteAllResponse, ErrorObjectOwned> {
        self.throttle("tickets.delete_all.v1")?;

        let deleted = self
            .service
            .delete_all(&params.resource, params.force)
            .await
            .map_err(to_rpc_error)?;
        Ok(DeleteAllResponse {
            resource: params.resource,
            deleted,
            forced: params.force,
        })
    }

    /// admin.stats.v1 (never throttled)
    pub async fn stats(&self, _params: StatsRequest) -> Result<StatsResponse, ErrorObjectOwned> {
        Ok(StatsResponse {
            waitlist: self.service.stats().await,
            rate_limit_tokens: self.rate_limiter.remaining(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        })
    }
}
