//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use serde_json::json;
use waitlist_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const THROTTLED: i32 = 4003;
    pub const NOT_ACTIVE: i32 = 4004;
    pub const INVALID_DEADLINE: i32 = 4005;
    pub const TICKET_EXPIRED: i32 = 4010;
    pub const WAIT_TIMEOUT: i32 = 4080;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_UNAVAILABLE: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        AppError::InvalidDeadline(_) => {
            ErrorObjectOwned::owned(code::INVALID_DEADLINE, message, None::<()>)
        }
        AppError::NotActive { uuid, status } => ErrorObjectOwned::owned(
            code::NOT_ACTIVE,
            message,
            Some(json!({ "uuid": uuid, "status": status })),
        ),
        AppError::QueueBusy(_) => ErrorObjectOwned::owned(code::CONFLICT, message, None::<()>),
        AppError::TicketExpired { uuid, status } => ErrorObjectOwned::owned(
            code::TICKET_EXPIRED,
            message,
            Some(json!({ "uuid": uuid, "status": status })),
        ),
        AppError::WaitTimeout(timeout_ms) => ErrorObjectOwned::owned(
            code::WAIT_TIMEOUT,
            message,
            Some(json!({ "timeout_ms": timeout_ms })),
        ),
        AppError::StoreUnavailable(_) => {
            ErrorObjectOwned::owned(code::STORE_UNAVAILABLE, message, None::<()>)
        }
        AppError::NotFound(_) => ErrorObjectOwned::owned(code::NOT_FOUND, message, None::<()>),
        AppError::Validation(_) => {
            ErrorObjectOwned::owned(code::VALIDATION_ERROR, message, None::<()>)
        }
        // Illegal transition: the ticket moved on under the caller
        AppError::Domain(_) => ErrorObjectOwned::owned(code::CONFLICT, message, None::<()>),
        AppError::Internal(_) => ErrorObjectOwned::owned(code::INTERNAL_ERROR, message, None::<()>),
    }
}

/// Rate limit rejection
pub fn throttled() -> ErrorObjectOwned {
    ErrorObjectOwned::owned(
        code::THROTTLED,
        "Rate limit exceeded. Please slow down.",
        None::<()>,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use waitlist_core::domain::TicketStatus;

    #[test]
    fn test_ticket_expired_keeps_wire_message() {
        let err = to_rpc_error(AppError::TicketExpired {
            uuid: "t-1".to_string(),
            status: TicketStatus::Deleted,
        });
        assert_eq!(err.code(), code::TICKET_EXPIRED);
        assert_eq!(err.message(), "ticket has expired");
        let data = err.data().map(|d| d.get().to_string()).unwrap();
        assert!(data.contains("deleted"));
    }

    #[test]
    fn test_codes_are_distinct_per_variant() {
        let cases = [
            (AppError::InvalidDeadline("x".into()), code::INVALID_DEADLINE),
            (AppError::QueueBusy("x".into()), code::CONFLICT),
            (AppError::WaitTimeout(10), code::WAIT_TIMEOUT),
            (AppError::StoreUnavailable("x".into()), code::STORE_UNAVAILABLE),
            (AppError::NotFound("x".into()), code::NOT_FOUND),
            (AppError::Validation("x".into()), code::VALIDATION_ERROR),
            (AppError::Internal("x".into()), code::INTERNAL_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(to_rpc_error(err).code(), expected);
        }
    }
}
