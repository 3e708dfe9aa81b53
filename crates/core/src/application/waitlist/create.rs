// Create Ticket Use Case - request and validation

use crate::application::constants::{MAX_ACTION_LEN, MAX_KEY_PART_LEN};
use crate::domain::QueueKey;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Create-ticket request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketRequest {
    pub resource: String,
    pub scope: String,
    pub id: String,

    /// Absolute deadline (epoch ms)
    pub expires_at: i64,

    #[serde(default)]
    pub action: Option<String>,

    #[serde(default)]
    pub extra: serde_json::Value,
}

impl CreateTicketRequest {
    pub fn new(
        resource: impl Into<String>,
        scope: impl Into<String>,
        id: impl Into<String>,
        expires_at: i64,
    ) -> Self {
        Self {
            resource: resource.into(),
            scope: scope.into(),
            id: id.into(),
            expires_at,
            action: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn key(&self) -> QueueKey {
        QueueKey::new(&self.resource, &self.scope, &self.id)
    }
}

/// Validate request fields (deadline is checked against the clock separately)
pub fn validate_request(req: &CreateTicketRequest) -> Result<()> {
    for (field, value) in [
        ("resource", &req.resource),
        ("scope", &req.scope),
        ("id", &req.id),
    ] {
        if value.trim().is_empty() {
            return Err(AppError::Validation(format!("{} cannot be empty", field)));
        }
        if value.len() > MAX_KEY_PART_LEN {
            return Err(AppError::Validation(format!(
                "{} too long (max {} chars)",
                field, MAX_KEY_PART_LEN
            )));
        }
    }

    if let Some(action) = &req.action {
        if action.len() > MAX_ACTION_LEN {
            return Err(AppError::Validation(format!(
                "action too long (max {} chars)",
                MAX_ACTION_LEN
            )));
        }
    }

    if !(req.extra.is_null() || req.extra.is_object()) {
        return Err(AppError::Validation(
            "extra must be a JSON object".to_string(),
        ));
    }

    Ok(())
}

/// A deadline must lie strictly in the future
pub fn validate_deadline(expires_at: i64, now_millis: i64) -> Result<()> {
    if expires_at <= now_millis {
        return Err(AppError::InvalidDeadline(format!(
            "expires_at {} is not after now ({})",
            expires_at, now_millis
        )));
    }
    Ok(())
}
