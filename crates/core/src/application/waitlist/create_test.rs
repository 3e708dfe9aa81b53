//! Unit tests for create-ticket validation

#[cfg(test)]
mod tests {
    use super::super::create::*;
    use crate::error::AppError;
    use serde_json::json;

    fn request() -> CreateTicketRequest {
        CreateTicketRequest::new("node-1", "vm-create", "123", 10_000)
    }

    #[test]
    fn test_validate_empty_scope() {
        let mut req = request();
        req.scope = "  ".to_string();

        let result = validate_request(&req);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_resource_too_long() {
        let mut req = request();
        req.resource = "a".repeat(129);

        let result = validate_request(&req);
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_validate_action_too_long() {
        let mut req = request();
        req.action = Some("x".repeat(65));

        assert!(matches!(
            validate_request(&req),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_validate_extra_must_be_object() {
        let mut req = request();
        req.extra = json!([1, 2, 3]);
        assert!(validate_request(&req).is_err());

        req.extra = json!({"vm_uuid": "abc"});
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_validate_valid_request() {
        assert!(validate_request(&request()).is_ok());
    }

    #[test]
    fn test_deadline_must_be_strictly_future() {
        assert!(matches!(
            validate_deadline(1_000, 1_000),
            Err(AppError::InvalidDeadline(_))
        ));
        assert!(matches!(
            validate_deadline(999, 1_000),
            Err(AppError::InvalidDeadline(_))
        ));
        assert!(validate_deadline(1_001, 1_000).is_ok());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let req: CreateTicketRequest = serde_json::from_value(json!({
            "resource": "node-1",
            "scope": "vm",
            "id": "1",
            "expires_at": 5000
        }))
        .unwrap();
        assert!(req.action.is_none());
        assert!(req.extra.is_null());
    }
}
