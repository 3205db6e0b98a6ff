use super::*;

fn status(code: u16) -> ApiError {
    classify(RawFailure::Status {
        status: code,
        body: None,
    })
}

#[test]
fn test_auth_statuses() {
    for code in [401, 403] {
        let err = status(code);
        assert_eq!(err.error_type(), ApiErrorType::Auth);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.is_recoverable());
        assert_eq!(err.status_code(), Some(code));
    }
}

#[test]
fn test_server_statuses() {
    let err = status(500);
    assert_eq!(err.error_type(), ApiErrorType::Server);
    assert_eq!(err.severity(), ErrorSeverity::Critical);
    assert!(err.is_recoverable());

    let err = status(503);
    assert_eq!(err.error_type(), ApiErrorType::Server);
    assert_eq!(err.severity(), ErrorSeverity::High);
}

#[test]
fn test_validation_statuses() {
    let err = status(422);
    assert_eq!(err.error_type(), ApiErrorType::Validation);
    assert_eq!(err.severity(), ErrorSeverity::Low);
    assert!(!err.is_recoverable());

    let err = status(400);
    assert_eq!(err.error_type(), ApiErrorType::Validation);
    assert_eq!(err.severity(), ErrorSeverity::Medium);
}

#[test]
fn test_other_statuses_are_unknown() {
    let err = status(404);
    assert_eq!(err.error_type(), ApiErrorType::Unknown);
    assert_eq!(err.severity(), ErrorSeverity::Low);
    assert!(err.is_recoverable());

    let err = status(302);
    assert_eq!(err.error_type(), ApiErrorType::Unknown);
    assert_eq!(err.severity(), ErrorSeverity::Medium);
}

#[test]
fn test_timeout_message() {
    let err = ApiError::timeout(250);
    assert_eq!(err.error_type(), ApiErrorType::Timeout);
    assert_eq!(err.message(), "Operation timed out after 250ms");
    assert!(err.is_recoverable());
    assert_eq!(err.status_code(), None);
}

#[test]
fn test_network_and_parse() {
    let err = classify(RawFailure::Network("connection refused".into()));
    assert_eq!(err.error_type(), ApiErrorType::Network);
    assert!(err.message().contains("connection refused"));
    assert!(err.is_recoverable());

    let err = classify(RawFailure::Parse("expected value at line 1".into()));
    assert_eq!(err.error_type(), ApiErrorType::Parsing);
    assert_eq!(err.severity(), ErrorSeverity::Medium);
    assert!(!err.is_recoverable());
}

#[test]
fn test_other_is_unknown() {
    let err = classify(RawFailure::Other("something odd".into()));
    assert_eq!(err.error_type(), ApiErrorType::Unknown);
    assert_eq!(err.message(), "something odd");
}

#[test]
fn test_classified_passes_through() {
    let original = status(502);
    let again = classify(RawFailure::from(original.clone()));
    assert_eq!(again, original);
}

#[test]
fn test_status_body_is_truncated_in_message() {
    let body = "x".repeat(500);
    let err = classify(RawFailure::Status {
        status: 500,
        body: Some(body),
    });
    assert!(err.message().starts_with("HTTP 500: "));
    assert!(err.message().ends_with("..."));
    assert!(err.message().len() < 250);
}

#[test]
fn test_severity_is_ordered() {
    assert!(ErrorSeverity::Low < ErrorSeverity::Medium);
    assert!(ErrorSeverity::Medium < ErrorSeverity::High);
    assert!(ErrorSeverity::High < ErrorSeverity::Critical);
}

#[test]
fn test_serializes_with_screaming_case() {
    let json = serde_json::to_value(status(401)).unwrap();
    assert_eq!(json["type"], "AUTH");
    assert_eq!(json["severity"], "HIGH");
    assert_eq!(json["statusCode"], 401);
    assert_eq!(json["isRecoverable"], true);
}

#[test]
fn test_circuit_counting() {
    assert!(status(500).counts_against_circuit());
    assert!(ApiError::timeout(10).counts_against_circuit());
    assert!(!status(401).counts_against_circuit());
    assert!(!status(422).counts_against_circuit());
}

#[test]
fn test_validation_constructor() {
    let err = ApiError::validation("missing field `id`");
    assert_eq!(err.error_type(), ApiErrorType::Validation);
    assert_eq!(err.severity(), ErrorSeverity::Medium);
    assert_eq!(err.status_code(), None);
    assert!(!err.is_recoverable());
}
