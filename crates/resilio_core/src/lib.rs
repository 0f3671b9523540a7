pub mod config;
pub mod db;
pub mod demo;
pub mod domain;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod priority;
pub mod service;
pub mod store;
pub mod triage;

#[cfg(test)]
mod tests {
    use super::error::{AppError, ErrorKind};

    #[test]
    fn app_error_is_structured() {
        let err = AppError::store("DB_TEST", "db failed").with_details("disk full");
        assert_eq!(err.kind, ErrorKind::Store);
        assert_eq!(err.code, "DB_TEST");
        assert_eq!(err.details.as_deref(), Some("disk full"));
        assert!(err.retryable);
        assert_eq!(err.to_string(), "[DB_TEST] db failed");
    }

    #[test]
    fn only_store_failures_default_to_retryable() {
        assert!(!AppError::validation("V", "bad").retryable);
        assert!(!AppError::invalid_transition("nope").retryable);
        assert!(!AppError::not_found("gone").retryable);
        assert!(AppError::not_found("gone").is_not_found());
    }
}
