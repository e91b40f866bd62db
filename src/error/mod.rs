pub mod types;

pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::BackendResponse;
    use crate::services::backend::BackendError;
    use crate::services::system::SystemError;

    #[test]
    fn test_error_display_messages() {
        let err = AuthorizerError::InvalidRequest("service id is required".to_string());
        assert_eq!(err.to_string(), "Invalid request: service id is required");

        let err = AuthorizerError::EmptyTransaction;
        assert_eq!(err.to_string(), "Cannot process empty transaction");

        let err = AuthorizerError::RemoteFetch {
            phase: FetchPhase::CacheFill,
            source: SystemError::Transport("connection refused".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "Cannot get system config (cache_fill): Transport error: connection refused"
        );

        let err = AuthorizerError::BackendCreation {
            destination: "https://backend.example.com".to_string(),
            reason: "bad url".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Unable to create cached backend for https://backend.example.com: bad url"
        );
    }

    #[test]
    fn test_collaborator_errors_are_exposed_as_sources() {
        use std::error::Error;

        let err = AuthorizerError::RemoteFetch {
            phase: FetchPhase::Remote,
            source: SystemError::UnexpectedStatus {
                status: 403,
                body: "denied".to_string(),
            },
        };
        let source = err.source().expect("fetch error has a source");
        assert_eq!(source.to_string(), "Unexpected status 403 from control plane");
        assert!(source.downcast_ref::<SystemError>().is_some());

        let err = AuthorizerError::BackendCall {
            source: BackendError::Transport("reset".to_string()),
            response: Box::default(),
        };
        let source = err.source().expect("backend error has a source");
        assert_eq!(
            source.downcast_ref::<BackendError>(),
            Some(&BackendError::Transport("reset".to_string()))
        );
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(AuthorizerError::InvalidRequest("x".into()).phase(), "validation");
        assert_eq!(AuthorizerError::EmptyTransaction.phase(), "translation");
        assert_eq!(AuthorizerError::Config("x".into()).phase(), "config");

        let refresh = AuthorizerError::RemoteFetch {
            phase: FetchPhase::Refresh,
            source: SystemError::Decode("eof".into()),
        };
        assert_eq!(refresh.phase(), "refresh");

        let creation = AuthorizerError::BackendCreation {
            destination: "d".into(),
            reason: "r".into(),
        };
        assert_eq!(creation.phase(), "backend_creation");
    }

    #[test]
    fn test_backend_call_keeps_partial_response() {
        let err = AuthorizerError::BackendCall {
            source: BackendError::UnexpectedStatus {
                status: 500,
                raw_response: Some("<error>boom</error>".to_string()),
            },
            response: Box::new(BackendResponse {
                authorized: false,
                raw_response: Some("<error>boom</error>".to_string()),
                ..Default::default()
            }),
        };

        assert_eq!(err.phase(), "backend_call");
        let response = err.backend_response().expect("partial response");
        assert!(!response.authorized);
        assert_eq!(response.raw_response.as_deref(), Some("<error>boom</error>"));
        assert!(AuthorizerError::EmptyTransaction.backend_response().is_none());
    }
}
