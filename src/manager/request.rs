//! Caller-facing request and response types, and their translation to the wire

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::error::AuthorizerError;
use crate::logging::mask_secret;
use crate::services::backend::{
    AuthRepRequest, AuthRepResponse, ClientAuth, Params, REJECTION_REASON_HEADER_EXTENSION,
    Transaction,
};

/// Request for a service's latest proxy configuration
#[derive(Clone, PartialEq, Eq)]
pub struct SystemRequest {
    pub access_token: String,
    pub service_id: String,
    pub environment: String,
}

impl SystemRequest {
    pub fn new(
        access_token: impl Into<String>,
        service_id: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            service_id: service_id.into(),
            environment: environment.into(),
        }
    }

    /// All three fields are required
    pub fn validate(&self) -> Result<(), AuthorizerError> {
        let missing: Vec<&str> = [
            ("access token", &self.access_token),
            ("service id", &self.service_id),
            ("environment", &self.environment),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AuthorizerError::InvalidRequest(format!(
                "missing {}",
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Debug for SystemRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemRequest")
            .field("access_token", &mask_secret(&self.access_token))
            .field("service_id", &self.service_id)
            .field("environment", &self.environment)
            .finish()
    }
}

/// Service-level credential, e.g. `service_token` or `provider_key`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendAuth {
    pub auth_type: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendParams {
    pub app_id: String,
    pub app_key: String,
    pub user_id: String,
    pub user_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendTransaction {
    pub metrics: HashMap<String, i64>,
    pub params: BackendParams,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendRequest {
    pub auth: BackendAuth,
    pub service: String,
    pub transactions: Vec<BackendTransaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackendResponse {
    pub authorized: bool,
    pub error_code: Option<String>,
    pub rejected_reason: Option<String>,
    pub raw_response: Option<String>,
}

impl BackendRequest {
    /// Build the wire request.
    ///
    /// Only the first transaction is sent; the rest are ignored. The
    /// rejection-reason extension is always requested.
    pub fn to_api_request(&self) -> Result<AuthRepRequest, AuthorizerError> {
        let first = self
            .transactions
            .first()
            .ok_or(AuthorizerError::EmptyTransaction)?;

        let transaction = Transaction {
            metrics: first.metrics.clone(),
            params: Params {
                app_id: first.params.app_id.clone(),
                app_key: first.params.app_key.clone(),
                user_id: first.params.user_id.clone(),
                user_key: first.params.user_key.clone(),
            },
        };

        Ok(AuthRepRequest {
            auth: ClientAuth {
                auth_type: self.auth.auth_type.clone(),
                value: self.auth.value.clone(),
            },
            service: self.service.clone(),
            transactions: vec![transaction],
            extensions: HashMap::from([(
                REJECTION_REASON_HEADER_EXTENSION.to_string(),
                "1".to_string(),
            )]),
        })
    }
}

impl From<AuthRepResponse> for BackendResponse {
    fn from(response: AuthRepResponse) -> Self {
        Self {
            authorized: response.authorized,
            error_code: response.error_code,
            rejected_reason: response.rejection_reason,
            raw_response: response.raw_response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::backend::SERVICE_TOKEN;

    fn transaction(user_key: &str, hits: i64) -> BackendTransaction {
        BackendTransaction {
            metrics: HashMap::from([("hits".to_string(), hits)]),
            params: BackendParams {
                user_key: user_key.to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_system_request_validation() {
        assert!(SystemRequest::new("tok", "42", "production").validate().is_ok());

        for (request, missing) in [
            (SystemRequest::new("", "42", "production"), "access token"),
            (SystemRequest::new("tok", "", "production"), "service id"),
            (SystemRequest::new("tok", "42", ""), "environment"),
        ] {
            match request.validate() {
                Err(AuthorizerError::InvalidRequest(msg)) => {
                    assert!(msg.contains(missing), "{msg} should mention {missing}")
                }
                other => panic!("expected InvalidRequest, got {other:?}"),
            }
        }

        let err = SystemRequest::new("", "", "").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: missing access token, service id, environment"
        );
    }

    #[test]
    fn test_whitespace_fields_are_not_missing() {
        assert!(SystemRequest::new("tok", "42", " ").validate().is_ok());
        assert!(SystemRequest::new(" ", " ", " ").validate().is_ok());
    }

    #[test]
    fn test_system_request_debug_masks_token() {
        let rendered = format!("{:?}", SystemRequest::new("supersecret", "42", "staging"));
        assert!(!rendered.contains("supersecret"));
        assert!(rendered.contains("supe****"));
    }

    #[test]
    fn test_empty_transactions_rejected() {
        let request = BackendRequest {
            auth: BackendAuth {
                auth_type: SERVICE_TOKEN.to_string(),
                value: "tok".to_string(),
            },
            service: "42".to_string(),
            transactions: vec![],
        };
        assert!(matches!(
            request.to_api_request(),
            Err(AuthorizerError::EmptyTransaction)
        ));
    }

    #[test]
    fn test_translation_carries_every_field() {
        let request = BackendRequest {
            auth: BackendAuth {
                auth_type: SERVICE_TOKEN.to_string(),
                value: "tok".to_string(),
            },
            service: "42".to_string(),
            transactions: vec![BackendTransaction {
                metrics: HashMap::from([("hits".to_string(), 1), ("bytes".to_string(), 2048)]),
                params: BackendParams {
                    app_id: "app".to_string(),
                    app_key: "secret".to_string(),
                    user_id: "user-1".to_string(),
                    user_key: "uk".to_string(),
                },
            }],
        };

        let api = request.to_api_request().unwrap();
        assert_eq!(api.auth.auth_type, SERVICE_TOKEN);
        assert_eq!(api.auth.value, "tok");
        assert_eq!(api.service, "42");
        assert_eq!(api.transactions.len(), 1);

        let tx = &api.transactions[0];
        assert_eq!(tx.params.app_id, "app");
        assert_eq!(tx.params.app_key, "secret");
        assert_eq!(tx.params.user_id, "user-1");
        assert_eq!(tx.params.user_key, "uk");
        assert_eq!(tx.metrics, request.transactions[0].metrics);
        assert_eq!(
            api.extensions.get(REJECTION_REASON_HEADER_EXTENSION).map(String::as_str),
            Some("1")
        );
    }

    #[test]
    fn test_only_first_transaction_is_sent() {
        let request = BackendRequest {
            auth: BackendAuth::default(),
            service: "42".to_string(),
            transactions: vec![transaction("first", 1), transaction("second", 7)],
        };

        let api = request.to_api_request().unwrap();
        assert_eq!(api.transactions.len(), 1);
        assert_eq!(api.transactions[0].params.user_key, "first");
    }

    #[test]
    fn test_response_conversion() {
        let response = BackendResponse::from(AuthRepResponse {
            authorized: false,
            error_code: Some("limits_exceeded".to_string()),
            rejection_reason: Some("usage limits are exceeded".to_string()),
            raw_response: Some("<status/>".to_string()),
        });
        assert!(!response.authorized);
        assert_eq!(response.error_code.as_deref(), Some("limits_exceeded"));
        assert_eq!(response.rejected_reason.as_deref(), Some("usage limits are exceeded"));
        assert_eq!(response.raw_response.as_deref(), Some("<status/>"));
    }
}
