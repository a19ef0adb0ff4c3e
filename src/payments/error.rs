use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

/// Error taxonomy for the payment subsystem.
///
/// Initiation errors surface to the API caller; reconciliation errors never
/// surface to the gateway and are absorbed by the recovery sweep instead.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Authentication with gateway failed: {message}")]
    Auth { message: String },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Gateway error: {message}")]
    Gateway {
        code: Option<String>,
        message: String,
        retryable: bool,
    },

    #[error("Malformed callback payload: {message}")]
    CallbackParse { message: String },

    #[error("Duplicate correlation id: {correlation_id}")]
    DuplicateCorrelation { correlation_id: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            // Token exchange failures are retried on the next call, never cached.
            PaymentError::Auth { .. } => true,
            PaymentError::Validation { .. } => false,
            PaymentError::Gateway { retryable, .. } => *retryable,
            PaymentError::CallbackParse { .. } => false,
            PaymentError::DuplicateCorrelation { .. } => false,
            PaymentError::Storage { .. } => true,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::Auth { .. } => 502,
            PaymentError::Validation { .. } => 400,
            PaymentError::Gateway { .. } => 502,
            PaymentError::CallbackParse { .. } => 400,
            PaymentError::DuplicateCorrelation { .. } => 409,
            PaymentError::Storage { .. } => 500,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Auth { .. } => {
                "Could not authenticate with the payment gateway".to_string()
            }
            PaymentError::Validation { message, .. } => message.clone(),
            PaymentError::Gateway { message, .. } => {
                format!("Payment gateway returned an error: {}", message)
            }
            PaymentError::CallbackParse { .. } => "Invalid callback payload".to_string(),
            PaymentError::DuplicateCorrelation { .. } => {
                "A payment with this gateway reference already exists".to_string()
            }
            PaymentError::Storage { .. } => {
                "Payment service is temporarily unavailable".to_string()
            }
        }
    }
}

/// Unique violations are NOT turned into `DuplicateCorrelation` here: the
/// constraint name is not a correlation id. The repository maps duplicates
/// where the real checkout request id is in hand.
impl From<crate::database::error::DatabaseError> for PaymentError {
    fn from(err: crate::database::error::DatabaseError) -> Self {
        PaymentError::Storage {
            message: err.to_string(),
        }
    }
}
