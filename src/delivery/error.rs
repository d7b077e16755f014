use thiserror::Error;

/// Failure reported by a delivery client.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("delivery request failed: {message}")]
    Transport { message: String },
    #[error("delivery resource `{resource}` not found")]
    NotFound { resource: String },
    #[error("delivery api answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("delivery response could not be decoded: {message}")]
    Decode { message: String },
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}
