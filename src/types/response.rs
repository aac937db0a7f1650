//! Reply data structures returned by the request boundary

use crate::error::ServeError;
use serde::{Deserialize, Serialize};

/// Outcome category of a request, with its HTTP-equivalent code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusCategory {
    #[serde(rename = "OK")]
    Ok,
    BadRequest,
    ServiceUnavailable,
    Internal,
}

impl StatusCategory {
    pub fn code(&self) -> u16 {
        match self {
            StatusCategory::Ok => 200,
            StatusCategory::BadRequest => 400,
            StatusCategory::ServiceUnavailable => 503,
            StatusCategory::Internal => 500,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StatusCategory::Ok)
    }
}

/// Successful prediction body. One shape per deployed model kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictResponse {
    /// `{"predictions": [...], "labels": [...]}`; labels only with a label table.
    Classification {
        predictions: Vec<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        labels: Option<Vec<String>>,
    },
    /// `{"prediction": 1.5, "model_version": "v1"}`
    Regression {
        prediction: f64,
        model_version: String,
    },
}

impl PredictResponse {
    /// Number of predictions carried by the body.
    pub fn len(&self) -> usize {
        match self {
            PredictResponse::Classification { predictions, .. } => predictions.len(),
            PredictResponse::Regression { .. } => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthBody {
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReplyBody {
    Prediction(PredictResponse),
    Health(HealthBody),
    Error(ErrorBody),
}

/// What the boundary hands back to the transport: status plus body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub status: StatusCategory,
    pub body: ReplyBody,
}

impl Reply {
    pub fn prediction(response: PredictResponse) -> Self {
        Self {
            status: StatusCategory::Ok,
            body: ReplyBody::Prediction(response),
        }
    }

    pub fn health() -> Self {
        Self {
            status: StatusCategory::Ok,
            body: ReplyBody::Health(HealthBody {
                status: "ok".to_string(),
            }),
        }
    }

    pub fn error(err: &ServeError) -> Self {
        Self {
            status: err.status(),
            body: ReplyBody::Error(ErrorBody {
                error: err.to_string(),
            }),
        }
    }

    /// Error message, if this is an error reply.
    pub fn error_message(&self) -> Option<&str> {
        match &self.body {
            ReplyBody::Error(body) => Some(&body.error),
            _ => None,
        }
    }
}

/// Reply as published on the wire, tagged with the request id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    pub status: StatusCategory,
    pub code: u16,
    pub request_id: String,
    pub body: ReplyBody,
}

impl ReplyEnvelope {
    pub fn new(reply: Reply, request_id: impl Into<String>) -> Self {
        Self {
            status: reply.status,
            code: reply.status.code(),
            request_id: request_id.into(),
            body: reply.body,
        }
    }
}
