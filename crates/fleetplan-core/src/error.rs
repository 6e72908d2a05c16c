//! The closed error taxonomy surfaced to callers.
//!
//! Every failure leaving this workspace is a [`FleetError`]: a stable code
//! from [`ErrorCode`], a human-readable message, and structured context.
//! Credentials and raw upstream error bodies never appear here.

use crate::types::{DeviceId, PlanId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable, closed set of error codes exposed to the outer protocol layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    NotFound,
    Forbidden,
    ValidationFailed,
    RateLimited,
    Timeout,
    DeviceUnreachable,
    DeviceAuthFailed,
    DeviceRejected,
    UnsafeOperation,
    PlanNotApproved,
    PlanExpired,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not-found",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::ValidationFailed => "validation-failed",
            ErrorCode::RateLimited => "rate-limited",
            ErrorCode::Timeout => "timeout",
            ErrorCode::DeviceUnreachable => "device-unreachable",
            ErrorCode::DeviceAuthFailed => "device-auth-failed",
            ErrorCode::DeviceRejected => "device-rejected",
            ErrorCode::UnsafeOperation => "unsafe-operation",
            ErrorCode::PlanNotApproved => "plan-not-approved",
            ErrorCode::PlanExpired => "plan-expired",
            ErrorCode::Internal => "internal",
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited | ErrorCode::Timeout | ErrorCode::DeviceUnreachable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured context attached to an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub device_id: Option<DeviceId>,
    pub plan_id: Option<PlanId>,
    /// Hint for retryable failures, in seconds.
    pub retry_after_secs: Option<u64>,
}

/// The one error type crossing component boundaries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct FleetError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
}

impl FleetError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::new(ErrorCode::RateLimited, message).with_retry_after(retry_after_secs)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceUnreachable, message)
    }

    pub fn auth_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceAuthFailed, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeviceRejected, message)
    }

    pub fn unsafe_operation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsafeOperation, message)
    }

    pub fn not_approved(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlanNotApproved, message)
    }

    pub fn expired(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlanExpired, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    pub fn with_device(mut self, device_id: DeviceId) -> Self {
        self.context.device_id = Some(device_id);
        self
    }

    pub fn with_plan(mut self, plan_id: PlanId) -> Self {
        self.context.plan_id = Some(plan_id);
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.context.retry_after_secs = Some(secs);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}
