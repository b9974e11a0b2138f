use serde::{Deserialize, Serialize};
use std::time::Duration;

use registrar_core::scheduler::OptimizationObjective;
use registrar_core::types::LockType;

// ─── Validation Helpers ─────────────────────────────────────────────────────

pub fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("{} is required", field))
    } else {
        Ok(())
    }
}

// ─── Request Types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct EnrollRequest {
    pub student_id: String,
    pub section_id: String,
}

impl EnrollRequest {
    pub fn validate(&self) -> Result<(), String> {
        require("student_id", &self.student_id)?;
        require("section_id", &self.section_id)
    }
}

#[derive(Deserialize)]
pub struct AcquireLockRequest {
    pub resource_id: String,
    pub lock_type: String,
    pub holder_id: String,
    /// Auto-release after this many milliseconds
    pub timeout_ms: Option<u64>,
}

impl AcquireLockRequest {
    /// Checks the payload and returns the parsed mode and timeout.
    pub fn validate(&self) -> Result<(LockType, Option<Duration>), String> {
        require("resource_id", &self.resource_id)?;
        require("holder_id", &self.holder_id)?;
        let lock_type = self.lock_type.parse::<LockType>().map_err(|e| e.to_string())?;
        if self.timeout_ms == Some(0) {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        Ok((lock_type, self.timeout_ms.map(Duration::from_millis)))
    }
}

#[derive(Deserialize)]
pub struct OptimizeRequest {
    pub objective: String,
}

impl OptimizeRequest {
    pub fn validate(&self) -> Result<OptimizationObjective, String> {
        self.objective.parse().map_err(|e: registrar_core::RegistrarError| e.to_string())
    }
}

// ─── Response Types ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_locks: usize,
    pub version: String,
}

#[derive(Serialize)]
pub struct LockResponse {
    pub lock_id: String,
    pub resource_id: String,
    pub lock_type: LockType,
    pub holder_id: String,
}

#[derive(Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct EnrollmentsResponse {
    pub student_id: String,
    pub sections: Vec<String>,
}

#[derive(Serialize)]
pub struct WaitlistResponse {
    pub section_id: String,
    pub waitlist: Vec<String>,
}
