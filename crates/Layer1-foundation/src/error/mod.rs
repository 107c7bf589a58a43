//! Error types for Stencil
//!
//! 플러그인 런타임의 모든 에러를 중앙에서 관리
//!
//! 분류:
//! - `ValidationError`: 매니페스트 파싱/검증 실패 (discovery에서 건너뜀)
//! - `DependencyError`: 의존성 누락, 버전 불일치, 순환
//! - `CompatibilityError`: 호스트 버전 범위 불일치
//! - `LifecycleError`: 잘못된 상태 전이, 활성 dependents에 의한 차단
//! - `HookExecutionError`: 콜백 실패 (dispatch 경계에서 격리)
//! - `SandboxViolation`: 선언되지 않은 capability 사용

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Stencil 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // 플러그인 런타임
    // ========================================================================
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Compatibility(#[from] CompatibilityError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    HookExecution(#[from] HookExecutionError),

    #[error(transparent)]
    Sandbox(#[from] SandboxViolation),

    #[error("Entry point '{entry_point}' for plugin {plugin} could not be resolved")]
    EntryPoint { plugin: String, entry_point: String },

    // ========================================================================
    // 설정 / 저장소
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // 외부 에러 변환
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // 기타
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// 같은 요청을 나중에 다시 시도하면 성공할 수 있는 에러인지 확인
    ///
    /// 의존성이 아직 활성화되지 않았거나 dependents가 남아있는 경우 등
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Dependency(DependencyError::Unmet { unmet, .. }) => unmet
                .iter()
                .all(|u| matches!(u.reason, UnmetReason::NotEnabled { .. })),
            Error::Lifecycle(LifecycleError::DependentsActive { .. }) => true,
            _ => false,
        }
    }

    /// 에러와 관련된 플러그인 ID
    pub fn plugin_id(&self) -> Option<&str> {
        match self {
            Error::Dependency(e) => Some(e.plugin()),
            Error::Compatibility(e) => Some(&e.plugin),
            Error::Lifecycle(e) => e.plugin(),
            Error::HookExecution(e) => Some(&e.plugin),
            Error::Sandbox(e) => Some(&e.plugin),
            Error::EntryPoint { plugin, .. } => Some(plugin),
            _ => None,
        }
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}

// ============================================================================
// ValidationError
// ============================================================================

/// 매니페스트 검증 에러
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Invalid manifest {}: {message}", .source_path.display())]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    /// 매니페스트 경로
    pub source_path: PathBuf,
    /// 실패 사유
    pub message: String,
}

impl ValidationError {
    pub fn new(source_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// DependencyError
// ============================================================================

/// 충족되지 않은 의존성의 사유
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UnmetReason {
    /// 카탈로그에 없음
    Missing,
    /// 버전이 범위를 벗어남
    VersionMismatch { found: String },
    /// 존재하지만 ENABLED 상태가 아님
    NotEnabled { state: String },
    /// 범위 표현식 자체가 잘못됨 (fail closed)
    MalformedRange { error: String },
}

impl fmt::Display for UnmetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "not installed"),
            Self::VersionMismatch { found } => write!(f, "found version {}", found),
            Self::NotEnabled { state } => write!(f, "is {}", state),
            Self::MalformedRange { error } => write!(f, "malformed range ({})", error),
        }
    }
}

/// 충족되지 않은 의존성 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetDependency {
    pub dependency: String,
    pub required: String,
    pub reason: UnmetReason,
}

impl fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.dependency, self.required, self.reason)
    }
}

/// 의존성 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("Plugin {plugin} has unmet dependencies: {}", join(.unmet))]
    Unmet {
        plugin: String,
        unmet: Vec<UnmetDependency>,
    },

    #[error("Plugin {plugin} is part of a dependency cycle: {}", .cycle.join(" -> "))]
    Cycle { plugin: String, cycle: Vec<String> },
}

impl DependencyError {
    pub fn plugin(&self) -> &str {
        match self {
            Self::Unmet { plugin, .. } | Self::Cycle { plugin, .. } => plugin,
        }
    }

    /// 충족되지 않은 의존성 목록 (순환 에러면 빈 슬라이스)
    pub fn unmet(&self) -> &[UnmetDependency] {
        match self {
            Self::Unmet { unmet, .. } => unmet,
            Self::Cycle { .. } => &[],
        }
    }
}

// ============================================================================
// CompatibilityError
// ============================================================================

/// 호환성 검사에서 실패한 제약 하나
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ConstraintFailure {
    /// 호스트 버전이 선언된 범위 밖
    HostVersion { range: String, host: String },
    /// hostCompatibility 표현식 파싱 실패
    MalformedHostRange { expr: String, error: String },
    /// 의존성 범위 표현식 파싱 실패
    MalformedDependencyRange {
        dependency: String,
        expr: String,
        error: String,
    },
    /// 호스트 버전 자체가 semver가 아님
    MalformedHostVersion { host: String, error: String },
}

impl fmt::Display for ConstraintFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostVersion { range, host } => {
                write!(f, "host version {} does not satisfy '{}'", host, range)
            }
            Self::MalformedHostRange { expr, error } => {
                write!(f, "host compatibility range '{}' is malformed: {}", expr, error)
            }
            Self::MalformedDependencyRange { dependency, expr, error } => write!(
                f,
                "dependency {} range '{}' is malformed: {}",
                dependency, expr, error
            ),
            Self::MalformedHostVersion { host, error } => {
                write!(f, "host version '{}' is malformed: {}", host, error)
            }
        }
    }
}

/// 호환성 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Plugin {plugin} is incompatible: {}", join(.failures))]
pub struct CompatibilityError {
    pub plugin: String,
    pub failures: Vec<ConstraintFailure>,
}

// ============================================================================
// LifecycleError
// ============================================================================

/// 라이프사이클 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Plugin {plugin}: cannot {attempted} while {current}")]
    InvalidTransition {
        plugin: String,
        attempted: String,
        current: String,
    },

    #[error("Plugin {plugin}: cannot {operation}, enabled dependents: [{}]", .blocking.join(", "))]
    DependentsActive {
        plugin: String,
        operation: String,
        blocking: Vec<String>,
    },

    #[error("Plugin {plugin}: {callback} failed: {message}{}", left_disabled_note(.left_disabled))]
    CallbackFailed {
        plugin: String,
        callback: String,
        message: String,
        /// cascade 롤백에서 다시 활성화하지 못한 dependents
        left_disabled: Vec<String>,
    },

    #[error("Plugin not found: {0}")]
    NotFound(String),
}

impl LifecycleError {
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::InvalidTransition { plugin, .. }
            | Self::DependentsActive { plugin, .. }
            | Self::CallbackFailed { plugin, .. } => Some(plugin),
            Self::NotFound(id) => Some(id),
        }
    }

    /// 작업을 막고 있는 dependents 목록
    pub fn blocking(&self) -> &[String] {
        match self {
            Self::DependentsActive { blocking, .. } => blocking,
            _ => &[],
        }
    }
    /// cascade 실패 후 DISABLED로 남은 dependents
    pub fn left_disabled(&self) -> &[String] {
        match self {
            Self::CallbackFailed { left_disabled, .. } => left_disabled,
            _ => &[],
        }
    }
}

fn left_disabled_note(ids: &[String]) -> String {
    if ids.is_empty() {
        String::new()
    } else {
        format!(" (dependents left disabled: {})", ids.join(", "))
    }
}

// ============================================================================
// HookExecutionError
// ============================================================================

/// 실패한 콜백의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackKind {
    Hook,
    Filter,
}

impl fmt::Display for CallbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hook => write!(f, "hook"),
            Self::Filter => write!(f, "filter"),
        }
    }
}

/// 콜백 실행 에러 - 호스트에 전달되는 구조화된 진단 정보
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{kind} '{hook}' callback of plugin {plugin} failed: {cause}")]
#[serde(rename_all = "camelCase")]
pub struct HookExecutionError {
    pub plugin: String,
    pub hook: String,
    pub kind: CallbackKind,
    pub cause: String,
    pub occurred_at: DateTime<Utc>,
}

impl HookExecutionError {
    pub fn new(
        plugin: impl Into<String>,
        hook: impl Into<String>,
        kind: CallbackKind,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            hook: hook.into(),
            kind,
            cause: cause.into(),
            occurred_at: Utc::now(),
        }
    }
}

// ============================================================================
// SandboxViolation
// ============================================================================

/// capability 검사 실패 사유
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    /// 매니페스트에 선언되지 않음
    NotGranted,
    /// 컨텍스트가 이미 폐기됨 (UNLOADING 이후)
    Revoked,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotGranted => write!(f, "capability not declared"),
            Self::Revoked => write!(f, "context revoked"),
        }
    }
}

/// Sandbox 위반
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("Plugin {plugin} is not allowed to use '{capability}' ({reason})")]
pub struct SandboxViolation {
    pub plugin: String,
    pub capability: String,
    pub reason: ViolationReason,
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependency_error_lists_every_constraint() {
        let err = DependencyError::Unmet {
            plugin: "a".into(),
            unmet: vec![
                UnmetDependency {
                    dependency: "b".into(),
                    required: ">=1.0.0".into(),
                    reason: UnmetReason::VersionMismatch { found: "0.9.0".into() },
                },
                UnmetDependency {
                    dependency: "c".into(),
                    required: "*".into(),
                    reason: UnmetReason::Missing,
                },
            ],
        };

        let msg = err.to_string();
        assert!(msg.contains("b >=1.0.0 (found version 0.9.0)"));
        assert!(msg.contains("c * (not installed)"));
    }

    #[test]
    fn test_retryable() {
        let not_enabled: Error = DependencyError::Unmet {
            plugin: "a".into(),
            unmet: vec![UnmetDependency {
                dependency: "b".into(),
                required: "*".into(),
                reason: UnmetReason::NotEnabled { state: "loaded".into() },
            }],
        }
        .into();
        assert!(not_enabled.is_retryable());

        let cycle: Error = DependencyError::Cycle {
            plugin: "a".into(),
            cycle: vec!["a".into(), "b".into(), "a".into()],
        }
        .into();
        assert!(!cycle.is_retryable());
        assert_eq!(cycle.plugin_id(), Some("a"));
    }

    #[test]
    fn test_lifecycle_blocking() {
        let err = LifecycleError::DependentsActive {
            plugin: "b".into(),
            operation: "unload".into(),
            blocking: vec!["a".into()],
        };
        assert_eq!(err.blocking(), ["a".to_string()]);
        assert_eq!(err.to_string(), "Plugin b: cannot unload, enabled dependents: [a]");
    }

    #[test]
    fn test_callback_failed_names_dependents_left_disabled() {
        let err = LifecycleError::CallbackFailed {
            plugin: "b".into(),
            callback: "on_disable".into(),
            message: "panicked: boom".into(),
            left_disabled: vec!["a".into()],
        };
        assert_eq!(err.left_disabled(), ["a".to_string()]);
        assert_eq!(
            err.to_string(),
            "Plugin b: on_disable failed: panicked: boom (dependents left disabled: a)"
        );
    }
}
