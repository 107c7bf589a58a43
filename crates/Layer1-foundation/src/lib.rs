//! # stencil-foundation
//!
//! Foundation layer for Stencil:
//! - Error: 플러그인 런타임 에러 분류 (Validation, Dependency, Compatibility,
//!   Lifecycle, HookExecution, Sandbox)
//! - Config: 런타임 설정 (RuntimeConfig, 글로벌 + 프로젝트 병합)
//! - Storage: JsonStore (설정, 플러그인 데이터 영속화)

pub mod config;
pub mod error;
pub mod storage;

// ============================================================================
// Error
// ============================================================================
pub use error::{
    CallbackKind, CompatibilityError, ConstraintFailure, DependencyError, Error,
    HookExecutionError, LifecycleError, Result, SandboxViolation, UnmetDependency, UnmetReason,
    ValidationError, ViolationReason,
};

// ============================================================================
// Config (설정)
// ============================================================================
pub use config::{
    FilterFailurePolicy, PartialConfig, RuntimeConfig, DEFAULT_HOST_VERSION, DEFAULT_PRIORITY,
    RUNTIME_CONFIG_FILE,
};

// ============================================================================
// Storage (저장소)
// ============================================================================
pub use storage::JsonStore;
