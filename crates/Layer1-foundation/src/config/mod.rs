//! Config - 런타임 설정 관리
//!
//! - `runtime.rs` - RuntimeConfig 통합 설정

mod runtime;

pub use runtime::{
    FilterFailurePolicy, PartialConfig, RuntimeConfig, DEFAULT_HOST_VERSION, DEFAULT_PRIORITY,
    RUNTIME_CONFIG_FILE,
};
