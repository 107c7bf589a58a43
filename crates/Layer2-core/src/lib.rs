//! stencil-core: Plugin Runtime for Stencil
//!
//! Layer2 - 플러그인 런타임 레이어
//!
//! # 주요 모듈
//!
//! - `plugin`: 플러그인 발견, 의존성 그래프, 라이프사이클, hook/filter 디스패치
//!
//! # 사용 예시
//!
//! ```ignore
//! use stencil_core::{EntryPoints, PluginRegistry, RuntimeConfig};
//!
//! let registry = Arc::new(PluginRegistry::new(RuntimeConfig::load()?, entry_points));
//!
//! // 플러그인 디렉토리 스캔 (백그라운드)
//! let report = registry.spawn_discovery(vec![PathBuf::from("plugins")]).await?;
//!
//! // 의존성까지 함께 활성화
//! registry.enable("acme.export").await?;
//!
//! // Hook 발행
//! registry.fire("template:created", &json!({ "name": "invoice" }));
//! ```

pub mod plugin;

// Re-exports: Plugin
pub use plugin::{
    // Graph
    CycleDetected,
    DependencyGraph,
    // Discovery
    DiscoveryReport,
    // Dispatch
    DispatchReport,
    // Traits
    EntryPoints,
    FilterOutcome,
    HookDispatcher,
    LoadReport,
    LogLevel,
    MemoryTemplateStore,
    Plugin,
    PluginContext,
    // Manifest
    PluginDescriptor,
    PluginManifest,
    // Registry
    PluginRegistry,
    PluginState,
    PluginSummary,
    RegistrationId,
    TemplateStore,
    // Version
    VersionRange,
};

// Layer1 re-exports
pub use stencil_foundation::{Error, Result, RuntimeConfig};

/// Layer2 버전
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
