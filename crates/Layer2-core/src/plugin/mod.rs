//! # Plugin System
//!
//! Stencil 플러그인 런타임
//!
//! ## 개요
//!
//! 서드파티 플러그인을 발견, 로드, 활성화, 언로드하고 hook/filter 디스패치로
//! 호스트와 연결한다:
//! - 매니페스트 발견 (`plugin.json` / `plugin.toml`)
//! - 의존성 그래프 (순환 검출, 로드 순서)
//! - 플러그인별 상태 머신
//! - 우선순위 기반 hook/filter 디스패치
//! - capability 기반 플러그인 컨텍스트
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PluginRegistry                          │
//! │   RwLock<RegistryState>  (catalog, instances, graph)        │
//! │  ┌───────────────────────────────────────────────────────┐ │
//! │  │                  LifecycleManager                      │ │
//! │  │  CompatibilityChecker → DependencyGraph → EntryPoints  │ │
//! │  │  ┌────────────┬────────────┬────────────┐             │ │
//! │  │  │ Plugin A   │ Plugin B   │ Plugin C   │             │ │
//! │  │  │ + Context  │ + Context  │ + Context  │             │ │
//! │  │  └────────────┴────────────┴────────────┘             │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! │                          │                                  │
//! │  ┌───────────────────────┼───────────────────────────────┐ │
//! │  │     HookDispatcher    │  (자체 RwLock, 스냅샷 디스패치) │ │
//! │  │  - hooks:   fire()    │                               │ │
//! │  │  - filters: apply()   │                               │ │
//! │  └───────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 예시
//!
//! ```ignore
//! struct WordCount;
//!
//! #[async_trait]
//! impl Plugin for WordCount {
//!     fn register_hooks(&self, ctx: &PluginContext) -> anyhow::Result<()> {
//!         ctx.register_filter("template_data", |mut value, _args| {
//!             value["words"] = json!(42);
//!             Ok(value)
//!         })?;
//!         Ok(())
//!     }
//! }
//!
//! let entry_points = EntryPoints::new().with("word_count", || Arc::new(WordCount) as Arc<dyn Plugin>);
//! let registry = Arc::new(PluginRegistry::new(RuntimeConfig::load()?, entry_points));
//! registry.discover_configured().await;
//! registry.enable("acme.word-count").await?;
//! let outcome = registry.apply("template_data", json!({}), &[])?;
//! ```

mod compat;
mod context;
mod discovery;
mod graph;
mod hooks;
mod lifecycle;
mod manifest;
mod registry;
mod traits;
mod version;

pub use compat::{CompatibilityChecker, CompatibilityReport};
pub use context::{LogLevel, MemoryTemplateStore, PluginContext, TemplateStore};
pub use discovery::{read_manifest, read_plugin_dir, scan_sources, DiscoveryReport, ScanResult};
pub use graph::{CycleDetected, DependencyGraph, Edge};
pub use hooks::{
    filter_fn, hook_fn, DispatchReport, FilterCallback, FilterOutcome, HookCallback,
    HookDispatcher, RegistrationId, RegistrationInfo, ValueContract, ValueKind, BUILTIN_FILTERS,
    BUILTIN_HOOKS,
};
pub use lifecycle::{LifecycleManager, PluginInstance, RegistryState};
pub use manifest::{
    Capability, Dependency, ManifestDependencies, ManifestFormat, PluginDescriptor, PluginManifest,
};
pub use registry::{LoadReport, MergeOutcome, PluginCheck, PluginRegistry, PluginSummary};
pub use traits::{EntryPoints, Plugin, PluginFactory, PluginState};
pub use version::{parse_version, satisfies, Comparator, Op, RangeParseError, VersionRange};
