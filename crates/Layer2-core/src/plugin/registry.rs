//! Plugin Registry - 호스트가 사용하는 플러그인 런타임 진입점
//!
//! 하나의 `tokio::sync::RwLock`이 카탈로그, 인스턴스, 의존성 그래프를 함께
//! 보호한다. 상태를 바꾸는 작업은 전체 구간 동안 쓰기 락을 잡고, 조회는 읽기
//! 락으로 스냅샷을 만들어 반환한다.

use super::compat::{CompatibilityChecker, CompatibilityReport};
use super::context::{MemoryTemplateStore, TemplateStore};
use super::discovery::{scan_sources, DiscoveryReport};
use super::graph::CycleDetected;
use super::hooks::{DispatchReport, FilterOutcome, HookDispatcher};
use super::lifecycle::{LifecycleManager, RegistryState};
use super::manifest::{Capability, PluginDescriptor};
use super::traits::{EntryPoints, PluginState};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use stencil_foundation::{
    DependencyError, Error, HookExecutionError, JsonStore, LifecycleError, Result, RuntimeConfig,
    UnmetDependency,
};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// PluginSummary / LoadReport
// ============================================================================

/// 플러그인 요약 정보 (조회용 스냅샷)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSummary {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub author: Option<String>,
    pub state: PluginState,
    pub capabilities: Vec<Capability>,
    pub dependencies: Vec<String>,
    pub source: String,
    /// 카탈로그에 더 높은 버전이 있으면 그 버전 (reload 대기)
    pub pending_version: Option<String>,
    pub instance_id: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub registrations: usize,
}

/// load_all() 결과
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl LoadReport {
    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 설치 전 점검 결과 (호환성 + 의존성 존재/버전)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginCheck {
    pub id: String,
    pub compatibility: CompatibilityReport,
    pub unmet: Vec<UnmetDependency>,
    /// 이 플러그인이 올라가 있는 순환 (첫 ID가 끝에 반복됨)
    pub cycle: Option<Vec<String>>,
}

impl PluginCheck {
    pub fn is_ok(&self) -> bool {
        self.compatibility.is_compatible() && self.unmet.is_empty() && self.cycle.is_none()
    }
}

/// 디스크립터 병합 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    Added,
    Replaced { previous: String },
    Ignored { existing: String },
}

// ============================================================================
// PluginRegistry
// ============================================================================

/// 플러그인 레지스트리
pub struct PluginRegistry {
    state: RwLock<RegistryState>,
    dispatcher: Arc<HookDispatcher>,
    lifecycle: LifecycleManager,
    config: RuntimeConfig,
}

impl PluginRegistry {
    /// 메모리 템플릿 저장소로 생성
    pub fn new(config: RuntimeConfig, entry_points: EntryPoints) -> Self {
        Self::with_templates(config, entry_points, Arc::new(MemoryTemplateStore::new()))
    }

    /// 호스트 템플릿 저장소와 함께 생성
    pub fn with_templates(
        config: RuntimeConfig,
        entry_points: EntryPoints,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        let dispatcher = Arc::new(HookDispatcher::from_config(&config));
        let mut lifecycle = LifecycleManager::new(
            dispatcher.clone(),
            Arc::new(entry_points),
            templates,
            config.host_version.clone(),
        );
        if let Some(dir) = &config.data_dir {
            lifecycle = lifecycle.with_data_store(JsonStore::new(dir));
        }

        Self {
            state: RwLock::new(RegistryState::default()),
            dispatcher,
            lifecycle,
            config,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// 공유 디스패처
    pub fn hooks(&self) -> &Arc<HookDispatcher> {
        &self.dispatcher
    }

    pub fn entry_points(&self) -> &Arc<EntryPoints> {
        self.lifecycle.entry_points()
    }

    // ========================================================================
    // Discovery / Catalog
    // ========================================================================

    /// 소스 디렉토리 스캔 후 카탈로그에 병합
    pub async fn discover(&self, sources: &[PathBuf]) -> DiscoveryReport {
        let scan = scan_sources(sources).await;

        let mut report = DiscoveryReport {
            errors: scan.errors,
            ..Default::default()
        };

        let mut state = self.state.write().await;
        for descriptor in scan.descriptors {
            let id = descriptor.id.clone();
            match merge(&mut state, descriptor) {
                MergeOutcome::Added => report.discovered.push(id),
                MergeOutcome::Replaced { .. } => report.replaced.push(id),
                MergeOutcome::Ignored { .. } => report.ignored.push(id),
            }
        }
        state.rebuild_graph();

        info!(
            discovered = report.discovered.len(),
            replaced = report.replaced.len(),
            ignored = report.ignored.len(),
            errors = report.errors.len(),
            "Discovery merged"
        );
        report
    }

    /// 설정된 pluginPaths로 discover
    pub async fn discover_configured(&self) -> DiscoveryReport {
        let sources = self.config.plugin_paths.clone();
        self.discover(&sources).await
    }

    /// 백그라운드 태스크에서 discover 실행
    pub fn spawn_discovery(self: &Arc<Self>, sources: Vec<PathBuf>) -> JoinHandle<DiscoveryReport> {
        let registry = Arc::clone(self);
        tokio::spawn(async move { registry.discover(&sources).await })
    }

    /// 컴파일 타임 플러그인 디스크립터 등록
    pub async fn register_descriptor(&self, descriptor: PluginDescriptor) -> MergeOutcome {
        let mut state = self.state.write().await;
        let outcome = merge(&mut state, descriptor);
        state.rebuild_graph();
        outcome
    }

    /// 카탈로그에서 제거 (라이브 인스턴스가 없을 때만)
    pub async fn unregister(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if let Some(instance) = state.instances.get(id) {
            return Err(LifecycleError::InvalidTransition {
                plugin: id.to_string(),
                attempted: "unregister".to_string(),
                current: instance.state.to_string(),
            }
            .into());
        }
        if state.catalog.remove(id).is_none() {
            return Err(LifecycleError::NotFound(id.to_string()).into());
        }
        state.rebuild_graph();
        info!("Unregistered plugin: {}", id);
        Ok(())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    pub async fn load(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        self.lifecycle.load(&mut state, id).await
    }

    /// 카탈로그 전체를 로드 순서대로 로드
    ///
    /// 순환이 있으면 아무것도 로드하지 않는다. 실패한 플러그인의 dependents는
    /// DependencyError로 기록된다.
    pub async fn load_all(&self) -> Result<LoadReport> {
        let mut state = self.state.write().await;
        let order = state.graph().load_order().map_err(cycle_error)?;

        let mut report = LoadReport::default();
        let mut failed: BTreeSet<String> = BTreeSet::new();

        for id in order {
            if self.config.disabled.contains(&id) {
                debug!(plugin = %id, "Skipping disabled plugin");
                report.skipped.push(id);
                continue;
            }
            if state.state_of(&id).map(|s| s.is_live()).unwrap_or(false) {
                report.skipped.push(id);
                continue;
            }

            let blocked_by: Vec<String> = state
                .graph()
                .dependencies_of(&id)
                .into_iter()
                .filter(|dep| failed.contains(*dep))
                .map(String::from)
                .collect();

            let result = if blocked_by.is_empty() {
                self.lifecycle.load(&mut state, &id).await
            } else {
                let descriptor = state.catalog.get(&id).cloned();
                let unmet = descriptor
                    .map(|d| {
                        state
                            .unmet_dependencies(&d, true)
                            .into_iter()
                            .filter(|u| blocked_by.contains(&u.dependency))
                            .collect()
                    })
                    .unwrap_or_default();
                Err(DependencyError::Unmet {
                    plugin: id.clone(),
                    unmet,
                }
                .into())
            };

            match result {
                Ok(()) => report.loaded.push(id),
                Err(e) => {
                    warn!(plugin = %id, error = %e, "Failed to load plugin");
                    failed.insert(id.clone());
                    report.failed.push((id, e));
                    if !self.config.continue_on_error {
                        break;
                    }
                }
            }
        }

        info!(
            loaded = report.loaded.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Loaded plugins"
        );
        Ok(report)
    }

    /// 활성화 - 의존성 closure를 로드 순서대로 로드 + 활성화한 뒤 대상 활성화
    ///
    /// closure 전체를 먼저 검사하므로 거부되면 아무 상태도 바뀌지 않는다.
    /// 검사 후 콜백이 실패하면 이 호출이 로드/활성화한 멤버를 되돌린다.
    pub async fn enable(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.state_of(id).is_none() {
            return Err(LifecycleError::NotFound(id.to_string()).into());
        }

        let closure = state.graph().dependency_closure(id).map_err(cycle_error)?;
        self.lifecycle.check_enable(&state, id, &closure)?;

        let mut touched = Vec::new();
        if let Err(e) = self.enable_closure(&mut state, id, &closure, &mut touched).await {
            self.undo_enable(&mut state, touched).await;
            return Err(e);
        }
        Ok(())
    }

    async fn enable_closure(
        &self,
        state: &mut RegistryState,
        id: &str,
        closure: &[String],
        touched: &mut Vec<(String, PluginState)>,
    ) -> Result<()> {
        for member in closure {
            let before = state.state_of(member).unwrap_or(PluginState::NotLoaded);
            if before == PluginState::Enabled && member != id {
                continue;
            }
            touched.push((member.clone(), before));

            if before == PluginState::NotLoaded {
                self.lifecycle.load(state, member).await?;
            }
            if member != id {
                debug!(plugin = %member, dependent = %id, "Enabling dependency");
            }
            self.lifecycle.enable(state, member).await?;
        }
        Ok(())
    }

    /// 부분 활성화 되돌리기 (역순). ERROR로 간 멤버는 그대로 둔다.
    async fn undo_enable(&self, state: &mut RegistryState, touched: Vec<(String, PluginState)>) {
        for (member, before) in touched.into_iter().rev() {
            let mut result = Ok(());
            if state.state_of(&member) == Some(PluginState::Enabled) {
                result = self.lifecycle.disable(state, &member, false).await;
            }
            let loaded_here = before == PluginState::NotLoaded
                && matches!(
                    state.state_of(&member),
                    Some(PluginState::Loaded | PluginState::Disabled)
                );
            if result.is_ok() && loaded_here {
                result = self.lifecycle.unload(state, &member, false).await;
            }
            if let Err(e) = result {
                warn!(plugin = %member, error = %e, "Failed to undo partial enable");
            }
        }
    }

    pub async fn disable(&self, id: &str, cascade: bool) -> Result<()> {
        let mut state = self.state.write().await;
        self.lifecycle.disable(&mut state, id, cascade).await
    }

    pub async fn unload(&self, id: &str, cascade: bool) -> Result<()> {
        let mut state = self.state.write().await;
        self.lifecycle.unload(&mut state, id, cascade).await
    }

    /// unload 후 다시 load (ENABLED였으면 다시 활성화)
    ///
    /// 카탈로그에 더 높은 버전이 있으면 이때 적용된다.
    pub async fn reload(&self, id: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let current = state
            .state_of(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        if current.is_live() {
            self.lifecycle.unload(&mut state, id, false).await?;
        }
        self.lifecycle.load(&mut state, id).await?;
        if current == PluginState::Enabled {
            self.lifecycle.enable(&mut state, id).await?;
        }

        info!("Plugin {} reloaded", id);
        Ok(())
    }

    // ========================================================================
    // 조회 (스냅샷)
    // ========================================================================

    pub async fn state(&self, id: &str) -> Option<PluginState> {
        self.state.read().await.state_of(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.state.read().await.state_of(id).is_some()
    }

    pub async fn info(&self, id: &str) -> Option<PluginSummary> {
        let state = self.state.read().await;
        self.summarize(&state, id)
    }

    /// ID, 이름, 설명에 대한 대소문자 무시 부분 문자열 검색
    pub async fn search(&self, query: &str) -> Vec<PluginSummary> {
        let query = query.to_lowercase();
        let state = self.state.read().await;
        ids(&state)
            .into_iter()
            .filter_map(|id| self.summarize(&state, &id))
            .filter(|s| {
                s.id.to_lowercase().contains(&query)
                    || s.name.to_lowercase().contains(&query)
                    || s.description.to_lowercase().contains(&query)
            })
            .collect()
    }

    pub async fn list_all(&self) -> Vec<PluginSummary> {
        let state = self.state.read().await;
        ids(&state)
            .into_iter()
            .filter_map(|id| self.summarize(&state, &id))
            .collect()
    }

    pub async fn list_enabled(&self) -> Vec<PluginSummary> {
        let state = self.state.read().await;
        ids(&state)
            .into_iter()
            .filter(|id| state.state_of(id) == Some(PluginState::Enabled))
            .filter_map(|id| self.summarize(&state, &id))
            .collect()
    }

    pub async fn load_order(&self) -> std::result::Result<Vec<String>, CycleDetected> {
        self.state.read().await.graph().load_order()
    }

    /// 순환 위에 있는 모든 플러그인을 덮는 순환 목록
    pub async fn cycles(&self) -> Vec<Vec<String>> {
        self.state.read().await.graph().all_cycles()
    }

    /// 카탈로그 전체를 호스트 버전과 의존성에 대해 점검 (상태는 바꾸지 않음)
    pub async fn check_all(&self) -> Vec<PluginCheck> {
        let state = self.state.read().await;
        ids(&state)
            .into_iter()
            .filter_map(|id| {
                let descriptor = state.effective_descriptor(&id)?;
                Some(PluginCheck {
                    compatibility: CompatibilityChecker::check(descriptor, &self.config.host_version),
                    unmet: state.unmet_dependencies(descriptor, false),
                    cycle: state.graph().cycle_reachable_from(&id),
                    id,
                })
            })
            .collect()
    }

    /// 유효 디스크립터 스냅샷
    pub async fn descriptor(&self, id: &str) -> Option<Arc<PluginDescriptor>> {
        self.state.read().await.effective_descriptor(id).cloned()
    }

    /// 로드된 플러그인의 컨텍스트 (호스트가 설정을 주입할 때 사용)
    pub async fn context(&self, id: &str) -> Option<Arc<super::context::PluginContext>> {
        self.state.read().await.instances.get(id).map(|i| i.context.clone())
    }

    fn summarize(&self, state: &RegistryState, id: &str) -> Option<PluginSummary> {
        let plugin_state = state.state_of(id)?;
        let descriptor = state.effective_descriptor(id)?.clone();
        let instance = state.instances.get(id);

        let pending_version = state
            .catalog
            .get(id)
            .filter(|c| instance.is_some() && c.version > descriptor.version)
            .map(|c| c.version.to_string());

        Some(PluginSummary {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            version: descriptor.version.to_string(),
            description: descriptor.description.clone(),
            author: descriptor.author.clone(),
            state: plugin_state,
            capabilities: descriptor.capabilities.iter().copied().collect(),
            dependencies: descriptor.dependencies.iter().map(|d| d.to_string()).collect(),
            source: descriptor.source_display(),
            pending_version,
            instance_id: instance.map(|i| i.instance_id.to_string()),
            loaded_at: instance.map(|i| i.loaded_at),
            last_error: instance.and_then(|i| i.last_error.clone()),
            registrations: self.dispatcher.count_for_owner(id),
        })
    }

    // ========================================================================
    // Dispatch (레지스트리 락 없이 디스패처로 바로 전달)
    // ========================================================================

    pub fn fire(&self, name: &str, payload: &Value) -> DispatchReport {
        self.dispatcher.fire(name, payload)
    }

    /// 설정된 filterFailurePolicy로 filter 실행
    pub fn apply(
        &self,
        name: &str,
        value: Value,
        args: &[Value],
    ) -> std::result::Result<FilterOutcome, HookExecutionError> {
        self.dispatcher
            .apply_with(self.config.filter_failure_policy, name, value, args)
    }
}

/// ID로 디스크립터 병합 - 더 높은 버전만 교체
fn merge(state: &mut RegistryState, descriptor: PluginDescriptor) -> MergeOutcome {
    let id = descriptor.id.clone();
    let outcome = match state.catalog.get(&id) {
        None => MergeOutcome::Added,
        Some(existing) if descriptor.version > existing.version => MergeOutcome::Replaced {
            previous: existing.version.to_string(),
        },
        Some(existing) => {
            warn!(
                plugin = %id,
                existing = %existing.version,
                candidate = %descriptor.version,
                source = %descriptor.source_display(),
                "Ignoring plugin with equal or lower version"
            );
            return MergeOutcome::Ignored {
                existing: existing.version.to_string(),
            };
        }
    };

    match &outcome {
        MergeOutcome::Replaced { previous } => {
            if state.instances.contains_key(&id) {
                info!(
                    plugin = %id,
                    from = %previous,
                    to = %descriptor.version,
                    "Newer version registered, live instance keeps its version until reload"
                );
            } else {
                info!(plugin = %id, from = %previous, to = %descriptor.version, "Plugin version replaced");
            }
        }
        _ => debug!(plugin = %id, version = %descriptor.version, "Registered plugin descriptor"),
    }

    state.catalog.insert(id, Arc::new(descriptor));
    outcome
}

fn ids(state: &RegistryState) -> Vec<String> {
    let ids: BTreeSet<&String> = state.catalog.keys().chain(state.instances.keys()).collect();
    ids.into_iter().cloned().collect()
}

fn cycle_error(e: CycleDetected) -> Error {
    let plugin = e.cycle.first().cloned().unwrap_or_default();
    DependencyError::Cycle {
        plugin,
        cycle: e.cycle,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::traits::Plugin;
    use async_trait::async_trait;
    use semver::Version;

    struct Noop;

    #[async_trait]
    impl Plugin for Noop {}

    fn registry(ids: &[&str]) -> PluginRegistry {
        let entry_points = EntryPoints::new();
        for id in ids {
            entry_points.register(*id, || Arc::new(Noop) as Arc<dyn Plugin>);
        }
        PluginRegistry::new(RuntimeConfig::default().with_host_version("1.0.0"), entry_points)
    }

    fn descriptor(id: &str, version: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, Version::parse(version).unwrap())
    }

    #[tokio::test]
    async fn test_merge_keeps_highest_version() {
        let registry = registry(&["a"]);
        assert_eq!(registry.register_descriptor(descriptor("a", "1.0.0")).await, MergeOutcome::Added);
        assert_eq!(
            registry.register_descriptor(descriptor("a", "1.2.0")).await,
            MergeOutcome::Replaced { previous: "1.0.0".into() }
        );
        assert_eq!(
            registry.register_descriptor(descriptor("a", "1.1.0")).await,
            MergeOutcome::Ignored { existing: "1.2.0".into() }
        );
        assert_eq!(registry.info("a").await.unwrap().version, "1.2.0");
    }

    #[tokio::test]
    async fn test_live_instance_keeps_version_until_reload() {
        let registry = registry(&["a"]);
        registry.register_descriptor(descriptor("a", "1.0.0")).await;
        registry.enable("a").await.unwrap();

        registry.register_descriptor(descriptor("a", "2.0.0")).await;
        let info = registry.info("a").await.unwrap();
        assert_eq!(info.version, "1.0.0");
        assert_eq!(info.pending_version.as_deref(), Some("2.0.0"));

        let before = info.instance_id.clone();
        registry.reload("a").await.unwrap();
        let info = registry.info("a").await.unwrap();
        assert_eq!(info.version, "2.0.0");
        assert_eq!(info.state, PluginState::Enabled);
        assert_ne!(info.instance_id, before);
    }

    #[tokio::test]
    async fn test_enable_refused_before_touching_closure() {
        let registry = registry(&["a", "b", "c"]);
        registry
            .register_descriptor(descriptor("a", "1.0.0").with_dependency("b", "*"))
            .await;
        registry.register_descriptor(descriptor("b", "1.0.0")).await;
        registry
            .register_descriptor(descriptor("c", "1.0.0").with_dependency("b", ">=2.0.0"))
            .await;

        // b가 아직 로드되지 않은 상태에서 전체 closure 검사
        assert!(registry.enable("c").await.is_err());
        assert_eq!(registry.state("b").await, Some(PluginState::NotLoaded));

        // 라이브 b는 1.0.0 그대로 - 카탈로그에 2.0.0이 올라와도 reload 전까지 거부
        registry.enable("a").await.unwrap();
        registry.register_descriptor(descriptor("b", "2.0.0")).await;
        let err = registry.enable("c").await.unwrap_err();
        assert!(matches!(err, Error::Dependency(DependencyError::Unmet { .. })));
        assert_eq!(registry.state("b").await, Some(PluginState::Enabled));
        assert_eq!(registry.state("c").await, Some(PluginState::NotLoaded));

        let err = registry.enable("ghost").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive() {
        let registry = registry(&[]);
        registry
            .register_descriptor(descriptor("acme.markdown", "1.0.0").with_description("Markdown Export"))
            .await;
        registry.register_descriptor(descriptor("acme.pdf", "1.0.0")).await;

        let found = registry.search("MARKDOWN").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "acme.markdown");
        assert_eq!(registry.search("export").await.len(), 1);
        assert_eq!(registry.search("acme").await.len(), 2);
    }

    #[tokio::test]
    async fn test_unregister_requires_no_live_instance() {
        let registry = registry(&["a"]);
        registry.register_descriptor(descriptor("a", "1.0.0")).await;
        registry.load("a").await.unwrap();

        assert!(registry.unregister("a").await.is_err());
        registry.unload("a", false).await.unwrap();
        registry.unregister("a").await.unwrap();
        assert!(!registry.contains("a").await);
    }

    #[tokio::test]
    async fn test_load_all_skips_disabled_and_dependents_of_failures() {
        let entry_points = EntryPoints::new()
            .with("base", || Arc::new(Noop) as Arc<dyn Plugin>)
            .with("skipped", || Arc::new(Noop) as Arc<dyn Plugin>);
        let config = RuntimeConfig::default()
            .with_host_version("1.0.0")
            .with_disabled("skipped");
        let registry = PluginRegistry::new(config, entry_points);

        registry.register_descriptor(descriptor("base", "1.0.0")).await;
        registry.register_descriptor(descriptor("skipped", "1.0.0")).await;
        registry
            .register_descriptor(descriptor("broken", "1.0.0").with_entry_point("missing"))
            .await;
        registry
            .register_descriptor(descriptor("child", "1.0.0").with_dependency("broken", "*"))
            .await;

        let report = registry.load_all().await.unwrap();
        assert_eq!(report.loaded, vec!["base"]);
        assert_eq!(report.skipped, vec!["skipped"]);
        let failed: Vec<&str> = report.failed.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(failed, vec!["broken", "child"]);
        assert!(matches!(report.failed[1].1, Error::Dependency(_)));
    }

    #[tokio::test]
    async fn test_check_all_reports_without_loading() {
        let registry = registry(&[]);
        registry
            .register_descriptor(descriptor("old", "1.0.0").with_host_compatibility("<1.0.0"))
            .await;
        registry
            .register_descriptor(descriptor("orphan", "1.0.0").with_dependency("ghost", ">=1.0.0"))
            .await;
        registry.register_descriptor(descriptor("fine", "1.0.0")).await;

        let checks = registry.check_all().await;
        let by_id = |id: &str| checks.iter().find(|c| c.id == id).unwrap();
        assert!(!by_id("old").compatibility.is_compatible());
        assert_eq!(by_id("orphan").unmet.len(), 1);
        assert!(by_id("fine").is_ok());
        assert_eq!(registry.state("old").await, Some(PluginState::NotLoaded));
    }

    #[tokio::test]
    async fn test_spawn_discovery_runs_in_background() {
        let temp = tempfile::TempDir::new().unwrap();
        let dir = temp.path().join("hello");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("plugin.json"),
            r#"{ "id": "hello", "name": "Hello", "version": "0.1.0", "entryPoint": "hello" }"#,
        )
        .unwrap();

        let registry = Arc::new(registry(&["hello"]));
        let report = registry
            .spawn_discovery(vec![temp.path().to_path_buf()])
            .await
            .unwrap();
        assert_eq!(report.discovered, vec!["hello"]);
        assert_eq!(registry.state("hello").await, Some(PluginState::NotLoaded));
    }
}
