//! Lifecycle Manager - 플러그인 상태 머신
//!
//! ```text
//! NOT_LOADED ──load──▶ LOADING ──▶ LOADED ──enable──▶ ENABLED
//!                                    │  ▲               │
//!                                    │  └──(실패 시 유지)  disable
//!                                    │                  ▼
//!                                    │               DISABLED ──enable──▶ ENABLED
//!                                    └──unload──▶ UNLOADING ──▶ UNLOADED (인스턴스 제거)
//! 콜백 panic / 복구 불가능한 실패 ──▶ ERROR ──unload──▶ UNLOADED
//! ```
//!
//! 모든 메서드는 레지스트리의 쓰기 락 아래에서 `&mut RegistryState`로 호출된다.

use super::compat::CompatibilityChecker;
use super::context::{PluginContext, TemplateStore};
use super::graph::DependencyGraph;
use super::hooks::{panic_message, HookDispatcher};
use super::manifest::PluginDescriptor;
use super::traits::{EntryPoints, Plugin, PluginState};
use super::version::VersionRange;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use semver::Version;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use stencil_foundation::{
    DependencyError, Error, JsonStore, LifecycleError, Result, UnmetDependency, UnmetReason,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// ============================================================================
// PluginInstance
// ============================================================================

/// 로드된 플러그인 인스턴스
pub struct PluginInstance {
    pub(crate) state: PluginState,
    pub(crate) instance_id: Uuid,
    pub(crate) descriptor: Arc<PluginDescriptor>,
    pub(crate) plugin: Arc<dyn Plugin>,
    pub(crate) context: Arc<PluginContext>,
    pub(crate) loaded_at: DateTime<Utc>,
    pub(crate) last_error: Option<String>,
}

impl PluginInstance {
    pub fn state(&self) -> PluginState {
        self.state
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    pub fn context(&self) -> &Arc<PluginContext> {
        &self.context
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// ============================================================================
// RegistryState
// ============================================================================

/// 레지스트리 락이 보호하는 상태 (카탈로그, 인스턴스, 그래프)
#[derive(Default)]
pub struct RegistryState {
    /// 발견된 디스크립터 (ID당 최고 버전)
    pub(crate) catalog: BTreeMap<String, Arc<PluginDescriptor>>,
    /// 라이브 인스턴스
    pub(crate) instances: HashMap<String, PluginInstance>,
    pub(crate) graph: DependencyGraph,
}

impl RegistryState {
    /// 카탈로그에 없고 인스턴스도 없으면 None
    pub fn state_of(&self, id: &str) -> Option<PluginState> {
        match self.instances.get(id) {
            Some(instance) => Some(instance.state),
            None if self.catalog.contains_key(id) => Some(PluginState::NotLoaded),
            None => None,
        }
    }

    /// 라이브 인스턴스가 있으면 그 디스크립터, 없으면 카탈로그
    pub fn effective_descriptor(&self, id: &str) -> Option<&Arc<PluginDescriptor>> {
        self.instances
            .get(id)
            .map(|i| &i.descriptor)
            .or_else(|| self.catalog.get(id))
    }

    pub fn effective_version(&self, id: &str) -> Option<&Version> {
        self.effective_descriptor(id).map(|d| &d.version)
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// 유효 디스크립터 집합으로 그래프 재구성
    pub(crate) fn rebuild_graph(&mut self) {
        let ids: BTreeSet<&String> = self.catalog.keys().chain(self.instances.keys()).collect();
        let descriptors: Vec<Arc<PluginDescriptor>> = ids
            .into_iter()
            .filter_map(|id| self.effective_descriptor(id).cloned())
            .collect();
        self.graph = DependencyGraph::build(descriptors.iter().map(|d| d.as_ref()));
    }

    /// ENABLED 상태인 전이적 dependents
    pub fn enabled_dependents(&self, id: &str) -> BTreeSet<String> {
        self.graph
            .transitive_dependents(id)
            .into_iter()
            .filter(|d| self.state_of(d) == Some(PluginState::Enabled))
            .collect()
    }

    /// 의존성 검사 - 충족되지 않은 모든 의존성 반환
    pub fn unmet_dependencies(
        &self,
        descriptor: &PluginDescriptor,
        require_enabled: bool,
    ) -> Vec<UnmetDependency> {
        let mut unmet = Vec::new();

        for dep in &descriptor.dependencies {
            let reason = match VersionRange::parse(&dep.range) {
                Err(e) => Some(UnmetReason::MalformedRange { error: e.to_string() }),
                Ok(range) => match self.effective_version(&dep.plugin_id) {
                    None => Some(UnmetReason::Missing),
                    Some(version) if !range.satisfies(version) => Some(UnmetReason::VersionMismatch {
                        found: version.to_string(),
                    }),
                    Some(_) => match self.state_of(&dep.plugin_id) {
                        Some(PluginState::Enabled) => None,
                        Some(state) if require_enabled => Some(UnmetReason::NotEnabled {
                            state: state.to_string(),
                        }),
                        _ => None,
                    },
                },
            };

            if let Some(reason) = reason {
                unmet.push(UnmetDependency {
                    dependency: dep.plugin_id.clone(),
                    required: dep.range.clone(),
                    reason,
                });
            }
        }

        unmet
    }
}

// ============================================================================
// Callback 실행
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Callback {
    Load,
    Enable,
    Disable,
    Unload,
    RegisterHooks,
}

impl Callback {
    fn name(&self) -> &'static str {
        match self {
            Self::Load => "on_load",
            Self::Enable => "on_enable",
            Self::Disable => "on_disable",
            Self::Unload => "on_unload",
            Self::RegisterHooks => "register_hooks",
        }
    }
}

enum Outcome {
    Ok,
    Failed(String),
    Panicked(String),
}

impl Outcome {
    fn cause(&self) -> &str {
        match self {
            Self::Ok => "",
            Self::Failed(cause) | Self::Panicked(cause) => cause,
        }
    }
}

async fn run_callback(plugin: &Arc<dyn Plugin>, ctx: &Arc<PluginContext>, callback: Callback) -> Outcome {
    let fut = match callback {
        Callback::Load => plugin.on_load(ctx),
        Callback::Enable => plugin.on_enable(ctx),
        Callback::Disable => plugin.on_disable(ctx),
        Callback::Unload => plugin.on_unload(ctx),
        Callback::RegisterHooks => return run_register_hooks(plugin, ctx),
    };

    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Outcome::Ok,
        Ok(Err(e)) => Outcome::Failed(format!("{:#}", e)),
        Err(panic) => Outcome::Panicked(panic_message(panic.as_ref())),
    }
}

fn run_register_hooks(plugin: &Arc<dyn Plugin>, ctx: &Arc<PluginContext>) -> Outcome {
    match catch_unwind(AssertUnwindSafe(|| plugin.register_hooks(ctx))) {
        Ok(Ok(())) => Outcome::Ok,
        Ok(Err(e)) => Outcome::Failed(format!("{:#}", e)),
        Err(panic) => Outcome::Panicked(panic_message(panic.as_ref())),
    }
}

/// 콜백 실패 시 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnFailure {
    /// ERROR로 전이
    Error,
    /// 작업 전 상태 유지 (cascade 롤백용, panic은 예외)
    Restore,
}

// ============================================================================
// LifecycleManager
// ============================================================================

/// 라이프사이클 매니저
pub struct LifecycleManager {
    dispatcher: Arc<HookDispatcher>,
    entry_points: Arc<EntryPoints>,
    templates: Arc<dyn TemplateStore>,
    host_version: String,
    /// 플러그인 개별 데이터 저장소 (dataDir)
    data_store: Option<JsonStore>,
}

impl LifecycleManager {
    pub fn new(
        dispatcher: Arc<HookDispatcher>,
        entry_points: Arc<EntryPoints>,
        templates: Arc<dyn TemplateStore>,
        host_version: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            entry_points,
            templates,
            host_version: host_version.into(),
            data_store: None,
        }
    }

    pub fn with_data_store(mut self, store: JsonStore) -> Self {
        self.data_store = Some(store);
        self
    }

    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    pub fn entry_points(&self) -> &Arc<EntryPoints> {
        &self.entry_points
    }

    // ========================================================================
    // load
    // ========================================================================

    /// load 전 검사 (상태 변경 없음) - 통과하면 로드할 디스크립터 반환
    pub fn check_load(&self, state: &RegistryState, id: &str) -> Result<Arc<PluginDescriptor>> {
        if let Some(instance) = state.instances.get(id) {
            return Err(invalid(id, "load", instance.state));
        }
        let descriptor = state
            .catalog
            .get(id)
            .cloned()
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;

        // 1. 호환성
        CompatibilityChecker::check(&descriptor, &self.host_version).into_result()?;

        // 2. 순환 / 의존성 존재 + 버전
        if let Some(cycle) = state.graph.cycle_reachable_from(id) {
            return Err(DependencyError::Cycle {
                plugin: id.to_string(),
                cycle,
            }
            .into());
        }
        let unmet = state.unmet_dependencies(&descriptor, false);
        if !unmet.is_empty() {
            return Err(DependencyError::Unmet {
                plugin: id.to_string(),
                unmet,
            }
            .into());
        }

        Ok(descriptor)
    }

    /// enable 전 검사 - dependency closure 전체를 상태 변경 없이 검증
    ///
    /// `closure`는 로드 순서 (대상이 마지막). 아직 로드되지 않은 멤버는
    /// 카탈로그 디스크립터로, 라이브 멤버는 로드된 디스크립터로 판단한다.
    pub fn check_enable(&self, state: &RegistryState, id: &str, closure: &[String]) -> Result<()> {
        for member in closure {
            match current_state(state, member)? {
                PluginState::NotLoaded => {
                    let descriptor = self.check_load(state, member)?;
                    if !self.entry_points.contains(&descriptor.entry_point) {
                        return Err(Error::EntryPoint {
                            plugin: member.clone(),
                            entry_point: descriptor.entry_point.clone(),
                        });
                    }
                }
                PluginState::Enabled if member != id => {}
                PluginState::Loaded | PluginState::Disabled => {
                    let Some(instance) = state.instances.get(member) else {
                        return Err(LifecycleError::NotFound(member.clone()).into());
                    };
                    let unmet = state.unmet_dependencies(&instance.descriptor, false);
                    if !unmet.is_empty() {
                        return Err(DependencyError::Unmet {
                            plugin: member.clone(),
                            unmet,
                        }
                        .into());
                    }
                }
                other => return Err(invalid(member, "enable", other)),
            }
        }
        Ok(())
    }

    /// NOT_LOADED → LOADING → LOADED
    pub async fn load(&self, state: &mut RegistryState, id: &str) -> Result<()> {
        let descriptor = self.check_load(state, id)?;
        info!("Loading plugin: {} (v{})", id, descriptor.version);

        // 3. 엔트리포인트
        let plugin = self
            .entry_points
            .resolve(&descriptor.entry_point)
            .ok_or_else(|| Error::EntryPoint {
                plugin: id.to_string(),
                entry_point: descriptor.entry_point.clone(),
            })?;

        // 4. 컨텍스트 + 저장된 데이터
        let context = Arc::new(PluginContext::new(
            descriptor.clone(),
            self.dispatcher.clone(),
            self.templates.clone(),
        ));
        if let Some(data) = self.load_data(id) {
            context.restore_data(data);
        }

        let instance_id = Uuid::new_v4();
        state.instances.insert(
            id.to_string(),
            PluginInstance {
                state: PluginState::Loading,
                instance_id,
                descriptor: descriptor.clone(),
                plugin: plugin.clone(),
                context: context.clone(),
                loaded_at: Utc::now(),
                last_error: None,
            },
        );
        state.rebuild_graph();
        debug!(plugin = %id, instance = %instance_id, "Instance created");

        // 5. on_load
        match run_callback(&plugin, &context, Callback::Load).await {
            Outcome::Ok => {
                self.set_state(state, id, PluginState::Loaded);
                info!("Plugin {} loaded", id);
                self.fire(id, PluginState::Loaded, json!({ "instanceId": instance_id.to_string() }));
                Ok(())
            }
            failure => {
                self.enter_error(state, id, Callback::Load, failure.cause());
                Err(callback_failed(id, Callback::Load, failure.cause()))
            }
        }
    }

    // ========================================================================
    // enable
    // ========================================================================

    /// LOADED | DISABLED → ENABLED
    pub async fn enable(&self, state: &mut RegistryState, id: &str) -> Result<()> {
        let current = current_state(state, id)?;
        if !matches!(current, PluginState::Loaded | PluginState::Disabled) {
            return Err(invalid(id, "enable", current));
        }

        let descriptor = match state.instances.get(id) {
            Some(instance) => instance.descriptor.clone(),
            None => return Err(LifecycleError::NotFound(id.to_string()).into()),
        };
        let unmet = state.unmet_dependencies(&descriptor, true);
        if !unmet.is_empty() {
            warn!(plugin = %id, unmet = unmet.len(), "Enable refused, dependencies not satisfied");
            return Err(DependencyError::Unmet {
                plugin: id.to_string(),
                unmet,
            }
            .into());
        }

        let on_failure = if current == PluginState::Loaded {
            OnFailure::Restore
        } else {
            OnFailure::Error
        };
        self.enable_one(state, id, on_failure).await
    }

    async fn enable_one(&self, state: &mut RegistryState, id: &str, on_failure: OnFailure) -> Result<()> {
        let (plugin, context) = handles(state, id)?;

        let mut callback = Callback::Enable;
        let mut outcome = run_callback(&plugin, &context, callback).await;
        if matches!(outcome, Outcome::Ok) {
            callback = Callback::RegisterHooks;
            outcome = run_callback(&plugin, &context, callback).await;
        }

        match outcome {
            Outcome::Ok => {
                self.set_state(state, id, PluginState::Enabled);
                info!(
                    plugin = %id,
                    registrations = context.registrations().len(),
                    "Plugin {} enabled", id
                );
                self.fire(id, PluginState::Enabled, Value::Null);
                Ok(())
            }
            Outcome::Failed(cause) if on_failure == OnFailure::Restore => {
                // 부분 등록 제거 후 이전 상태 유지
                context.revoke_registrations();
                warn!(plugin = %id, cause = %cause, "Enable failed, keeping previous state");
                if let Some(instance) = state.instances.get_mut(id) {
                    instance.last_error = Some(cause.clone());
                }
                Err(callback_failed(id, callback, &cause))
            }
            failure => {
                self.enter_error(state, id, callback, failure.cause());
                Err(callback_failed(id, callback, failure.cause()))
            }
        }
    }

    // ========================================================================
    // disable
    // ========================================================================

    /// ENABLED → DISABLED
    pub async fn disable(&self, state: &mut RegistryState, id: &str, cascade: bool) -> Result<()> {
        let current = current_state(state, id)?;
        if current != PluginState::Enabled {
            return Err(invalid(id, "disable", current));
        }

        let dependents = self.blocking_dependents(state, id, "disable", cascade)?;
        if dependents.is_empty() {
            return self.disable_one(state, id, OnFailure::Error).await;
        }

        let disabled = self.cascade_disable(state, &dependents).await?;
        if let Err(e) = self.disable_one(state, id, OnFailure::Restore).await {
            let left = self.rollback(state, &disabled).await;
            return Err(with_left_disabled(e, left));
        }
        Ok(())
    }

    async fn disable_one(&self, state: &mut RegistryState, id: &str, on_failure: OnFailure) -> Result<()> {
        let (plugin, context) = handles(state, id)?;

        match run_callback(&plugin, &context, Callback::Disable).await {
            Outcome::Ok => {
                let removed = context.revoke_registrations();
                self.set_state(state, id, PluginState::Disabled);
                info!(plugin = %id, removed, "Plugin {} disabled", id);
                self.fire(id, PluginState::Disabled, Value::Null);
                Ok(())
            }
            Outcome::Failed(cause) if on_failure == OnFailure::Restore => {
                warn!(plugin = %id, cause = %cause, "Disable failed, keeping previous state");
                if let Some(instance) = state.instances.get_mut(id) {
                    instance.last_error = Some(cause.clone());
                }
                Err(callback_failed(id, Callback::Disable, &cause))
            }
            failure => {
                self.enter_error(state, id, Callback::Disable, failure.cause());
                Err(callback_failed(id, Callback::Disable, failure.cause()))
            }
        }
    }

    // ========================================================================
    // unload
    // ========================================================================

    /// LOADED | ENABLED | DISABLED | ERROR → UNLOADING → UNLOADED
    pub async fn unload(&self, state: &mut RegistryState, id: &str, cascade: bool) -> Result<()> {
        let current = current_state(state, id)?;
        match current {
            PluginState::Loaded
            | PluginState::Enabled
            | PluginState::Disabled
            | PluginState::Error => {}
            other => return Err(invalid(id, "unload", other)),
        }

        let dependents = self.blocking_dependents(state, id, "unload", cascade)?;
        let disabled = self.cascade_disable(state, &dependents).await?;

        if current == PluginState::Error {
            // 복구 경로: on_unload 생략
            self.evict(state, id);
            return Ok(());
        }

        let on_failure = if dependents.is_empty() {
            OnFailure::Error
        } else {
            OnFailure::Restore
        };

        let (plugin, context) = handles(state, id)?;
        self.set_state(state, id, PluginState::Unloading);

        match run_callback(&plugin, &context, Callback::Unload).await {
            Outcome::Ok => {
                self.evict(state, id);
                Ok(())
            }
            Outcome::Failed(cause) if on_failure == OnFailure::Restore => {
                warn!(plugin = %id, cause = %cause, "Unload failed, keeping previous state");
                if let Some(instance) = state.instances.get_mut(id) {
                    instance.state = current;
                    instance.last_error = Some(cause.clone());
                }
                let left = self.rollback(state, &disabled).await;
                Err(with_left_disabled(callback_failed(id, Callback::Unload, &cause), left))
            }
            failure => {
                context.revoke();
                self.enter_error(state, id, Callback::Unload, failure.cause());
                let left = self.rollback(state, &disabled).await;
                Err(with_left_disabled(
                    callback_failed(id, Callback::Unload, failure.cause()),
                    left,
                ))
            }
        }
    }

    /// 컨텍스트 폐기, 데이터 저장, 인스턴스 제거
    fn evict(&self, state: &mut RegistryState, id: &str) {
        let Some(instance) = state.instances.remove(id) else {
            return;
        };
        let removed = instance.context.revoke();
        self.save_data(id, &instance.context);
        state.rebuild_graph();
        info!(
            plugin = %id,
            instance = %instance.instance_id,
            removed,
            "Plugin {} unloaded", id
        );
    }

    // ========================================================================
    // cascade
    // ========================================================================

    /// ENABLED dependents 확인 - cascade가 아니면 거부
    fn blocking_dependents(
        &self,
        state: &RegistryState,
        id: &str,
        operation: &str,
        cascade: bool,
    ) -> Result<Vec<String>> {
        let dependents = state.enabled_dependents(id);
        if dependents.is_empty() {
            return Ok(vec![]);
        }
        if !cascade {
            return Err(LifecycleError::DependentsActive {
                plugin: id.to_string(),
                operation: operation.to_string(),
                blocking: dependents.into_iter().collect(),
            }
            .into());
        }

        // 가장 깊은 dependent부터 (로드 순서의 역순)
        let mut order = state.graph.order_subset(&dependents).map_err(|e| DependencyError::Cycle {
            plugin: id.to_string(),
            cycle: e.cycle,
        })?;
        order.reverse();
        Ok(order)
    }

    /// dependents를 순서대로 비활성화 - 실패하면 되돌리고 에러 반환
    async fn cascade_disable(&self, state: &mut RegistryState, order: &[String]) -> Result<Vec<String>> {
        // 시작 전에 전부 검증
        for dependent in order {
            let current = current_state(state, dependent)?;
            if current != PluginState::Enabled {
                return Err(invalid(dependent, "disable", current));
            }
        }

        let mut disabled = Vec::with_capacity(order.len());
        for dependent in order {
            debug!(plugin = %dependent, "Cascade disabling dependent");
            if let Err(e) = self.disable_one(state, dependent, OnFailure::Restore).await {
                let left = self.rollback(state, &disabled).await;
                return Err(with_left_disabled(e, left));
            }
            disabled.push(dependent.clone());
        }
        Ok(disabled)
    }

    /// cascade로 비활성화한 dependents를 역순으로 재활성화
    ///
    /// 의존성이 더 이상 충족되지 않는 dependent는 DISABLED로 남기고 반환한다.
    async fn rollback(&self, state: &mut RegistryState, disabled: &[String]) -> Vec<String> {
        let mut left = Vec::new();
        for id in disabled.iter().rev() {
            if state.state_of(id) != Some(PluginState::Disabled) {
                continue;
            }
            let unmet = match state.instances.get(id) {
                Some(instance) => state.unmet_dependencies(&instance.descriptor, true),
                None => continue,
            };
            if !unmet.is_empty() {
                warn!(plugin = %id, unmet = unmet.len(), "Dependencies no longer satisfied, leaving disabled");
                left.push(id.clone());
                continue;
            }
            if let Err(e) = self.enable_one(state, id, OnFailure::Error).await {
                error!(plugin = %id, error = %e, "Failed to restore plugin during cascade rollback");
                left.push(id.clone());
            }
        }
        left
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn set_state(&self, state: &mut RegistryState, id: &str, next: PluginState) {
        if let Some(instance) = state.instances.get_mut(id) {
            debug!(plugin = %id, from = %instance.state, to = %next, "State transition");
            instance.state = next;
            if next != PluginState::Error {
                instance.last_error = None;
            }
        }
    }

    /// ERROR 진입 - 등록은 항상 해제
    fn enter_error(&self, state: &mut RegistryState, id: &str, callback: Callback, cause: &str) {
        if let Some(instance) = state.instances.get_mut(id) {
            instance.state = PluginState::Error;
            instance.last_error = Some(cause.to_string());
            instance.context.revoke_registrations();
        }
        error!(plugin = %id, callback = callback.name(), cause, "Plugin {} entered error state", id);
        self.fire(
            id,
            PluginState::Error,
            json!({ "callback": callback.name(), "error": cause }),
        );
    }

    /// plugin:* 라이프사이클 hook 발행
    fn fire(&self, id: &str, next: PluginState, extra: Value) {
        let hook = match next {
            PluginState::Loaded => "plugin:loaded",
            PluginState::Enabled => "plugin:enabled",
            PluginState::Disabled => "plugin:disabled",
            PluginState::Error => "plugin:error",
            _ => return,
        };

        let mut payload = json!({ "pluginId": id, "state": next.as_str() });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            target.extend(extra);
        }
        self.dispatcher.fire(hook, &payload);
    }

    fn data_file(id: &str) -> String {
        format!("{}.json", id)
    }

    fn load_data(&self, id: &str) -> Option<Map<String, Value>> {
        let store = self.data_store.as_ref()?;
        match store.load_optional::<Map<String, Value>>(&Self::data_file(id)) {
            Ok(data) => data,
            Err(e) => {
                warn!(plugin = %id, error = %e, "Failed to read plugin data, starting empty");
                None
            }
        }
    }

    fn save_data(&self, id: &str, context: &PluginContext) {
        let Some(store) = &self.data_store else {
            return;
        };
        let data = context.data_snapshot();
        if data.is_empty() && !store.exists(&Self::data_file(id)) {
            return;
        }
        if let Err(e) = store.save(&Self::data_file(id), &data) {
            warn!(plugin = %id, error = %e, "Failed to persist plugin data");
        }
    }
}

fn current_state(state: &RegistryState, id: &str) -> Result<PluginState> {
    state
        .state_of(id)
        .ok_or_else(|| LifecycleError::NotFound(id.to_string()).into())
}

fn handles(state: &RegistryState, id: &str) -> Result<(Arc<dyn Plugin>, Arc<PluginContext>)> {
    state
        .instances
        .get(id)
        .map(|i| (i.plugin.clone(), i.context.clone()))
        .ok_or_else(|| LifecycleError::NotFound(id.to_string()).into())
}

fn invalid(id: &str, attempted: &str, current: PluginState) -> Error {
    LifecycleError::InvalidTransition {
        plugin: id.to_string(),
        attempted: attempted.to_string(),
        current: current.to_string(),
    }
    .into()
}

fn callback_failed(id: &str, callback: Callback, cause: &str) -> Error {
    LifecycleError::CallbackFailed {
        plugin: id.to_string(),
        callback: callback.name().to_string(),
        message: cause.to_string(),
        left_disabled: Vec::new(),
    }
    .into()
}

fn with_left_disabled(err: Error, left: Vec<String>) -> Error {
    match err {
        Error::Lifecycle(LifecycleError::CallbackFailed {
            plugin,
            callback,
            message,
            ..
        }) if !left.is_empty() => LifecycleError::CallbackFailed {
            plugin,
            callback,
            message,
            left_disabled: left,
        }
        .into(),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::context::MemoryTemplateStore;
    use crate::plugin::manifest::Capability;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
        fail_enable: Mutex<bool>,
        fail_disable: Mutex<bool>,
        panic_disable: bool,
    }

    #[async_trait]
    impl Plugin for Recorder {
        async fn on_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.calls.lock().push("load");
            Ok(())
        }

        async fn on_enable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.calls.lock().push("enable");
            if *self.fail_enable.lock() {
                anyhow::bail!("enable refused");
            }
            Ok(())
        }

        async fn on_disable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.calls.lock().push("disable");
            if self.panic_disable {
                panic!("disable exploded");
            }
            if *self.fail_disable.lock() {
                anyhow::bail!("disable refused");
            }
            Ok(())
        }

        async fn on_unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
            self.calls.lock().push("unload");
            Ok(())
        }

        fn register_hooks(&self, ctx: &PluginContext) -> anyhow::Result<()> {
            ctx.register_hook("template:created", |_| Ok(()))?;
            Ok(())
        }
    }

    struct Fixture {
        manager: LifecycleManager,
        dispatcher: Arc<HookDispatcher>,
        state: RegistryState,
    }

    fn fixture(descriptors: Vec<PluginDescriptor>, plugins: Vec<(&str, Arc<Recorder>)>) -> Fixture {
        let dispatcher = Arc::new(HookDispatcher::new());
        let entry_points = EntryPoints::new();
        for (name, plugin) in plugins {
            entry_points.register(name, move || plugin.clone() as Arc<dyn Plugin>);
        }
        let manager = LifecycleManager::new(
            dispatcher.clone(),
            Arc::new(entry_points),
            Arc::new(MemoryTemplateStore::new()),
            "1.0.0",
        );

        let mut state = RegistryState::default();
        for d in descriptors {
            state.catalog.insert(d.id.clone(), Arc::new(d));
        }
        state.rebuild_graph();
        Fixture { manager, dispatcher, state }
    }

    fn descriptor(id: &str) -> PluginDescriptor {
        PluginDescriptor::new(id, id, Version::new(1, 0, 0)).with_capability(Capability::Hooks)
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let plugin = Arc::new(Recorder::default());
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin.clone())]);

        f.manager.load(&mut f.state, "a").await.unwrap();
        assert_eq!(f.state.state_of("a"), Some(PluginState::Loaded));

        f.manager.enable(&mut f.state, "a").await.unwrap();
        assert_eq!(f.dispatcher.count_for_owner("a"), 1);

        f.manager.disable(&mut f.state, "a", false).await.unwrap();
        assert_eq!(f.dispatcher.count_for_owner("a"), 0);

        f.manager.unload(&mut f.state, "a", false).await.unwrap();
        assert_eq!(f.state.state_of("a"), Some(PluginState::NotLoaded));
        assert_eq!(*plugin.calls.lock(), vec!["load", "enable", "disable", "unload"]);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let plugin = Arc::new(Recorder::default());
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin)]);

        let err = f.manager.enable(&mut f.state, "a").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::InvalidTransition { .. })));

        f.manager.load(&mut f.state, "a").await.unwrap();
        let err = f.manager.load(&mut f.state, "a").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::InvalidTransition { .. })));
        let err = f.manager.disable(&mut f.state, "a", false).await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::InvalidTransition { .. })));

        let err = f.manager.load(&mut f.state, "ghost").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_enable_while_enabled_is_rejected() {
        let plugin = Arc::new(Recorder::default());
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin.clone())]);

        f.manager.load(&mut f.state, "a").await.unwrap();
        f.manager.enable(&mut f.state, "a").await.unwrap();

        let err = f.manager.enable(&mut f.state, "a").await.unwrap_err();
        match err {
            Error::Lifecycle(LifecycleError::InvalidTransition { attempted, current, .. }) => {
                assert_eq!(attempted, "enable");
                assert_eq!(current, PluginState::Enabled.to_string());
            }
            other => panic!("expected invalid transition, got {}", other),
        }
        assert_eq!(f.state.state_of("a"), Some(PluginState::Enabled));
        assert_eq!(f.dispatcher.count_for_owner("a"), 1);
        assert_eq!(plugin.calls.lock().iter().filter(|c| **c == "enable").count(), 1);
    }

    #[tokio::test]
    async fn test_cascade_panic_leaves_dependent_disabled() {
        let dependent = Arc::new(Recorder::default());
        let dependency = Arc::new(Recorder {
            panic_disable: true,
            ..Default::default()
        });
        let mut f = fixture(
            vec![descriptor("a").with_dependency("b", ">=1.0.0"), descriptor("b")],
            vec![("a", dependent.clone()), ("b", dependency)],
        );

        for id in ["b", "a"] {
            f.manager.load(&mut f.state, id).await.unwrap();
            f.manager.enable(&mut f.state, id).await.unwrap();
        }

        let err = f.manager.disable(&mut f.state, "b", true).await.unwrap_err();
        assert_eq!(f.state.state_of("b"), Some(PluginState::Error));
        assert_eq!(f.state.state_of("a"), Some(PluginState::Disabled));
        assert_eq!(f.dispatcher.count_for_owner("a"), 0);
        match err {
            Error::Lifecycle(e) => assert_eq!(e.left_disabled(), ["a".to_string()]),
            other => panic!("expected lifecycle error, got {}", other),
        }
        // a는 재활성화되지 않았다
        assert_eq!(dependent.calls.lock().iter().filter(|c| **c == "enable").count(), 1);
    }

    #[tokio::test]
    async fn test_cascade_failure_restores_dependents() {
        let dependent = Arc::new(Recorder::default());
        let dependency = Arc::new(Recorder::default());
        let mut f = fixture(
            vec![descriptor("a").with_dependency("b", "*"), descriptor("b")],
            vec![("a", dependent.clone()), ("b", dependency.clone())],
        );

        for id in ["b", "a"] {
            f.manager.load(&mut f.state, id).await.unwrap();
            f.manager.enable(&mut f.state, id).await.unwrap();
        }

        // b의 on_disable 실패 (panic 아님) → b는 ENABLED 유지, a는 복구
        *dependency.fail_disable.lock() = true;
        let err = f.manager.disable(&mut f.state, "b", true).await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::CallbackFailed { .. })));
        assert_eq!(f.state.state_of("b"), Some(PluginState::Enabled));
        assert_eq!(f.state.state_of("a"), Some(PluginState::Enabled));
        assert_eq!(f.dispatcher.count_for_owner("a"), 1);
    }

    #[tokio::test]
    async fn test_enable_failure_from_loaded_keeps_state() {
        let plugin = Arc::new(Recorder::default());
        *plugin.fail_enable.lock() = true;
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin.clone())]);

        f.manager.load(&mut f.state, "a").await.unwrap();
        let err = f.manager.enable(&mut f.state, "a").await.unwrap_err();
        assert!(matches!(err, Error::Lifecycle(LifecycleError::CallbackFailed { .. })));
        assert_eq!(f.state.state_of("a"), Some(PluginState::Loaded));

        *plugin.fail_enable.lock() = false;
        f.manager.enable(&mut f.state, "a").await.unwrap();
        assert_eq!(f.state.state_of("a"), Some(PluginState::Enabled));
    }

    #[tokio::test]
    async fn test_enable_failure_from_disabled_is_error() {
        let plugin = Arc::new(Recorder::default());
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin.clone())]);

        f.manager.load(&mut f.state, "a").await.unwrap();
        f.manager.enable(&mut f.state, "a").await.unwrap();
        f.manager.disable(&mut f.state, "a", false).await.unwrap();

        *plugin.fail_enable.lock() = true;
        assert!(f.manager.enable(&mut f.state, "a").await.is_err());
        assert_eq!(f.state.state_of("a"), Some(PluginState::Error));
        assert!(f.manager.enable(&mut f.state, "a").await.is_err());

        // ERROR에서는 unload만 허용
        f.manager.unload(&mut f.state, "a", false).await.unwrap();
        assert_eq!(f.state.state_of("a"), Some(PluginState::NotLoaded));
        assert_eq!(plugin.calls.lock().iter().filter(|c| **c == "unload").count(), 0);

        *plugin.fail_enable.lock() = false;
        f.manager.load(&mut f.state, "a").await.unwrap();
    }

    #[tokio::test]
    async fn test_panic_moves_to_error_and_revokes() {
        let plugin = Arc::new(Recorder {
            panic_disable: true,
            ..Default::default()
        });
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin)]);

        f.manager.load(&mut f.state, "a").await.unwrap();
        f.manager.enable(&mut f.state, "a").await.unwrap();
        assert_eq!(f.dispatcher.count_for_owner("a"), 1);

        let err = f.manager.disable(&mut f.state, "a", false).await.unwrap_err();
        assert!(err.to_string().contains("disable exploded"));
        assert_eq!(f.state.state_of("a"), Some(PluginState::Error));
        assert_eq!(f.dispatcher.count_for_owner("a"), 0);
    }

    #[tokio::test]
    async fn test_unresolved_entry_point() {
        let mut f = fixture(vec![descriptor("a").with_entry_point("nowhere")], vec![]);
        let err = f.manager.load(&mut f.state, "a").await.unwrap_err();
        assert!(matches!(err, Error::EntryPoint { .. }));
        assert_eq!(f.state.state_of("a"), Some(PluginState::NotLoaded));
    }

    #[tokio::test]
    async fn test_lifecycle_hooks_fired() {
        let plugin = Arc::new(Recorder::default());
        let mut f = fixture(vec![descriptor("a")], vec![("a", plugin)]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for hook in ["plugin:loaded", "plugin:enabled", "plugin:disabled"] {
            let seen = seen.clone();
            f.dispatcher.register_hook(
                hook,
                "host",
                1,
                crate::plugin::hooks::hook_fn(move |payload| {
                    seen.lock().push(format!(
                        "{}:{}",
                        payload["pluginId"].as_str().unwrap_or_default(),
                        payload["state"].as_str().unwrap_or_default()
                    ));
                    Ok(())
                }),
            );
        }

        f.manager.load(&mut f.state, "a").await.unwrap();
        f.manager.enable(&mut f.state, "a").await.unwrap();
        f.manager.disable(&mut f.state, "a", false).await.unwrap();

        assert_eq!(*seen.lock(), vec!["a:loaded", "a:enabled", "a:disabled"]);
    }
}
