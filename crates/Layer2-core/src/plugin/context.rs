//! Plugin Context - 플러그인이 호스트와 상호작용하는 유일한 창구
//!
//! 모든 메서드는 먼저 선언된 capability를 검사한다. 컨텍스트는 로드 시점에
//! 생성되고 UNLOADING에서 폐기되며, 그 이후의 모든 호출은 `SandboxViolation`
//! (reason = Revoked)으로 실패한다.

use super::hooks::{hook_fn, filter_fn, HookDispatcher, RegistrationId, ValueContract};
use super::manifest::{Capability, PluginDescriptor};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stencil_foundation::{
    CallbackKind, Error, Result, SandboxViolation, ValidationError, ViolationReason,
};
use tracing::{debug, error, info, trace, warn};

// ============================================================================
// TemplateStore - 호스트 템플릿 저장소
// ============================================================================

/// 호스트가 제공하는 템플릿 저장소
pub trait TemplateStore: Send + Sync {
    fn read(&self, name: &str) -> anyhow::Result<Option<String>>;

    fn write(&self, name: &str, content: &str) -> anyhow::Result<()>;

    fn list(&self) -> Vec<String>;
}

/// 메모리 템플릿 저장소
#[derive(Debug, Default)]
pub struct MemoryTemplateStore {
    templates: RwLock<BTreeMap<String, String>>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.templates.write().insert(name.into(), content.into());
        self
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn read(&self, name: &str) -> anyhow::Result<Option<String>> {
        Ok(self.templates.read().get(name).cloned())
    }

    fn write(&self, name: &str, content: &str) -> anyhow::Result<()> {
        self.templates.write().insert(name.to_string(), content.to_string());
        Ok(())
    }

    fn list(&self) -> Vec<String> {
        self.templates.read().keys().cloned().collect()
    }
}

// ============================================================================
// LogLevel
// ============================================================================

/// 플러그인 로그 레벨
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ============================================================================
// PluginContext
// ============================================================================

/// 플러그인 컨텍스트
pub struct PluginContext {
    descriptor: Arc<PluginDescriptor>,
    dispatcher: Arc<HookDispatcher>,
    templates: Arc<dyn TemplateStore>,

    /// UNLOADING에서 false
    alive: AtomicBool,

    /// 이 플러그인이 소유한 등록 ID
    owned: Mutex<BTreeSet<RegistrationId>>,

    /// 플러그인 개별 데이터 (storage)
    data: RwLock<Map<String, Value>>,

    /// 플러그인 설정 (config)
    config: RwLock<Map<String, Value>>,
}

impl PluginContext {
    pub fn new(
        descriptor: Arc<PluginDescriptor>,
        dispatcher: Arc<HookDispatcher>,
        templates: Arc<dyn TemplateStore>,
    ) -> Self {
        let config = schema_defaults(descriptor.config_schema.as_ref());
        Self {
            descriptor,
            dispatcher,
            templates,
            alive: AtomicBool::new(true),
            owned: Mutex::new(BTreeSet::new()),
            data: RwLock::new(Map::new()),
            config: RwLock::new(config),
        }
    }

    pub fn plugin_id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.descriptor.capabilities
    }

    pub fn is_revoked(&self) -> bool {
        !self.alive.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Capability 검사
    // ========================================================================

    fn violation(&self, capability: &str, reason: ViolationReason) -> Error {
        let violation = SandboxViolation {
            plugin: self.descriptor.id.clone(),
            capability: capability.to_string(),
            reason,
        };
        warn!(plugin = %violation.plugin, capability, %reason, "Sandbox violation");
        violation.into()
    }

    fn check(&self, capability: Capability) -> Result<()> {
        if self.is_revoked() {
            return Err(self.violation(capability.as_str(), ViolationReason::Revoked));
        }
        if !self.descriptor.has_capability(capability) {
            return Err(self.violation(capability.as_str(), ViolationReason::NotGranted));
        }
        Ok(())
    }

    /// capability가 선언되어 있는지 확인 (예: 네트워크 I/O 전에 `network`)
    pub fn require(&self, capability: Capability) -> Result<()> {
        self.check(capability)
    }

    // ========================================================================
    // Hook / Filter 등록
    // ========================================================================

    pub fn register_hook<F>(&self, name: &str, callback: F) -> Result<RegistrationId>
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register_hook_with_priority(name, self.dispatcher.default_priority(), callback)
    }

    pub fn register_hook_with_priority<F>(
        &self,
        name: &str,
        priority: i32,
        callback: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        // owned 락을 잡은 채로 검사 → 등록해야 revoke와 엇갈리지 않는다
        let mut owned = self.owned.lock();
        self.check(Capability::Hooks)?;
        let id = self
            .dispatcher
            .register_hook(name, &self.descriptor.id, priority, hook_fn(callback));
        owned.insert(id);
        Ok(id)
    }

    pub fn register_filter<F>(&self, name: &str, callback: F) -> Result<RegistrationId>
    where
        F: Fn(Value, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_filter_with_priority(name, self.dispatcher.default_priority(), callback)
    }

    pub fn register_filter_with_priority<F>(
        &self,
        name: &str,
        priority: i32,
        callback: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(Value, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.register_filter_with_contract(name, priority, ValueContract::builtin(name), callback)
    }

    /// 값 계약을 명시해서 filter 등록
    pub fn register_filter_with_contract<F>(
        &self,
        name: &str,
        priority: i32,
        contract: ValueContract,
        callback: F,
    ) -> Result<RegistrationId>
    where
        F: Fn(Value, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let mut owned = self.owned.lock();
        self.check(Capability::Filters)?;
        let id = self.dispatcher.register_filter(
            name,
            &self.descriptor.id,
            priority,
            contract,
            filter_fn(callback),
        );
        owned.insert(id);
        Ok(id)
    }

    /// 자신이 등록한 hook/filter 해제 (다른 플러그인의 ID면 false)
    pub fn unregister(&self, id: RegistrationId) -> Result<bool> {
        let mut owned = self.owned.lock();
        let capability = match self.dispatcher.kind_of(id) {
            Some(CallbackKind::Hook) => Capability::Hooks,
            Some(CallbackKind::Filter) => Capability::Filters,
            None if self.is_revoked() => {
                return Err(self.violation(Capability::Hooks.as_str(), ViolationReason::Revoked));
            }
            None => return Ok(false),
        };
        self.check(capability)?;

        if !owned.remove(&id) {
            return Ok(false);
        }
        Ok(self.dispatcher.unregister(id))
    }

    /// 현재 소유한 등록 ID
    pub fn registrations(&self) -> Vec<RegistrationId> {
        self.owned.lock().iter().copied().collect()
    }

    /// 소유한 모든 등록 해제 (disable / ERROR 진입)
    pub(crate) fn revoke_registrations(&self) -> usize {
        let mut owned = self.owned.lock();
        owned.clear();
        self.dispatcher.unregister_by_owner(&self.descriptor.id)
    }

    /// 컨텍스트 폐기 (UNLOADING) - 이후 모든 호출 실패
    pub(crate) fn revoke(&self) -> usize {
        self.alive.store(false, Ordering::SeqCst);
        let removed = self.revoke_registrations();
        debug!(plugin = %self.descriptor.id, removed, "Context revoked");
        removed
    }

    // ========================================================================
    // Storage
    // ========================================================================

    pub fn get_plugin_data(&self, key: &str) -> Result<Option<Value>> {
        self.check(Capability::Storage)?;
        Ok(self.data.read().get(key).cloned())
    }

    pub fn set_plugin_data(&self, key: impl Into<String>, value: Value) -> Result<()> {
        self.check(Capability::Storage)?;
        self.data.write().insert(key.into(), value);
        Ok(())
    }

    pub fn remove_plugin_data(&self, key: &str) -> Result<Option<Value>> {
        self.check(Capability::Storage)?;
        Ok(self.data.write().remove(key))
    }

    pub(crate) fn data_snapshot(&self) -> Map<String, Value> {
        self.data.read().clone()
    }

    pub(crate) fn restore_data(&self, data: Map<String, Value>) {
        *self.data.write() = data;
    }

    // ========================================================================
    // Config
    // ========================================================================

    pub fn get_config(&self, key: &str) -> Result<Option<Value>> {
        self.check(Capability::Config)?;
        Ok(self.config.read().get(key).cloned())
    }

    /// 설정 값 변경 - configSchema가 있으면 타입 검증
    pub fn set_config(&self, key: impl Into<String>, value: Value) -> Result<()> {
        self.check(Capability::Config)?;
        let key = key.into();
        self.validate_config(&key, &value)?;
        self.config.write().insert(key, value);
        Ok(())
    }

    pub fn config_snapshot(&self) -> Map<String, Value> {
        self.config.read().clone()
    }

    fn validate_config(&self, key: &str, value: &Value) -> Result<()> {
        let Some(schema) = &self.descriptor.config_schema else {
            return Ok(());
        };
        let fail = |message: String| -> Error {
            ValidationError::new(
                self.descriptor.source.clone().unwrap_or_else(|| PathBuf::from(&self.descriptor.id)),
                message,
            )
            .into()
        };

        let property = schema.get("properties").and_then(|p| p.get(key));
        let Some(property) = property else {
            if schema.get("additionalProperties") == Some(&Value::Bool(false)) {
                return Err(fail(format!("config key '{}' is not declared in configSchema", key)));
            }
            return Ok(());
        };

        if let Some(expected) = property.get("type").and_then(Value::as_str) {
            if !json_type_matches(expected, value) {
                return Err(fail(format!(
                    "config key '{}' expects {}, got {}",
                    key,
                    expected,
                    json_type_name(value)
                )));
            }
        }
        if let Some(allowed) = property.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                return Err(fail(format!("config key '{}' must be one of {}", key, Value::Array(allowed.clone()))));
            }
        }
        Ok(())
    }

    // ========================================================================
    // Templates
    // ========================================================================

    pub fn read_template(&self, name: &str) -> Result<Option<String>> {
        self.check(Capability::ReadTemplates)?;
        self.templates
            .read(name)
            .map_err(|e| Error::Storage(format!("template '{}': {:#}", name, e)))
    }

    /// 템플릿 저장 후 template:created / template:modified hook 발행
    pub fn write_template(&self, name: &str, content: &str) -> Result<()> {
        self.check(Capability::WriteTemplates)?;
        let existed = self.templates.list().iter().any(|n| n == name);
        self.templates
            .write(name, content)
            .map_err(|e| Error::Storage(format!("template '{}': {:#}", name, e)))?;

        let hook = if existed { "template:modified" } else { "template:created" };
        self.dispatcher
            .fire(hook, &json!({ "name": name, "pluginId": self.descriptor.id }));
        Ok(())
    }

    // ========================================================================
    // Log
    // ========================================================================

    pub fn log(&self, level: LogLevel, message: &str) -> Result<()> {
        self.check(Capability::Log)?;
        let plugin = self.descriptor.id.as_str();
        match level {
            LogLevel::Trace => trace!(plugin, "{}", message),
            LogLevel::Debug => debug!(plugin, "{}", message),
            LogLevel::Info => info!(plugin, "{}", message),
            LogLevel::Warn => warn!(plugin, "{}", message),
            LogLevel::Error => error!(plugin, "{}", message),
        }
        Ok(())
    }
}

impl fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin", &self.descriptor.id)
            .field("revoked", &self.is_revoked())
            .field("registrations", &self.owned.lock().len())
            .finish()
    }
}

/// configSchema의 default 값으로 초기 설정 구성
fn schema_defaults(schema: Option<&Value>) -> Map<String, Value> {
    schema
        .and_then(|s| s.get("properties"))
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .filter_map(|(key, prop)| prop.get("default").map(|d| (key.clone(), d.clone())))
                .collect()
        })
        .unwrap_or_default()
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn context(caps: &[Capability]) -> (PluginContext, Arc<HookDispatcher>) {
        let descriptor = PluginDescriptor::new("acme.test", "Test", Version::new(1, 0, 0))
            .with_capabilities(caps.iter().copied())
            .with_config_schema(json!({
                "properties": {
                    "theme": { "type": "string", "default": "light" },
                    "width": { "type": "integer" },
                    "mode": { "enum": ["fast", "slow"] }
                }
            }));
        let dispatcher = Arc::new(HookDispatcher::new());
        let ctx = PluginContext::new(
            Arc::new(descriptor),
            dispatcher.clone(),
            Arc::new(MemoryTemplateStore::new()),
        );
        (ctx, dispatcher)
    }

    fn sandbox_reason(err: Error) -> ViolationReason {
        match err {
            Error::Sandbox(v) => v.reason,
            other => panic!("expected sandbox violation, got {}", other),
        }
    }

    #[test]
    fn test_undeclared_capability_is_refused() {
        let (ctx, dispatcher) = context(&[Capability::Storage]);

        let err = ctx.register_hook("template:created", |_| Ok(())).unwrap_err();
        assert_eq!(sandbox_reason(err), ViolationReason::NotGranted);
        assert!(dispatcher.is_empty());

        let err = ctx.require(Capability::Network).unwrap_err();
        assert_eq!(err.plugin_id(), Some("acme.test"));
        assert!(ctx.log(LogLevel::Info, "hi").is_err());
        assert!(ctx.set_plugin_data("k", json!(1)).is_ok());
    }

    #[test]
    fn test_registrations_are_tracked_and_revoked() {
        let (ctx, dispatcher) = context(&[Capability::Hooks, Capability::Filters]);

        ctx.register_hook("template:created", |_| Ok(())).unwrap();
        ctx.register_filter_with_priority("template_data", 1, |v, _| Ok(v)).unwrap();
        assert_eq!(ctx.registrations().len(), 2);
        assert_eq!(dispatcher.count_for_owner("acme.test"), 2);

        assert_eq!(ctx.revoke_registrations(), 2);
        assert!(ctx.registrations().is_empty());
        assert!(dispatcher.is_empty());
        assert!(!ctx.is_revoked());
    }

    #[test]
    fn test_unregister_only_own_registrations() {
        let (ctx, dispatcher) = context(&[Capability::Hooks]);
        let foreign = dispatcher.register_hook("template:created", "other", 1, hook_fn(|_| Ok(())));
        let own = ctx.register_hook("template:created", |_| Ok(())).unwrap();

        assert!(!ctx.unregister(foreign).unwrap());
        assert!(dispatcher.is_registered(foreign));
        assert!(ctx.unregister(own).unwrap());
        assert!(!dispatcher.is_registered(own));
    }

    #[test]
    fn test_unregister_checks_capability_of_registration_kind() {
        let (ctx, dispatcher) = context(&[Capability::Hooks]);
        let filter = dispatcher.register_filter(
            "template_data",
            "other",
            1,
            ValueContract::builtin("template_data"),
            filter_fn(|v, _| Ok(v)),
        );

        let err = ctx.unregister(filter).unwrap_err();
        match err {
            Error::Sandbox(v) => {
                assert_eq!(v.capability, "filters");
                assert_eq!(v.reason, ViolationReason::NotGranted);
            }
            other => panic!("expected sandbox violation, got {}", other),
        }
        assert!(dispatcher.is_registered(filter));
        assert_eq!(dispatcher.kind_of(filter), Some(CallbackKind::Filter));
    }

    #[test]
    fn test_revoked_context_rejects_everything() {
        let (ctx, dispatcher) = context(&[Capability::Hooks, Capability::Storage]);
        ctx.register_hook("plugin:loaded", |_| Ok(())).unwrap();

        ctx.revoke();
        assert!(ctx.is_revoked());
        assert!(dispatcher.is_empty());

        let err = ctx.get_plugin_data("k").unwrap_err();
        assert_eq!(sandbox_reason(err), ViolationReason::Revoked);
        assert!(ctx.register_hook("plugin:loaded", |_| Ok(())).is_err());
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_config_schema_validation() {
        let (ctx, _) = context(&[Capability::Config]);

        assert_eq!(ctx.get_config("theme").unwrap(), Some(json!("light")));
        ctx.set_config("theme", json!("dark")).unwrap();
        ctx.set_config("width", json!(80)).unwrap();
        ctx.set_config("extra", json!(true)).unwrap();

        assert!(matches!(ctx.set_config("width", json!("wide")), Err(Error::Validation(_))));
        assert!(matches!(ctx.set_config("mode", json!("medium")), Err(Error::Validation(_))));
        assert_eq!(ctx.get_config("theme").unwrap(), Some(json!("dark")));
    }

    #[test]
    fn test_templates_and_hooks() {
        let (ctx, dispatcher) = context(&[Capability::ReadTemplates, Capability::WriteTemplates]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for hook in ["template:created", "template:modified"] {
            let seen = seen.clone();
            dispatcher.register_hook(hook, "host", 1, hook_fn(move |_| {
                seen.lock().push(hook);
                Ok(())
            }));
        }

        assert_eq!(ctx.read_template("post").unwrap(), None);
        ctx.write_template("post", "# {{title}}").unwrap();
        ctx.write_template("post", "## {{title}}").unwrap();
        assert_eq!(ctx.read_template("post").unwrap().as_deref(), Some("## {{title}}"));
        assert_eq!(*seen.lock(), vec!["template:created", "template:modified"]);
    }

    #[test]
    fn test_plugin_data_roundtrip() {
        let (ctx, _) = context(&[Capability::Storage]);
        ctx.set_plugin_data("count", json!(3)).unwrap();
        let snapshot = ctx.data_snapshot();

        let (other, _) = context(&[Capability::Storage]);
        other.restore_data(snapshot);
        assert_eq!(other.get_plugin_data("count").unwrap(), Some(json!(3)));
        assert_eq!(other.remove_plugin_data("count").unwrap(), Some(json!(3)));
        assert_eq!(other.get_plugin_data("count").unwrap(), None);
    }
}
