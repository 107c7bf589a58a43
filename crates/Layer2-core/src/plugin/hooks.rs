//! Hook Dispatcher - hook/filter 등록 및 디스패치
//!
//! - Hook: 알림 전용. 모든 콜백이 같은 payload를 받고 결과는 버려진다.
//! - Filter: 파이프라인. 각 콜백의 출력이 다음 콜백의 입력이 된다.
//!
//! 실행 순서는 `(priority, sequence)` 오름차순이다. 디스패치는 시작 시점의
//! 스냅샷으로 진행되므로 콜백 안에서 등록/해제해도 진행 중인 디스패치에는
//! 영향이 없다.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use stencil_foundation::{
    CallbackKind, FilterFailurePolicy, HookExecutionError, RuntimeConfig, DEFAULT_PRIORITY,
};
use tracing::{debug, trace, warn};

/// 내장 hook 이름
pub const BUILTIN_HOOKS: [&str; 7] = [
    "plugin:loaded",
    "plugin:enabled",
    "plugin:disabled",
    "plugin:error",
    "template:created",
    "template:modified",
    "template:deleted",
];

/// 내장 filter 이름과 값 종류
pub const BUILTIN_FILTERS: [(&str, ValueKind); 5] = [
    ("template_data", ValueKind::Object),
    ("export_format", ValueKind::String),
    ("import_data", ValueKind::Object),
    ("ui_components", ValueKind::Array),
    ("menu_items", ValueKind::Array),
];

/// Hook 콜백
pub type HookCallback = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

/// Filter 콜백 (값, 추가 인자) → 새 값
pub type FilterCallback = Arc<dyn Fn(Value, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// 클로저를 HookCallback으로 감싼다
pub fn hook_fn<F>(f: F) -> HookCallback
where
    F: Fn(&Value) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// 클로저를 FilterCallback으로 감싼다
pub fn filter_fn<F>(f: F) -> FilterCallback
where
    F: Fn(Value, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ============================================================================
// RegistrationId
// ============================================================================

/// 등록 ID - 소유자는 이 ID만 보관한다
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationId(u64);

impl RegistrationId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "reg-{}", self.0)
    }
}

// ============================================================================
// ValueContract
// ============================================================================

/// filter 값의 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Any,
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        *self == Self::Any || *self == Self::of(value)
    }

    pub fn compatible_with(&self, other: ValueKind) -> bool {
        *self == Self::Any || other == Self::Any || *self == other
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(s)
    }
}

/// filter 콜백이 주고받는 값의 계약
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueContract {
    pub input: ValueKind,
    pub output: ValueKind,
}

impl ValueContract {
    pub fn any() -> Self {
        Self::of(ValueKind::Any)
    }

    pub fn of(kind: ValueKind) -> Self {
        Self { input: kind, output: kind }
    }

    /// 내장 filter의 계약 (없으면 any)
    pub fn builtin(name: &str) -> Self {
        BUILTIN_FILTERS
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, kind)| Self::of(*kind))
            .unwrap_or_else(Self::any)
    }
}

impl Default for ValueContract {
    fn default() -> Self {
        Self::any()
    }
}

// ============================================================================
// Registration
// ============================================================================

#[derive(Clone)]
struct HookRegistration {
    id: RegistrationId,
    priority: i32,
    owner: String,
    callback: HookCallback,
}

#[derive(Clone)]
struct FilterRegistration {
    id: RegistrationId,
    priority: i32,
    owner: String,
    contract: ValueContract,
    callback: FilterCallback,
}

/// 등록 정보 (조회용)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub id: RegistrationId,
    pub name: String,
    pub kind: CallbackKind,
    pub priority: i32,
    pub sequence: u64,
    pub owner: String,
}

/// hook과 filter를 하나의 락 아래 보관 (소유자 일괄 해제가 원자적이도록)
#[derive(Default)]
struct Tables {
    /// 이름 → (priority, sequence) 순 정렬된 목록
    hooks: HashMap<String, Vec<HookRegistration>>,
    filters: HashMap<String, Vec<FilterRegistration>>,
    /// ID → (종류, 이름)
    index: HashMap<RegistrationId, (CallbackKind, String)>,
}

// ============================================================================
// Dispatch results
// ============================================================================

/// hook 디스패치 결과
#[derive(Debug, Clone)]
pub struct DispatchReport {
    pub hook: String,
    /// 호출된 콜백 수 (실패 포함)
    pub invoked: usize,
    pub errors: Vec<HookExecutionError>,
}

impl DispatchReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// filter 파이프라인 결과 (fail-soft)
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    /// 마지막으로 성공한 값
    pub value: Value,
    pub error: Option<HookExecutionError>,
}

impl FilterOutcome {
    pub fn into_result(self) -> Result<Value, HookExecutionError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.value),
        }
    }
}

// ============================================================================
// HookDispatcher
// ============================================================================

/// hook/filter 디스패처
pub struct HookDispatcher {
    tables: RwLock<Tables>,
    /// ID와 sequence를 함께 발급
    counter: AtomicU64,
    default_priority: i32,
    policy: FilterFailurePolicy,
}

impl HookDispatcher {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            counter: AtomicU64::new(1),
            default_priority: DEFAULT_PRIORITY,
            policy: FilterFailurePolicy::default(),
        }
    }

    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self::new()
            .with_default_priority(config.default_priority)
            .with_policy(config.filter_failure_policy)
    }

    pub fn with_default_priority(mut self, priority: i32) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_policy(mut self, policy: FilterFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn default_priority(&self) -> i32 {
        self.default_priority
    }

    pub fn policy(&self) -> FilterFailurePolicy {
        self.policy
    }

    fn next_id(&self) -> RegistrationId {
        RegistrationId(self.counter.fetch_add(1, Ordering::SeqCst))
    }

    // ========================================================================
    // 등록 / 해제
    // ========================================================================

    /// hook 등록
    pub fn register_hook(
        &self,
        name: &str,
        owner: &str,
        priority: i32,
        callback: HookCallback,
    ) -> RegistrationId {
        let mut tables = self.tables.write();
        let id = self.next_id();

        let list = tables.hooks.entry(name.to_string()).or_default();
        let pos = list.partition_point(|r| r.priority <= priority);
        list.insert(
            pos,
            HookRegistration {
                id,
                priority,
                owner: owner.to_string(),
                callback,
            },
        );
        tables.index.insert(id, (CallbackKind::Hook, name.to_string()));

        debug!(plugin = %owner, hook = name, priority, id = %id, "Hook registered");
        id
    }

    /// filter 등록 - 계약 불일치는 경고만 남긴다
    pub fn register_filter(
        &self,
        name: &str,
        owner: &str,
        priority: i32,
        contract: ValueContract,
        callback: FilterCallback,
    ) -> RegistrationId {
        let mut tables = self.tables.write();
        let id = self.next_id();

        let builtin = ValueContract::builtin(name);
        if !contract.input.compatible_with(builtin.input)
            || !contract.output.compatible_with(builtin.output)
        {
            warn!(
                plugin = %owner,
                filter = name,
                expected = %builtin.output,
                input = %contract.input,
                output = %contract.output,
                "Filter contract does not match built-in filter"
            );
        }

        let list = tables.filters.entry(name.to_string()).or_default();
        if let Some(other) = list.iter().find(|r| {
            !r.contract.output.compatible_with(contract.input)
                || !contract.output.compatible_with(r.contract.input)
        }) {
            warn!(
                plugin = %owner,
                filter = name,
                conflicting_plugin = %other.owner,
                "Filter contract conflicts with an existing registration"
            );
        }

        let pos = list.partition_point(|r| r.priority <= priority);
        list.insert(
            pos,
            FilterRegistration {
                id,
                priority,
                owner: owner.to_string(),
                contract,
                callback,
            },
        );
        tables.index.insert(id, (CallbackKind::Filter, name.to_string()));

        debug!(plugin = %owner, filter = name, priority, id = %id, "Filter registered");
        id
    }

    /// 단일 등록 해제
    pub fn unregister(&self, id: RegistrationId) -> bool {
        let mut tables = self.tables.write();
        let Some((kind, name)) = tables.index.remove(&id) else {
            return false;
        };

        match kind {
            CallbackKind::Hook => {
                if let Some(list) = tables.hooks.get_mut(&name) {
                    list.retain(|r| r.id != id);
                    if list.is_empty() {
                        tables.hooks.remove(&name);
                    }
                }
            }
            CallbackKind::Filter => {
                if let Some(list) = tables.filters.get_mut(&name) {
                    list.retain(|r| r.id != id);
                    if list.is_empty() {
                        tables.filters.remove(&name);
                    }
                }
            }
        }

        debug!(id = %id, kind = %kind, hook = %name, "Registration removed");
        true
    }

    /// 소유자의 모든 hook/filter 등록 해제 (한 번의 쓰기 락 안에서)
    pub fn unregister_by_owner(&self, owner: &str) -> usize {
        let mut tables = self.tables.write();
        let Tables { hooks, filters, index } = &mut *tables;
        let mut removed = 0;

        for list in hooks.values_mut() {
            list.retain(|r| {
                let keep = r.owner != owner;
                if !keep {
                    index.remove(&r.id);
                    removed += 1;
                }
                keep
            });
        }
        hooks.retain(|_, list| !list.is_empty());

        for list in filters.values_mut() {
            list.retain(|r| {
                let keep = r.owner != owner;
                if !keep {
                    index.remove(&r.id);
                    removed += 1;
                }
                keep
            });
        }
        filters.retain(|_, list| !list.is_empty());

        if removed > 0 {
            debug!(plugin = %owner, removed, "Revoked registrations");
        }
        removed
    }

    // ========================================================================
    // 조회
    // ========================================================================

    /// 이름에 등록된 hook/filter를 실행 순서로 반환
    pub fn registrations_for(&self, name: &str) -> Vec<RegistrationInfo> {
        let tables = self.tables.read();
        let hooks = tables.hooks.get(name).into_iter().flatten().map(|r| RegistrationInfo {
            id: r.id,
            name: name.to_string(),
            kind: CallbackKind::Hook,
            priority: r.priority,
            sequence: r.id.0,
            owner: r.owner.clone(),
        });
        let filters = tables.filters.get(name).into_iter().flatten().map(|r| RegistrationInfo {
            id: r.id,
            name: name.to_string(),
            kind: CallbackKind::Filter,
            priority: r.priority,
            sequence: r.id.0,
            owner: r.owner.clone(),
        });
        hooks.chain(filters).collect()
    }

    /// 소유자의 등록 수
    pub fn count_for_owner(&self, owner: &str) -> usize {
        let tables = self.tables.read();
        let hooks = tables.hooks.values().flatten().filter(|r| r.owner == owner).count();
        let filters = tables.filters.values().flatten().filter(|r| r.owner == owner).count();
        hooks + filters
    }

    pub fn is_registered(&self, id: RegistrationId) -> bool {
        self.tables.read().index.contains_key(&id)
    }

    /// 등록 ID가 hook인지 filter인지
    pub fn kind_of(&self, id: RegistrationId) -> Option<CallbackKind> {
        self.tables.read().index.get(&id).map(|(kind, _)| *kind)
    }

    pub fn hook_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().hooks.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn filter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().filters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tables.read().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ========================================================================
    // 디스패치
    // ========================================================================

    /// hook 실행 - 실패한 콜백은 격리하고 나머지를 계속 실행
    pub fn fire(&self, name: &str, payload: &Value) -> DispatchReport {
        let snapshot: Vec<HookRegistration> =
            self.tables.read().hooks.get(name).cloned().unwrap_or_default();

        trace!(hook = name, callbacks = snapshot.len(), "Firing hook");

        let mut errors = Vec::new();
        for reg in &snapshot {
            let result = catch_unwind(AssertUnwindSafe(|| (reg.callback)(payload)));
            let cause = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic.as_ref()),
            };

            let err = HookExecutionError::new(&reg.owner, name, CallbackKind::Hook, cause);
            warn!(plugin = %err.plugin, hook = name, cause = %err.cause, "Hook callback failed");
            errors.push(err);
        }

        DispatchReport {
            hook: name.to_string(),
            invoked: snapshot.len(),
            errors,
        }
    }

    /// filter 파이프라인 실행 (fail-soft)
    pub fn apply(&self, name: &str, value: Value, args: &[Value]) -> FilterOutcome {
        let snapshot: Vec<FilterRegistration> =
            self.tables.read().filters.get(name).cloned().unwrap_or_default();

        trace!(filter = name, callbacks = snapshot.len(), "Applying filter");

        let mut current = value;
        for reg in &snapshot {
            if !reg.contract.input.accepts(&current) {
                warn!(
                    plugin = %reg.owner,
                    filter = name,
                    expected = %reg.contract.input,
                    actual = %ValueKind::of(&current),
                    "Filter input does not match declared contract"
                );
            }

            let input = current.clone();
            let result = catch_unwind(AssertUnwindSafe(|| (reg.callback)(input, args)));
            let cause = match result {
                Ok(Ok(next)) => {
                    if !reg.contract.output.accepts(&next) {
                        warn!(
                            plugin = %reg.owner,
                            filter = name,
                            expected = %reg.contract.output,
                            actual = %ValueKind::of(&next),
                            "Filter output does not match declared contract"
                        );
                    }
                    current = next;
                    continue;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic.as_ref()),
            };

            let err = HookExecutionError::new(&reg.owner, name, CallbackKind::Filter, cause);
            warn!(plugin = %err.plugin, filter = name, cause = %err.cause, "Filter callback failed, pipeline stopped");
            return FilterOutcome {
                value: current,
                error: Some(err),
            };
        }

        FilterOutcome {
            value: current,
            error: None,
        }
    }

    /// filter 파이프라인 실행 (fail-hard)
    pub fn apply_strict(&self, name: &str, value: Value, args: &[Value]) -> Result<Value, HookExecutionError> {
        self.apply(name, value, args).into_result()
    }

    /// 정책에 따라 실행 - FailSoft는 에러가 있어도 Ok(outcome)
    pub fn apply_with(
        &self,
        policy: FilterFailurePolicy,
        name: &str,
        value: Value,
        args: &[Value],
    ) -> Result<FilterOutcome, HookExecutionError> {
        let outcome = self.apply(name, value, args);
        match (policy, outcome.error) {
            (FilterFailurePolicy::FailHard, Some(err)) => Err(err),
            (_, error) => Ok(FilterOutcome {
                value: outcome.value,
                error,
            }),
        }
    }
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("HookDispatcher")
            .field("hooks", &tables.hooks.len())
            .field("filters", &tables.filters.len())
            .field("registrations", &tables.index.len())
            .field("policy", &self.policy)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> HookCallback {
        let log = log.clone();
        let tag = tag.to_string();
        hook_fn(move |_| {
            log.lock().push(tag.clone());
            Ok(())
        })
    }

    #[test]
    fn test_fire_orders_by_priority_then_sequence() {
        let dispatcher = HookDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.register_hook("template:created", "a", 10, recorder(&log, "p10"));
        dispatcher.register_hook("template:created", "b", 1, recorder(&log, "p1"));
        dispatcher.register_hook("template:created", "c", 5, recorder(&log, "p5"));
        dispatcher.register_hook("template:created", "d", 5, recorder(&log, "p5-second"));

        let report = dispatcher.fire("template:created", &json!({}));
        assert!(report.is_ok());
        assert_eq!(report.invoked, 4);
        assert_eq!(*log.lock(), vec!["p1", "p5", "p5-second", "p10"]);
    }

    #[test]
    fn test_failing_hook_is_isolated() {
        let dispatcher = HookDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.register_hook("plugin:loaded", "bad", 1, hook_fn(|_| Err(anyhow::anyhow!("boom"))));
        dispatcher.register_hook("plugin:loaded", "worse", 2, hook_fn(|_| panic!("kaboom")));
        dispatcher.register_hook("plugin:loaded", "good", 3, recorder(&log, "good"));

        let report = dispatcher.fire("plugin:loaded", &json!({ "pluginId": "x" }));
        assert_eq!(report.invoked, 3);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].plugin, "bad");
        assert_eq!(report.errors[0].cause, "boom");
        assert_eq!(report.errors[1].plugin, "worse");
        assert!(report.errors[1].cause.contains("kaboom"));
        assert_eq!(*log.lock(), vec!["good"]);
    }

    #[test]
    fn test_identity_filters_preserve_value() {
        let dispatcher = HookDispatcher::new();
        for owner in ["a", "b"] {
            dispatcher.register_filter(
                "template_data",
                owner,
                DEFAULT_PRIORITY,
                ValueContract::of(ValueKind::Object),
                filter_fn(|v, _| Ok(v)),
            );
        }

        let input = json!({ "title": "Hello", "tags": ["a", "b"] });
        let outcome = dispatcher.apply("template_data", input.clone(), &[]);
        assert!(outcome.error.is_none());
        assert_eq!(outcome.value, input);
    }

    #[test]
    fn test_filter_chain_feeds_output_forward() {
        let dispatcher = HookDispatcher::new();
        dispatcher.register_filter(
            "export_format",
            "upper",
            20,
            ValueContract::any(),
            filter_fn(|v, _| Ok(json!(v.as_str().unwrap_or_default().to_uppercase()))),
        );
        dispatcher.register_filter(
            "export_format",
            "suffix",
            10,
            ValueContract::any(),
            filter_fn(|v, args| {
                let suffix = args.first().and_then(Value::as_str).unwrap_or("");
                Ok(json!(format!("{}{}", v.as_str().unwrap_or_default(), suffix)))
            }),
        );

        let value = dispatcher
            .apply_strict("export_format", json!("md"), &[json!("-x")])
            .unwrap();
        assert_eq!(value, json!("MD-X"));
    }

    #[test]
    fn test_filter_failure_policies() {
        let dispatcher = HookDispatcher::new();
        dispatcher.register_filter("menu_items", "add", 1, ValueContract::any(), filter_fn(|mut v, _| {
            if let Some(items) = v.as_array_mut() {
                items.push(json!("first"));
            }
            Ok(v)
        }));
        dispatcher.register_filter("menu_items", "broken", 2, ValueContract::any(), filter_fn(|_, _| {
            Err(anyhow::anyhow!("cannot add menu"))
        }));
        dispatcher.register_filter("menu_items", "never", 3, ValueContract::any(), filter_fn(|_, _| {
            Ok(json!("unreachable"))
        }));

        let soft = dispatcher.apply("menu_items", json!([]), &[]);
        assert_eq!(soft.value, json!(["first"]));
        assert_eq!(soft.error.as_ref().map(|e| e.plugin.as_str()), Some("broken"));

        let hard = dispatcher.apply_with(FilterFailurePolicy::FailHard, "menu_items", json!([]), &[]);
        assert_eq!(hard.unwrap_err().kind, CallbackKind::Filter);

        let soft = dispatcher
            .apply_with(FilterFailurePolicy::FailSoft, "menu_items", json!([]), &[])
            .unwrap();
        assert!(soft.error.is_some());
    }

    #[test]
    fn test_unregister_by_owner_removes_hooks_and_filters() {
        let dispatcher = HookDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        dispatcher.register_hook("template:created", "a", 1, recorder(&log, "a"));
        dispatcher.register_hook("template:deleted", "a", 1, recorder(&log, "a"));
        dispatcher.register_filter("template_data", "a", 1, ValueContract::any(), filter_fn(|v, _| Ok(v)));
        let kept = dispatcher.register_hook("template:created", "b", 1, recorder(&log, "b"));

        assert_eq!(dispatcher.count_for_owner("a"), 3);
        assert_eq!(dispatcher.unregister_by_owner("a"), 3);
        assert_eq!(dispatcher.count_for_owner("a"), 0);
        assert!(dispatcher.is_registered(kept));
        assert_eq!(dispatcher.hook_names(), vec!["template:created"]);
        assert!(dispatcher.filter_names().is_empty());

        dispatcher.fire("template:created", &Value::Null);
        assert_eq!(*log.lock(), vec!["b"]);
    }

    #[test]
    fn test_unregister_single() {
        let dispatcher = HookDispatcher::new();
        let id = dispatcher.register_filter("import_data", "a", 1, ValueContract::any(), filter_fn(|v, _| Ok(v)));
        assert!(dispatcher.unregister(id));
        assert!(!dispatcher.unregister(id));
        assert!(dispatcher.is_empty());
    }

    #[test]
    fn test_dispatch_uses_snapshot() {
        let dispatcher = Arc::new(HookDispatcher::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let inner = dispatcher.clone();
        let inner_log = log.clone();
        dispatcher.register_hook("template:modified", "a", 1, hook_fn(move |_| {
            inner_log.lock().push("a".to_string());
            inner.register_hook("template:modified", "late", 0, recorder(&inner_log, "late"));
            Ok(())
        }));

        dispatcher.fire("template:modified", &Value::Null);
        assert_eq!(*log.lock(), vec!["a"]);
        assert_eq!(dispatcher.registrations_for("template:modified").len(), 2);
    }

    #[test]
    fn test_builtin_contracts() {
        assert_eq!(ValueContract::builtin("ui_components").input, ValueKind::Array);
        assert_eq!(ValueContract::builtin("custom"), ValueContract::any());
        assert!(ValueKind::Object.accepts(&json!({})));
        assert!(!ValueKind::Object.accepts(&json!([])));
    }
}
