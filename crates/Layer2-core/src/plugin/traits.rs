//! Plugin traits - 핵심 플러그인 인터페이스
//!
//! - `Plugin`: 모든 플러그인이 구현하는 async 라이프사이클 콜백
//! - `EntryPoints`: 매니페스트의 entryPoint 문자열 → 플러그인 팩토리
//! - `PluginState`: 플러그인 상태 머신의 상태

use super::context::PluginContext;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Plugin Trait - 모든 플러그인이 구현해야 하는 인터페이스
// ============================================================================

/// 플러그인 트레이트
///
/// 콜백이 `Err`를 반환하거나 panic하면 런타임이 상태 전이를 결정한다.
/// 컨텍스트 메서드는 선언된 capability 범위 안에서만 동작한다.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// 로드 시 호출 (LOADING → LOADED)
    async fn on_load(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// 활성화 시 호출 (→ ENABLED)
    async fn on_enable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// 비활성화 시 호출 (ENABLED → DISABLED)
    async fn on_disable(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// 언로드 시 호출 (→ UNLOADING)
    async fn on_unload(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// hook/filter 등록 - on_enable 직후 호출
    ///
    /// 비활성화될 때마다 등록이 모두 해제되므로 활성화 때마다 다시 등록한다.
    fn register_hooks(&self, _ctx: &PluginContext) -> anyhow::Result<()> {
        Ok(())
    }
}

// ============================================================================
// EntryPoints - 엔트리포인트 해석
// ============================================================================

/// 플러그인 팩토리
pub type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// 엔트리포인트 테이블 - 호스트가 컴파일 타임에 알고 있는 플러그인 구현
#[derive(Default)]
pub struct EntryPoints {
    factories: RwLock<HashMap<String, PluginFactory>>,
}

impl EntryPoints {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 팩토리 추가
    pub fn with<F>(self, entry_point: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register(entry_point, factory);
        self
    }

    /// 팩토리 등록 (같은 이름이면 교체)
    pub fn register<F>(&self, entry_point: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.write().insert(entry_point.into(), Arc::new(factory));
    }

    /// 새 플러그인 인스턴스 생성
    pub fn resolve(&self, entry_point: &str) -> Option<Arc<dyn Plugin>> {
        let factory = self.factories.read().get(entry_point).cloned()?;
        Some(factory())
    }

    pub fn contains(&self, entry_point: &str) -> bool {
        self.factories.read().contains_key(entry_point)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntryPoints").field("names", &self.names()).finish()
    }
}

// ============================================================================
// PluginState
// ============================================================================

/// 플러그인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    /// 카탈로그에만 있음 (인스턴스 없음)
    NotLoaded,
    Loading,
    Loaded,
    Enabled,
    Disabled,
    Unloading,
    /// 종료 상태 - 인스턴스는 제거됨
    Unloaded,
    Error,
}

impl PluginState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not_loaded",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Unloading => "unloading",
            Self::Unloaded => "unloaded",
            Self::Error => "error",
        }
    }

    /// 라이브 인스턴스가 있는 상태
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::NotLoaded | Self::Unloaded)
    }
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
