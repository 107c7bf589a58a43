//! Runtime Config - 플러그인 런타임 설정
//!
//! 글로벌 설정(~/.config/stencil/)과 프로젝트 설정(.stencil/)을 병합해서 사용

use crate::storage::JsonStore;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// 설정 파일명
pub const RUNTIME_CONFIG_FILE: &str = "stencil.json";

/// 기본 호스트 버전
pub const DEFAULT_HOST_VERSION: &str = env!("CARGO_PKG_VERSION");

/// 기본 콜백 우선순위
pub const DEFAULT_PRIORITY: i32 = 10;

// ============================================================================
// FilterFailurePolicy
// ============================================================================

/// 필터 파이프라인에서 콜백이 실패했을 때의 정책
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterFailurePolicy {
    /// 마지막으로 성공한 값과 에러를 함께 반환
    #[default]
    FailSoft,
    /// 호출자에게 에러 반환
    FailHard,
}

// ============================================================================
// RuntimeConfig
// ============================================================================

/// 플러그인 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// 호스트 애플리케이션 버전 (hostCompatibility 검사에 사용)
    #[serde(default = "default_host_version")]
    pub host_version: String,

    /// 플러그인 검색 경로
    #[serde(default)]
    pub plugin_paths: Vec<PathBuf>,

    /// 플러그인 개별 데이터 저장 디렉토리 (None이면 메모리에만 유지)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    /// 필터 실패 정책
    #[serde(default)]
    pub filter_failure_policy: FilterFailurePolicy,

    /// priority를 지정하지 않은 등록의 기본값
    #[serde(default = "default_priority")]
    pub default_priority: i32,

    /// load_all에서 건너뛸 플러그인 ID
    #[serde(default)]
    pub disabled: Vec<String>,

    /// load_all 도중 오류가 나도 나머지를 계속 로드
    #[serde(default = "default_true")]
    pub continue_on_error: bool,
}

fn default_host_version() -> String {
    DEFAULT_HOST_VERSION.to_string()
}

fn default_priority() -> i32 {
    DEFAULT_PRIORITY
}

fn default_true() -> bool {
    true
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            host_version: default_host_version(),
            plugin_paths: Vec::new(),
            data_dir: None,
            filter_failure_policy: FilterFailurePolicy::default(),
            default_priority: DEFAULT_PRIORITY,
            disabled: Vec::new(),
            continue_on_error: true,
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load / Save
    // ========================================================================

    /// 글로벌 + 프로젝트 병합 로드
    pub fn load() -> Result<Self> {
        let mut config = Self::new();

        // 1. 글로벌 설정
        if let Ok(global) = JsonStore::global() {
            if let Some(global_config) = global.load_optional::<PartialConfig>(RUNTIME_CONFIG_FILE)? {
                debug!(path = %global.file_path(RUNTIME_CONFIG_FILE).display(), "Loaded global runtime config");
                config.merge(global_config);
            }
        }

        // 2. 프로젝트 설정
        if let Ok(project) = JsonStore::current_project() {
            if let Some(project_config) = project.load_optional::<PartialConfig>(RUNTIME_CONFIG_FILE)? {
                debug!(path = %project.file_path(RUNTIME_CONFIG_FILE).display(), "Loaded project runtime config");
                config.merge(project_config);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// 특정 파일에서 로드
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let partial: PartialConfig = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        let mut config = Self::new();
        config.merge(partial);
        config.validate()?;
        Ok(config)
    }

    /// 프로젝트 설정으로 저장
    pub fn save_project(&self) -> Result<()> {
        let store = JsonStore::current_project()?;
        store.save(RUNTIME_CONFIG_FILE, self)
    }

    /// 값 검증
    pub fn validate(&self) -> Result<()> {
        semver::Version::parse(&self.host_version).map_err(|e| {
            Error::Config(format!("hostVersion '{}' is not a semantic version: {}", self.host_version, e))
        })?;
        Ok(())
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// 다른 설정과 병합 (other가 우선, 지정된 필드만)
    pub fn merge(&mut self, other: PartialConfig) {
        if let Some(host_version) = other.host_version {
            self.host_version = host_version;
        }
        if let Some(paths) = other.plugin_paths {
            for path in paths {
                if !self.plugin_paths.contains(&path) {
                    self.plugin_paths.push(path);
                }
            }
        }
        if other.data_dir.is_some() {
            self.data_dir = other.data_dir;
        }
        if let Some(policy) = other.filter_failure_policy {
            self.filter_failure_policy = policy;
        }
        if let Some(priority) = other.default_priority {
            self.default_priority = priority;
        }
        if let Some(disabled) = other.disabled {
            self.disabled = disabled;
        }
        if let Some(continue_on_error) = other.continue_on_error {
            self.continue_on_error = continue_on_error;
        }
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    pub fn with_plugin_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.plugin_paths.push(path.into());
        self
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn with_filter_failure_policy(mut self, policy: FilterFailurePolicy) -> Self {
        self.filter_failure_policy = policy;
        self
    }

    pub fn with_disabled(mut self, id: impl Into<String>) -> Self {
        self.disabled.push(id.into());
        self
    }
}

/// 병합용 부분 설정 - 파일에 적힌 필드만 덮어쓴다
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialConfig {
    pub host_version: Option<String>,
    pub plugin_paths: Option<Vec<PathBuf>>,
    pub data_dir: Option<PathBuf>,
    pub filter_failure_policy: Option<FilterFailurePolicy>,
    pub default_priority: Option<i32>,
    pub disabled: Option<Vec<String>>,
    pub continue_on_error: Option<bool>,
}
