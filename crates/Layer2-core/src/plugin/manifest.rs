//! Plugin Manifest - 플러그인 메타데이터 정의
//!
//! - `PluginManifest`: plugin.json / plugin.toml 원본 구조
//! - `PluginDescriptor`: 검증을 통과한 불변 메타데이터 (런타임에서 공유)

use super::version::parse_version;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use stencil_foundation::ValidationError;

// ============================================================================
// Capability - 권한 토큰
// ============================================================================

/// 플러그인이 선언하는 권한 토큰
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Hook 등록
    Hooks,
    /// Filter 등록
    Filters,
    /// 플러그인 개별 key-value 저장소
    Storage,
    /// 플러그인 설정 읽기/쓰기
    Config,
    /// 템플릿 읽기
    ReadTemplates,
    /// 템플릿 쓰기
    WriteTemplates,
    /// 네트워크 접근
    Network,
    /// 호스트 로그 출력
    Log,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Hooks,
        Capability::Filters,
        Capability::Storage,
        Capability::Config,
        Capability::ReadTemplates,
        Capability::WriteTemplates,
        Capability::Network,
        Capability::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hooks => "hooks",
            Self::Filters => "filters",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::ReadTemplates => "read-templates",
            Self::WriteTemplates => "write-templates",
            Self::Network => "network",
            Self::Log => "log",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown capability '{}'", s))
    }
}

// ============================================================================
// Dependency
// ============================================================================

/// 플러그인 의존성 - 범위는 원본 표현식 그대로 보관
///
/// 잘못된 범위도 여기서는 거부하지 않는다. CompatibilityChecker가 보고하고
/// DependencyGraph는 불만족으로 처리한다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub plugin_id: String,
    pub range: String,
}

impl Dependency {
    pub fn new(plugin_id: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            range: range.into(),
        }
    }

    /// "id>=1.0,<2.0" 또는 "id >=1.0.0" 형식 파싱 (범위 없으면 "*")
    pub fn parse(spec: &str) -> Result<Self, String> {
        let spec = spec.trim();
        let id_end = spec
            .find(|c: char| !is_id_char(c))
            .unwrap_or(spec.len());
        let (id, range) = spec.split_at(id_end);
        if id.is_empty() {
            return Err(format!("dependency '{}' has no plugin id", spec));
        }

        let range = range.trim();
        Ok(Self::new(id, if range.is_empty() { "*" } else { range }))
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.plugin_id, self.range)
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

// ============================================================================
// PluginDescriptor
// ============================================================================

/// 플러그인 디스크립터 - discovery 시점에 생성되고 이후 변경되지 않음
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    /// 고유 플러그인 ID (예: "acme.markdown-export")
    pub id: String,

    /// 표시 이름
    pub name: String,

    /// 버전
    #[serde(serialize_with = "serialize_version")]
    pub version: Version,

    /// 설명
    pub description: String,

    /// 작성자
    pub author: Option<String>,

    /// 호스트가 해석하는 엔트리포인트 참조
    pub entry_point: String,

    /// 의존성 목록 (선언 순서 유지)
    pub dependencies: Vec<Dependency>,

    /// 호스트 호환 범위
    pub host_compatibility: String,

    /// 선언된 권한
    pub capabilities: BTreeSet<Capability>,

    /// 설정 스키마
    pub config_schema: Option<serde_json::Value>,

    /// 매니페스트 위치 (컴파일 타임 플러그인은 None)
    pub source: Option<PathBuf>,
}

fn serialize_version<S: serde::Serializer>(v: &Version, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(v)
}

impl PluginDescriptor {
    /// 새 디스크립터 생성 (엔트리포인트 기본값은 id)
    pub fn new(id: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        let id = id.into();
        Self {
            entry_point: id.clone(),
            id,
            name: name.into(),
            version,
            description: String::new(),
            author: None,
            dependencies: vec![],
            host_compatibility: "*".to_string(),
            capabilities: BTreeSet::new(),
            config_schema: None,
            source: None,
        }
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 빌더 패턴: 작성자 설정
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// 빌더 패턴: 엔트리포인트 설정
    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// 빌더 패턴: 의존성 추가
    pub fn with_dependency(mut self, plugin_id: impl Into<String>, range: impl Into<String>) -> Self {
        self.dependencies.push(Dependency::new(plugin_id, range));
        self
    }

    /// 빌더 패턴: 호스트 호환 범위 설정
    pub fn with_host_compatibility(mut self, range: impl Into<String>) -> Self {
        self.host_compatibility = range.into();
        self
    }

    /// 빌더 패턴: 권한 추가
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// 빌더 패턴: 권한 여러 개 추가
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(capabilities);
        self
    }

    /// 빌더 패턴: 설정 스키마
    pub fn with_config_schema(mut self, schema: serde_json::Value) -> Self {
        self.config_schema = Some(schema);
        self
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn depends_on(&self, plugin_id: &str) -> bool {
        self.dependencies.iter().any(|d| d.plugin_id == plugin_id)
    }

    /// 위치 표시용 문자열
    pub fn source_display(&self) -> String {
        self.source
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "builtin".to_string())
    }
}

// ============================================================================
// PluginManifest - 매니페스트 파일 구조
// ============================================================================

/// 의존성 선언 형식: 문자열 목록 또는 id → 범위 맵
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ManifestDependencies {
    List(Vec<String>),
    Map(BTreeMap<String, String>),
}

impl Default for ManifestDependencies {
    fn default() -> Self {
        Self::List(vec![])
    }
}

/// plugin.json / plugin.toml 파일 구조
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    pub id: String,

    pub name: String,

    pub version: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    pub entry_point: String,

    #[serde(default)]
    pub dependencies: ManifestDependencies,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_compatibility: Option<String>,

    #[serde(default)]
    pub capabilities: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<serde_json::Value>,
}

/// 매니페스트 파일 포맷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Toml,
}

impl ManifestFormat {
    /// 디렉토리에서 찾을 파일명 (우선순위 순)
    pub const FILE_NAMES: [(&'static str, ManifestFormat); 2] = [
        ("plugin.json", ManifestFormat::Json),
        ("plugin.toml", ManifestFormat::Toml),
    ];
}

impl PluginManifest {
    /// 문자열 파싱
    pub fn parse(content: &str, format: ManifestFormat, path: &Path) -> Result<Self, ValidationError> {
        match format {
            ManifestFormat::Json => serde_json::from_str(&strip_json_comments(content))
                .map_err(|e| ValidationError::new(path, e.to_string())),
            ManifestFormat::Toml => {
                toml::from_str(content).map_err(|e| ValidationError::new(path, e.to_string()))
            }
        }
    }

    /// 검증 후 PluginDescriptor로 변환
    pub fn into_descriptor(self, path: &Path) -> Result<PluginDescriptor, ValidationError> {
        let fail = |msg: String| ValidationError::new(path, msg);

        let id = self.id.trim().to_string();
        if id.is_empty() {
            return Err(fail("id must not be empty".into()));
        }
        if !id.chars().all(is_id_char) {
            return Err(fail(format!("id '{}' contains invalid characters", id)));
        }
        if self.name.trim().is_empty() {
            return Err(fail("name must not be empty".into()));
        }
        if self.entry_point.trim().is_empty() {
            return Err(fail("entryPoint must not be empty".into()));
        }

        let version = parse_version(&self.version).map_err(|e| fail(e.to_string()))?;

        // dependencies 변환
        let specs: Vec<Dependency> = match self.dependencies {
            ManifestDependencies::List(list) => list
                .iter()
                .map(|s| Dependency::parse(s))
                .collect::<Result<_, _>>()
                .map_err(fail)?,
            ManifestDependencies::Map(map) => map
                .into_iter()
                .map(|(id, range)| Dependency::new(id, if range.trim().is_empty() { "*".into() } else { range }))
                .collect(),
        };

        let mut seen = BTreeSet::new();
        for dep in &specs {
            if dep.plugin_id == id {
                return Err(fail(format!("plugin '{}' depends on itself", id)));
            }
            if !seen.insert(dep.plugin_id.clone()) {
                return Err(fail(format!("dependency '{}' is declared twice", dep.plugin_id)));
            }
        }

        let capabilities = self
            .capabilities
            .iter()
            .map(|c| c.parse::<Capability>())
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(fail)?;

        if let Some(schema) = &self.config_schema {
            if !schema.is_object() {
                return Err(fail("configSchema must be an object".into()));
            }
        }

        Ok(PluginDescriptor {
            id,
            name: self.name.trim().to_string(),
            version,
            description: self.description,
            author: self.author,
            entry_point: self.entry_point.trim().to_string(),
            dependencies: specs,
            host_compatibility: self.host_compatibility.unwrap_or_else(|| "*".to_string()),
            capabilities,
            config_schema: self.config_schema,
            source: Some(path.to_path_buf()),
        })
    }
}

/// plugin.json의 `//`, `/* */` 주석 제거 (문자열 내부는 유지)
fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        let next = chars.peek().copied();
        match (c, next) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => output.push(c),
        }
    }

    output
}
