//! Plugin Discovery - 파일 시스템에서 플러그인 매니페스트 발견
//!
//! 각 소스 디렉토리의 하위 디렉토리마다 `plugin.json` → `plugin.toml` 순으로
//! 매니페스트를 찾는다. 소스 디렉토리 자체에 매니페스트가 있으면 그 디렉토리를
//! 하나의 플러그인으로 취급한다.
//!
//! 스캔은 레지스트리 락 없이 실행되고, 병합만 쓰기 락을 잡는다.

use super::manifest::{ManifestFormat, PluginDescriptor, PluginManifest};
use serde::Serialize;
use std::path::{Path, PathBuf};
use stencil_foundation::ValidationError;
use tokio::fs;
use tracing::{debug, info, warn};

// ============================================================================
// DiscoveryReport
// ============================================================================

/// discover() 결과
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryReport {
    /// 새로 카탈로그에 추가된 ID
    pub discovered: Vec<String>,
    /// 더 높은 버전으로 교체된 ID
    pub replaced: Vec<String>,
    /// 같거나 낮은 버전이라 무시된 ID
    pub ignored: Vec<String>,
    /// 검증에 실패한 매니페스트
    pub errors: Vec<ValidationError>,
}

impl DiscoveryReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// 추가 + 교체된 총 수
    pub fn accepted(&self) -> usize {
        self.discovered.len() + self.replaced.len()
    }
}

/// 스캔 결과 (병합 전)
#[derive(Debug, Default)]
pub struct ScanResult {
    pub descriptors: Vec<PluginDescriptor>,
    pub errors: Vec<ValidationError>,
}

// ============================================================================
// Scan
// ============================================================================

/// 모든 소스 디렉토리 스캔
pub async fn scan_sources(sources: &[PathBuf]) -> ScanResult {
    let mut result = ScanResult::default();

    for source in sources {
        if !fs::try_exists(source).await.unwrap_or(false) {
            debug!(path = %source.display(), "Plugin source does not exist, skipping");
            continue;
        }

        // 소스 자체가 플러그인 디렉토리인 경우
        if let Some(found) = read_plugin_dir(source).await {
            push(&mut result, found);
            continue;
        }

        match scan_directory(source).await {
            Ok(found) => {
                for item in found {
                    push(&mut result, item);
                }
            }
            Err(e) => {
                warn!("Failed to scan plugin directory {}: {}", source.display(), e);
                result.errors.push(e);
            }
        }
    }

    info!(
        found = result.descriptors.len(),
        invalid = result.errors.len(),
        "Plugin scan finished"
    );
    result
}

fn push(result: &mut ScanResult, found: Result<PluginDescriptor, ValidationError>) {
    match found {
        Ok(descriptor) => {
            debug!(plugin = %descriptor.id, version = %descriptor.version, source = %descriptor.source_display(), "Found plugin");
            result.descriptors.push(descriptor);
        }
        Err(e) => {
            warn!("Invalid plugin manifest {}: {}", e.source_path.display(), e.message);
            result.errors.push(e);
        }
    }
}

/// 소스 디렉토리의 하위 디렉토리 스캔 (경로 순)
async fn scan_directory(dir: &Path) -> Result<Vec<Result<PluginDescriptor, ValidationError>>, ValidationError> {
    let io_error = |e: std::io::Error| ValidationError::new(dir, format!("cannot read directory: {}", e));

    let mut entries = fs::read_dir(dir).await.map_err(io_error)?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    let mut found = Vec::new();
    for path in dirs {
        if let Some(item) = read_plugin_dir(&path).await {
            found.push(item);
        }
    }
    Ok(found)
}

/// 플러그인 디렉토리에서 매니페스트 읽기 (매니페스트가 없으면 None)
pub async fn read_plugin_dir(dir: &Path) -> Option<Result<PluginDescriptor, ValidationError>> {
    for (file_name, format) in ManifestFormat::FILE_NAMES {
        let path = dir.join(file_name);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        return Some(read_manifest(&path, format).await);
    }
    None
}

/// 매니페스트 파일 하나를 읽고 검증
pub async fn read_manifest(path: &Path, format: ManifestFormat) -> Result<PluginDescriptor, ValidationError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| ValidationError::new(path, format!("cannot read manifest: {}", e)))?;

    PluginManifest::parse(&content, format, path)?.into_descriptor(path)
}

// ============================================================================
// 테스트
// ============================================================================
