//! Compatibility Checker - 호스트 버전 / 범위 표현식 검사
//!
//! 첫 실패에서 멈추지 않고 모든 실패한 제약을 모아서 보고한다.

use super::manifest::PluginDescriptor;
use super::version::{parse_version, VersionRange};
use serde::Serialize;
use stencil_foundation::{CompatibilityError, ConstraintFailure};

/// 호환성 검사 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompatibilityReport {
    pub plugin: String,
    pub failures: Vec<ConstraintFailure>,
}

impl CompatibilityReport {
    pub fn is_compatible(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn into_result(self) -> Result<(), CompatibilityError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(CompatibilityError {
                plugin: self.plugin,
                failures: self.failures,
            })
        }
    }
}

/// 호환성 검사기
#[derive(Debug, Clone, Default)]
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    /// 디스크립터의 모든 제약을 호스트 버전에 대해 검사
    pub fn check(descriptor: &PluginDescriptor, host_version: &str) -> CompatibilityReport {
        let mut failures = Vec::new();

        match VersionRange::parse(&descriptor.host_compatibility) {
            Ok(range) => match parse_version(host_version) {
                Ok(host) if !range.satisfies(&host) => {
                    failures.push(ConstraintFailure::HostVersion {
                        range: descriptor.host_compatibility.clone(),
                        host: host_version.to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => failures.push(ConstraintFailure::MalformedHostVersion {
                    host: host_version.to_string(),
                    error: e.to_string(),
                }),
            },
            Err(e) => failures.push(ConstraintFailure::MalformedHostRange {
                expr: descriptor.host_compatibility.clone(),
                error: e.to_string(),
            }),
        }

        for dep in &descriptor.dependencies {
            if let Err(e) = VersionRange::parse(&dep.range) {
                failures.push(ConstraintFailure::MalformedDependencyRange {
                    dependency: dep.plugin_id.clone(),
                    expr: dep.range.clone(),
                    error: e.to_string(),
                });
            }
        }

        CompatibilityReport {
            plugin: descriptor.id.clone(),
            failures,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semver::Version;

    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("acme.export", "Export", Version::new(1, 0, 0))
    }

    #[test]
    fn test_compatible_host() {
        let d = descriptor().with_host_compatibility(">=0.1.0 <1.0.0");
        let report = CompatibilityChecker::check(&d, "0.4.2");
        assert!(report.is_compatible());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_host_out_of_range() {
        let d = descriptor().with_host_compatibility(">=2.0.0");
        let err = CompatibilityChecker::check(&d, "1.5.0").into_result().unwrap_err();
        assert_eq!(err.plugin, "acme.export");
        assert_eq!(
            err.failures,
            vec![ConstraintFailure::HostVersion {
                range: ">=2.0.0".into(),
                host: "1.5.0".into()
            }]
        );
    }

    #[test]
    fn test_reports_every_failure() {
        let d = descriptor()
            .with_host_compatibility("~1.0")
            .with_dependency("core", ">=banana")
            .with_dependency("theme", ">=1.0.0")
            .with_dependency("ui", "<");

        let report = CompatibilityChecker::check(&d, "1.0.0");
        assert_eq!(report.failures.len(), 3);
        assert!(matches!(report.failures[0], ConstraintFailure::MalformedHostRange { .. }));
        assert!(matches!(
            &report.failures[1],
            ConstraintFailure::MalformedDependencyRange { dependency, .. } if dependency == "core"
        ));
        assert!(matches!(
            &report.failures[2],
            ConstraintFailure::MalformedDependencyRange { dependency, .. } if dependency == "ui"
        ));
    }

    #[test]
    fn test_malformed_host_version() {
        let report = CompatibilityChecker::check(&descriptor(), "latest");
        assert!(matches!(
            report.failures.as_slice(),
            [ConstraintFailure::MalformedHostVersion { .. }]
        ));
    }
}
