//! Version Matcher - semver 범위 파싱 및 매칭
//!
//! 지원 문법:
//! - 비교 연산자: `>=`, `<=`, `>`, `<`, `=` (연산자 없는 버전은 `=`)
//! - 공백 또는 쉼표로 구분된 절은 모두 AND (`>=1.0.0 <2.0.0`, `>=1.0,<2.0`)
//! - `*` 는 모든 버전
//!
//! 잘못된 범위는 항상 불만족으로 처리한다 (fail closed).

use semver::Version;
use std::fmt;
use thiserror::Error;

/// 범위 파싱 에러
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeParseError {
    #[error("empty range expression")]
    Empty,

    #[error("operator '{0}' is missing a version")]
    MissingVersion(String),

    #[error("invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("unsupported operator in '{0}'")]
    UnsupportedOperator(String),
}

/// 비교 연산자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn as_str(&self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
        }
    }
}

/// 단일 비교 절
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparator {
    pub op: Op,
    pub version: Version,
}

impl Comparator {
    pub fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Eq => version == &self.version,
            Op::Gt => version > &self.version,
            Op::Gte => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Lte => version <= &self.version,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.version)
    }
}

/// 파싱된 버전 범위 (모든 절의 AND)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    comparators: Vec<Comparator>,
}

impl VersionRange {
    /// 모든 버전을 허용하는 범위
    pub fn any() -> Self {
        Self { comparators: vec![] }
    }

    /// 범위 표현식 파싱
    pub fn parse(expr: &str) -> Result<Self, RangeParseError> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(RangeParseError::Empty);
        }
        if expr == "*" {
            return Ok(Self::any());
        }

        let mut comparators = Vec::new();
        let mut pending_op: Option<&str> = None;

        for token in expr
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
        {
            // ">= 1.0.0" 처럼 연산자와 버전 사이에 공백이 있는 경우
            if let Some(op) = pending_op.take() {
                if split_operator(token)?.0.is_some() {
                    return Err(RangeParseError::MissingVersion(op.to_string()));
                }
                comparators.push(parse_clause(&format!("{}{}", op, token))?);
                continue;
            }

            match split_operator(token)? {
                (Some(op), rest) if rest.is_empty() => pending_op = Some(op),
                _ => comparators.push(parse_clause(token)?),
            }
        }

        if let Some(op) = pending_op {
            return Err(RangeParseError::MissingVersion(op.to_string()));
        }
        if comparators.is_empty() {
            return Err(RangeParseError::Empty);
        }

        Ok(Self { comparators })
    }

    /// 버전이 범위를 만족하는지 확인
    pub fn satisfies(&self, version: &Version) -> bool {
        self.comparators.iter().all(|c| c.matches(version))
    }

    pub fn comparators(&self) -> &[Comparator] {
        &self.comparators
    }

    pub fn is_any(&self) -> bool {
        self.comparators.is_empty()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.comparators.is_empty() {
            return write!(f, "*");
        }
        let parts: Vec<String> = self.comparators.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

impl std::str::FromStr for VersionRange {
    type Err = RangeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// 표현식 문자열로 바로 매칭 (파싱 실패 시 false)
pub fn satisfies(version: &Version, expr: &str) -> bool {
    VersionRange::parse(expr)
        .map(|range| range.satisfies(version))
        .unwrap_or(false)
}

/// 플러그인 버전 파싱 (전체 semver 필요)
pub fn parse_version(s: &str) -> Result<Version, RangeParseError> {
    Version::parse(s.trim()).map_err(|e| RangeParseError::InvalidVersion {
        version: s.to_string(),
        reason: e.to_string(),
    })
}

fn split_operator(token: &str) -> Result<(Option<&'static str>, &str), RangeParseError> {
    for op in [">=", "<=", ">", "<", "="] {
        if let Some(rest) = token.strip_prefix(op) {
            if rest.starts_with(['>', '<', '=', '!', '~', '^']) {
                return Err(RangeParseError::UnsupportedOperator(token.to_string()));
            }
            return Ok((Some(op), rest));
        }
    }
    if token.starts_with(['!', '~', '^']) {
        return Err(RangeParseError::UnsupportedOperator(token.to_string()));
    }
    Ok((None, token))
}

fn parse_clause(token: &str) -> Result<Comparator, RangeParseError> {
    let (op, rest) = split_operator(token)?;
    let op = match op {
        Some(">=") => Op::Gte,
        Some("<=") => Op::Lte,
        Some(">") => Op::Gt,
        Some("<") => Op::Lt,
        _ => Op::Eq,
    };
    if rest.is_empty() {
        return Err(RangeParseError::MissingVersion(op.as_str().to_string()));
    }

    Ok(Comparator {
        op,
        version: parse_partial(rest)?,
    })
}

/// "1", "1.2", "1.2.3", "1.2.3-beta.1" 모두 허용 (빠진 자리는 0)
fn parse_partial(s: &str) -> Result<Version, RangeParseError> {
    let invalid = |reason: &str| RangeParseError::InvalidVersion {
        version: s.to_string(),
        reason: reason.to_string(),
    };

    let core_end = s.find(['-', '+']).unwrap_or(s.len());
    let (core, suffix) = s.split_at(core_end);
    let dots = core.matches('.').count();
    let normalized = match dots {
        0 => format!("{}.0.0{}", core, suffix),
        1 => format!("{}.0{}", core, suffix),
        2 => s.to_string(),
        _ => return Err(invalid("too many version components")),
    };

    Version::parse(&normalized).map_err(|e| invalid(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_and_clauses() {
        let range = VersionRange::parse(">=1.0.0 <2.0.0").unwrap();
        assert!(range.satisfies(&v("1.0.0")));
        assert!(range.satisfies(&v("1.9.9")));
        assert!(!range.satisfies(&v("2.0.0")));
        assert!(!range.satisfies(&v("0.9.0")));
    }

    #[test]
    fn test_comma_and_spaced_operators() {
        let range = VersionRange::parse(">=1.0,<2").unwrap();
        assert!(range.satisfies(&v("1.5.0")));
        assert!(!range.satisfies(&v("2.0.0")));

        let spaced = VersionRange::parse(">= 1.2.0 < 1.3.0").unwrap();
        assert_eq!(spaced.comparators().len(), 2);
        assert!(spaced.satisfies(&v("1.2.7")));
    }

    #[test]
    fn test_exact_and_bare() {
        assert!(satisfies(&v("1.2.3"), "=1.2.3"));
        assert!(satisfies(&v("1.2.3"), "1.2.3"));
        assert!(!satisfies(&v("1.2.4"), "1.2.3"));
        assert!(satisfies(&v("1.2.4"), ">1.2.3"));
        assert!(satisfies(&v("1.2.3"), "<=1.2.3"));
    }

    #[test]
    fn test_prerelease_orders_below_release() {
        assert!(!satisfies(&v("1.0.0-beta.1"), ">=1.0.0"));
        assert!(satisfies(&v("1.0.0-beta.1"), "<1.0.0"));
        assert!(satisfies(&v("1.0.0-beta.2"), ">1.0.0-beta.1"));
    }

    #[test]
    fn test_wildcard() {
        let range = VersionRange::parse("*").unwrap();
        assert!(range.is_any());
        assert!(range.satisfies(&v("0.0.1")));
        assert_eq!(range.to_string(), "*");
    }

    #[test]
    fn test_malformed_fails_closed() {
        for expr in ["", "   ", ">=", ">=abc", "~1.0.0", "^1.0.0", "1.2.3.4", ">>1.0.0", "!=1.0.0"] {
            assert!(VersionRange::parse(expr).is_err(), "expected error for {:?}", expr);
            assert!(!satisfies(&v("1.0.0"), expr), "malformed {:?} must not match", expr);
        }
    }

    #[test]
    fn test_display_normalizes() {
        let range = VersionRange::parse(">=1.0, <2").unwrap();
        assert_eq!(range.to_string(), ">=1.0.0 <2.0.0");
    }
}
