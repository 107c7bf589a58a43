//! Storage module for Stencil
//!
//! - `json`: JSON - 설정과 플러그인 데이터 파일 저장/로드

mod json;

pub use json::JsonStore;
