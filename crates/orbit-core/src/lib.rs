//! orbit-core
//!
//! Deployment and teardown orchestration for the orbit workbench.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, build, buildspec, network, team, errors）
//! - **ports**: 抽象化レイヤー（BuildService, NetworkApi, ParameterStore, StackEngine, Clock, など）
//! - **impls**: in-memory 実装とクロック
//! - **app**: アプリケーションロジック（codebuild, dispatch, cleanup, remote, team）
//! - **retry / config / observability / error**: 横断的な関心事

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod retry;

pub use config::OrbitConfig;
pub use error::OrbitError;
pub use retry::RetryPolicy;
