//! Impls - 実装（開発用・テスト用）
//!
//! 全 port の in-memory 実装と 2 種類のクロック。
//! 状態は `tokio::sync::Mutex` の内側に持ち、テストから失敗を仕込めます。

pub mod inmem_build;
pub mod inmem_load_balancer;
pub mod inmem_network;
pub mod inmem_parameters;
pub mod inmem_stack;
pub mod system_clock;

pub use self::inmem_build::InMemoryBuildService;
pub use self::inmem_load_balancer::InMemoryLoadBalancers;
pub use self::inmem_network::{InMemoryNetwork, NetworkOp};
pub use self::inmem_parameters::InMemoryParameterStore;
pub use self::inmem_stack::InMemoryStackEngine;
pub use self::system_clock::{FixedClock, SystemClock};
