//! Ports - 抽象化レイヤー
//!
//! 各 trait は外部のクラウドサービス（ビルド、EC2、ELB、SSM、IaC エンジン）への
//! インターフェースを提供し、実装の詳細を隠蔽します。
//! すべて `Send + Sync` で、`Arc<dyn _>` として使います。

pub mod build_service;
pub mod clock;
pub mod id_generator;
pub mod load_balancer;
pub mod network;
pub mod parameter_store;
pub mod stack_engine;

pub use self::build_service::{BuildService, LogsConfig, StartBuildRequest};
pub use self::clock::Clock;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::load_balancer::LoadBalancerApi;
pub use self::network::NetworkApi;
pub use self::parameter_store::ParameterStore;
pub use self::stack_engine::StackEngine;
