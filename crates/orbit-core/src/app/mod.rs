//! App - アプリケーション層
//!
//! ports を組み合わせてオーケストレーションを実装します。
//!
//! # 主要コンポーネント
//! - **CodeBuild / BuildWatcher**: リモートビルドの起動とポーリング
//! - **WorkerPool**: 並列ジョブの実行と join
//! - **CleanupSequencer**: 環境削除後のネットワークリソース掃除
//! - **RemoteRunner**: リモートコマンドとイメージビルド
//! - **TeamDeployer**: チームスタックのデプロイ

pub mod cleanup;
pub mod codebuild;
pub mod dispatch;
pub mod remote;
pub mod team;

pub use self::cleanup::{CleanupReport, CleanupSequencer, KindCounts};
pub use self::codebuild::{BuildJob, BuildWatcher, CodeBuild};
pub use self::dispatch::{Job, JoinPolicy, WorkerPool};
pub use self::remote::RemoteRunner;
pub use self::team::TeamDeployer;
