//! IdGenerator port - ID 生成の抽象化
//!
//! ログストリーム名のサフィックスに使います。
//! 同じリモートコマンドを 2 回実行しても同じストリームには書き込みません。

use std::sync::Arc;

use ulid::Ulid;

use super::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Ulid;
}

/// ULID whose timestamp part comes from the injected clock.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

impl IdGenerator for UlidGenerator {
    fn generate(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}
