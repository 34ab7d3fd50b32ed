//! Clock port - 時刻と待機の抽象化
//!
//! クレート内のすべての sleep（リトライのバックオフ、ポーリング間隔、
//! detach 待ち）はここを通ります。

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}
