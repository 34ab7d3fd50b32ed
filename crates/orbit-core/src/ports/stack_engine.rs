//! StackEngine port - IaC エンジンへの受け渡し
//!
//! エンジンは [`TeamStackPlan`] を実リソースに変換し、
//! 作成・インポートした論理 id ごとの物理 id を返します。

use async_trait::async_trait;

use crate::domain::{ApiError, StackOutputs, TeamStackPlan};

#[async_trait]
pub trait StackEngine: Send + Sync {
    async fn deploy(&self, plan: &TeamStackPlan) -> Result<StackOutputs, ApiError>;
}
