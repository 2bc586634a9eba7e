//! 仓储接口

use async_trait::async_trait;
use pacs_core::{NewStudy, Result, Study, StudyStatus, User};

/// 本地检查仓储
#[async_trait]
pub trait StudyRepository: Send + Sync {
    /// 按插入顺序返回全部检查
    async fn list(&self) -> Result<Vec<Study>>;

    async fn get(&self, id: u64) -> Result<Option<Study>>;

    /// 新建检查；`study_id` 重复时返回 `Conflict`，原记录不变
    async fn create(&self, study: NewStudy) -> Result<Study>;

    /// 更新状态；id 不存在时返回 `NotFound`
    async fn update_status(&self, id: u64, status: StudyStatus) -> Result<Study>;

    /// 删除并返回被删除的记录；id 不存在时返回 `NotFound`
    async fn delete(&self, id: u64) -> Result<Study>;
}

/// 用户仓储（只读）
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// 用户名精确匹配（区分大小写）
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn find_by_id(&self, id: u64) -> Result<Option<User>>;

    async fn list(&self) -> Result<Vec<User>>;
}
