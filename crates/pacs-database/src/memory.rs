//! 内存仓储实现

use async_trait::async_trait;
use chrono::Utc;
use pacs_core::{NewStudy, PacsError, Result, Study, StudyStatus, User};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::repository::{StudyRepository, UserRepository};

#[derive(Debug)]
struct StudyTable {
    rows: Vec<Study>,
    next_id: u64,
}

/// 读写锁保护的检查表；查重与插入在同一把写锁内完成
#[derive(Debug, Clone)]
pub struct InMemoryStudyRepository {
    table: Arc<RwLock<StudyTable>>,
}

impl InMemoryStudyRepository {
    pub fn new(initial: Vec<Study>) -> Self {
        let next_id = initial.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        Self {
            table: Arc::new(RwLock::new(StudyTable {
                rows: initial,
                next_id,
            })),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

fn study_not_found(id: u64) -> PacsError {
    PacsError::NotFound(format!("Study {} not found", id))
}

#[async_trait]
impl StudyRepository for InMemoryStudyRepository {
    async fn list(&self) -> Result<Vec<Study>> {
        Ok(self.table.read().await.rows.clone())
    }

    async fn get(&self, id: u64) -> Result<Option<Study>> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|s| s.id == id).cloned())
    }

    async fn create(&self, study: NewStudy) -> Result<Study> {
        let mut table = self.table.write().await;

        if table.rows.iter().any(|s| s.study_id == study.study_id) {
            return Err(PacsError::Conflict(format!(
                "Study ID {} already exists",
                study.study_id
            )));
        }

        // 删除后不复用 id
        let id = table.next_id;
        table.next_id += 1;

        let study = study.into_study(id, Utc::now());
        table.rows.push(study.clone());

        info!(id, study_id = %study.study_id, "Study created");
        Ok(study)
    }

    async fn update_status(&self, id: u64, status: StudyStatus) -> Result<Study> {
        let mut table = self.table.write().await;
        let study = table
            .rows
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| study_not_found(id))?;

        study.status = status;
        study.updated_at = Some(Utc::now());

        info!(id, status = %status, "Study status updated");
        Ok(study.clone())
    }

    async fn delete(&self, id: u64) -> Result<Study> {
        let mut table = self.table.write().await;
        let index = table
            .rows
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| study_not_found(id))?;

        let study = table.rows.remove(index);
        info!(id, study_id = %study.study_id, "Study deleted");
        Ok(study)
    }
}

/// 静态用户表，运行期不可变
#[derive(Debug, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<Vec<User>>,
}

impl InMemoryUserRepository {
    pub fn new(users: Vec<User>) -> Self {
        Self {
            users: Arc::new(users),
        }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<User>> {
        Ok(self.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list(&self) -> Result<Vec<User>> {
        Ok(self.users.as_ref().clone())
    }
}
