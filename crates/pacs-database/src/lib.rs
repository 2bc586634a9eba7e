//! # PACS数据库模块
//!
//! 本地检查与用户数据的仓储抽象。当前实现为带锁的内存存储，进程重启后复位；
//! 处理器只依赖仓储 trait，可替换为真实数据库。

pub mod memory;
pub mod repository;
pub mod seed;

// 重新导出主要类型
pub use memory::{InMemoryStudyRepository, InMemoryUserRepository};
pub use repository::{StudyRepository, UserRepository};
pub use seed::{default_studies, default_users, SeedUser};
