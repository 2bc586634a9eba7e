//! # PACS存储模块
//!
//! 负责上传影像文件在本地的暂存。

pub mod storage;

pub use storage::*;
