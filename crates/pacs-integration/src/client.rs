//! PACS 客户端接口

use async_trait::async_trait;
use pacs_core::Result;
use serde_json::Value;

use crate::models::{OrthancPatient, OrthancSeries, OrthancStudy, OrthancUploadResponse};

/// 外部 PACS 服务的访问接口
///
/// 单次调用失败立即返回，不做重试；错误信息中保留底层原因用于诊断。
#[async_trait]
pub trait PacsClient: Send + Sync {
    /// 全部患者 ID
    async fn list_patients(&self) -> Result<Vec<String>>;

    async fn get_patient(&self, id: &str) -> Result<OrthancPatient>;

    /// 全部检查 ID
    async fn list_studies(&self) -> Result<Vec<String>>;

    async fn get_study(&self, id: &str) -> Result<OrthancStudy>;

    async fn get_series(&self, id: &str) -> Result<OrthancSeries>;

    /// 上传单个 DICOM 实例（原始字节）
    async fn upload_instance(&self, data: Vec<u8>) -> Result<OrthancUploadResponse>;

    async fn delete_study(&self, id: &str) -> Result<()>;

    /// 经代理端点读取 `/system`
    async fn system_info(&self) -> Result<Value>;

    /// 经直连端点（带凭据）读取 `/system`
    async fn system_info_direct(&self) -> Result<Value>;

    /// 直连端点的基地址，用于拼接查看器链接
    fn direct_url(&self) -> &str;

    /// 代理端点的基地址
    fn proxy_url(&self) -> &str;
}
