//! Orthanc 连接器

use async_trait::async_trait;
use pacs_core::{PacsError, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::PacsClient;
use crate::models::{OrthancPatient, OrthancSeries, OrthancStudy, OrthancUploadResponse};

/// 认证配置
#[derive(Debug, Clone)]
pub enum Authentication {
    None,
    BasicAuth { username: String, password: String },
}

/// Orthanc 连接配置
#[derive(Debug, Clone)]
pub struct OrthancConfig {
    /// 只读代理端点（如 nginx 反代），不需要凭据
    pub proxy_url: String,
    /// 直连端点，需要 Basic 认证
    pub direct_url: String,
    pub direct_auth: Authentication,
    /// 单个实例上传的超时
    pub upload_timeout: Duration,
}

/// 请求发往哪个端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endpoint {
    Proxy,
    Direct,
}

/// 基于 reqwest 的 Orthanc 客户端
#[derive(Debug, Clone)]
pub struct OrthancClient {
    config: OrthancConfig,
    proxy_base: Url,
    direct_base: Url,
    client: reqwest::Client,
}

fn parse_base(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| PacsError::Config(format!("invalid PACS URL {}: {}", raw, e)))?;
    if url.cannot_be_a_base() {
        return Err(PacsError::Config(format!("PACS URL {} cannot be a base", raw)));
    }
    Ok(url)
}

/// PACS 资源 ID 作为单个路径段使用，空值和 `.`/`..` 不合法
fn resource_id(id: &str) -> Result<&str> {
    match id {
        "" | "." | ".." => Err(PacsError::invalid_field("id", format!("Invalid PACS identifier: {:?}", id))),
        id => Ok(id),
    }
}

impl OrthancClient {
    pub fn new(config: OrthancConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PacsError::Config(format!("failed to build HTTP client: {}", e)))?;

        let config = OrthancConfig {
            proxy_url: config.proxy_url.trim_end_matches('/').to_string(),
            direct_url: config.direct_url.trim_end_matches('/').to_string(),
            ..config
        };

        Ok(Self {
            proxy_base: parse_base(&config.proxy_url)?,
            direct_base: parse_base(&config.direct_url)?,
            config,
            client,
        })
    }

    /// 在基地址后逐段追加路径，每段都做百分号编码
    fn url(&self, endpoint: Endpoint, segments: &[&str]) -> Url {
        let mut url = match endpoint {
            Endpoint::Proxy => self.proxy_base.clone(),
            Endpoint::Direct => self.direct_base.clone(),
        };
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, endpoint: Endpoint, segments: &[&str]) -> RequestBuilder {
        let url = self.url(endpoint, segments);
        debug!(%method, %url, "PACS request");

        let request = self.client.request(method, url);
        match endpoint {
            Endpoint::Proxy => request,
            Endpoint::Direct => Self::add_auth_headers(request, &self.config.direct_auth),
        }
    }

    /// 添加认证头
    fn add_auth_headers(request: RequestBuilder, auth: &Authentication) -> RequestBuilder {
        match auth {
            Authentication::None => request,
            Authentication::BasicAuth { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(target_entity = what, error = %e, "PACS call failed");
            transport_error(e)
        })?;
        check_status(response, what)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str], what: &str) -> Result<T> {
        let response = self
            .send(self.request(Method::GET, Endpoint::Proxy, segments), what)
            .await?;
        decode(response, what).await
    }
}

fn transport_error(err: reqwest::Error) -> PacsError {
    if err.is_timeout() {
        PacsError::RemoteUnavailable(format!("request timed out: {}", err))
    } else {
        PacsError::RemoteUnavailable(err.to_string())
    }
}

fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    warn!(target_entity = what, status = status.as_u16(), "PACS returned error status");
    if status == StatusCode::NOT_FOUND {
        Err(PacsError::RemoteNotFound(what.to_string()))
    } else {
        Err(PacsError::RemoteStatus {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        })
    }
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    response.json::<T>().await.map_err(|e| {
        PacsError::RemoteUnavailable(format!("malformed response for {}: {}", what, e))
    })
}

#[async_trait]
impl PacsClient for OrthancClient {
    async fn list_patients(&self) -> Result<Vec<String>> {
        self.get_json(&["patients"], "Patient list").await
    }

    async fn get_patient(&self, id: &str) -> Result<OrthancPatient> {
        let id = resource_id(id)?;
        self.get_json(&["patients", id], &format!("Patient {}", id))
            .await
    }

    async fn list_studies(&self) -> Result<Vec<String>> {
        self.get_json(&["studies"], "Study list").await
    }

    async fn get_study(&self, id: &str) -> Result<OrthancStudy> {
        let id = resource_id(id)?;
        self.get_json(&["studies", id], &format!("Study {}", id))
            .await
    }

    async fn get_series(&self, id: &str) -> Result<OrthancSeries> {
        let id = resource_id(id)?;
        self.get_json(&["series", id], &format!("Series {}", id))
            .await
    }

    async fn upload_instance(&self, data: Vec<u8>) -> Result<OrthancUploadResponse> {
        let request = self
            .request(Method::POST, Endpoint::Direct, &["instances"])
            .header(reqwest::header::CONTENT_TYPE, "application/dicom")
            .timeout(self.config.upload_timeout)
            .body(data);

        let response = self.send(request, "Instance upload").await?;
        decode(response, "Instance upload").await
    }

    async fn delete_study(&self, id: &str) -> Result<()> {
        let id = resource_id(id)?;
        let what = format!("Study {}", id);
        self.send(
            self.request(Method::DELETE, Endpoint::Direct, &["studies", id]),
            &what,
        )
        .await?;
        Ok(())
    }

    async fn system_info(&self) -> Result<Value> {
        self.get_json(&["system"], "System info").await
    }

    async fn system_info_direct(&self) -> Result<Value> {
        let response = self
            .send(
                self.request(Method::GET, Endpoint::Direct, &["system"]),
                "System info",
            )
            .await?;
        decode(response, "System info").await
    }

    fn direct_url(&self) -> &str {
        &self.config.direct_url
    }

    fn proxy_url(&self) -> &str {
        &self.config.proxy_url
    }
}
