//! 用户认证和授权
//!
//! 口令以 Argon2 哈希保存，登录成功后签发 HS256 JWT。令牌无状态，
//! 过期前一直有效，没有吊销与刷新机制。

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use pacs_core::{PacsError, Result, User, UserProfile, UserRole};
use pacs_database::{SeedUser, UserRepository};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::ApiResult;
use crate::server::AppState;
use crate::validation::{parse_body, Validator};

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub id: u64,
    pub username: String,
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64,
}

/// 登录结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
    pub token: String,
    pub expires_in: String,
}

/// 认证接口，处理器只依赖该 trait
#[async_trait]
pub trait AuthGate: Send + Sync {
    /// 用户名区分大小写；用户不存在与口令错误返回同一个错误
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse>;

    /// 校验签名与过期时间
    fn verify(&self, token: &str) -> Result<Claims>;

    /// 令牌对应的用户资料，用户已不存在时返回 `NotFound`
    async fn current_user(&self, claims: &Claims) -> Result<UserProfile>;

    async fn list_users(&self) -> Result<Vec<UserProfile>>;
}

/// 生成加盐的 Argon2 PHC 字符串
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PacsError::Internal(format!("failed to hash password: {}", e)))
}

fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

/// 把初始用户的明文口令替换为哈希
pub fn hash_seed_users(seeds: Vec<SeedUser>) -> Result<Vec<User>> {
    seeds
        .into_iter()
        .map(|seed| {
            Ok(User {
                id: seed.id,
                username: seed.username.to_string(),
                password_hash: hash_password(seed.password)?,
                email: seed.email.to_string(),
                role: seed.role,
                first_name: seed.first_name.to_string(),
                last_name: seed.last_name.to_string(),
            })
        })
        .collect()
}

const DUMMY_PASSWORD: &str = "no-such-user";

/// 认证服务
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_expiry_hours: i64,
    /// 用户不存在时用于校验的哈希，使两种失败耗时相同
    dummy_hash: String,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        jwt_secret: &str,
        token_expiry_hours: i64,
    ) -> Result<Self> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Ok(Self {
            users,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            token_expiry_hours,
            dummy_hash: hash_password(DUMMY_PASSWORD)?,
        })
    }

    /// 签发令牌
    pub fn issue_token(&self, user: &User) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
            iat: now,
            exp: now + self.token_expiry_hours * 3600,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| PacsError::Internal(format!("failed to sign token: {}", e)))
    }
}

#[async_trait]
impl AuthGate for AuthService {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        let user = self.users.find_by_username(username).await?;

        // 用户不存在时同样做一次完整的 Argon2 校验；该校验是 CPU 密集操作
        let hash = user
            .as_ref()
            .map_or_else(|| self.dummy_hash.clone(), |u| u.password_hash.clone());
        let candidate = password.to_string();
        let matches = tokio::task::spawn_blocking(move || verify_password(&candidate, &hash))
            .await
            .map_err(|e| PacsError::Internal(format!("password check aborted: {}", e)))?;

        let user = match user {
            Some(user) if matches => user,
            Some(_) => {
                warn!(username, "Login failed: wrong password");
                return Err(PacsError::InvalidCredentials);
            }
            None => {
                warn!(username, "Login failed: unknown user");
                return Err(PacsError::InvalidCredentials);
            }
        };

        let token = self.issue_token(&user)?;
        info!(username, role = %user.role, "Login successful");

        Ok(LoginResponse {
            user: user.profile(),
            token,
            expires_in: format!("{}h", self.token_expiry_hours),
        })
    }

    fn verify(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| PacsError::InvalidToken(e.to_string()))
    }

    async fn current_user(&self, claims: &Claims) -> Result<UserProfile> {
        self.users
            .find_by_id(claims.id)
            .await?
            .map(|user| user.profile())
            .ok_or_else(|| PacsError::NotFound("User not found".to_string()))
    }

    async fn list_users(&self) -> Result<Vec<UserProfile>> {
        Ok(self
            .users
            .list()
            .await?
            .iter()
            .map(User::profile)
            .collect())
    }
}

/// `Authorization: Bearer <token>` 中的令牌
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// 认证中间件：校验通过后把 `Claims` 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let claims = {
        let token = bearer_token(request.headers()).ok_or(PacsError::MissingToken)?;
        state.auth.verify(token)?
    };

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// 登录处理器
pub async fn login_handler(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let body = parse_body(&body)?;
    let mut v = Validator::from_body(&body);
    let username = v.required_string("username", "Username is required");
    let password = v.min_length("password", 3, "Password must be at least 3 characters");
    v.finish()?;

    info!(username = %username, "Login attempt");
    let response = state.auth.login(&username, &password).await?;
    Ok(Json(response))
}

/// 当前用户信息
pub async fn me_handler(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.auth.current_user(&claims).await?;
    Ok(Json(profile))
}

/// 认证路由自检，列出可用账号
pub async fn auth_test_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let users: Vec<_> = state
        .auth
        .list_users()
        .await?
        .into_iter()
        .map(|u| json!({ "username": u.username, "role": u.role }))
        .collect();

    Ok(Json(json!({
        "message": "Auth routes are working!",
        "availableUsers": users,
    })))
}
