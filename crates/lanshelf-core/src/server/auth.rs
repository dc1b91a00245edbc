//! 访问控制
//!
//! - 设置了密码时所有路由都要求 HTTP Basic 认证，用户名固定为 [`AUTH_USER`]
//! - 审核和删除操作只允许来自本机回环地址的请求

use super::AppState;
use crate::error::Error;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use log::debug;
use std::net::IpAddr;
use std::sync::Arc;

/// Basic 认证用户名
pub const AUTH_USER: &str = "user";

/// 检查 `Authorization` 头中的凭据
pub fn check_basic(headers: &HeaderMap, password: &str) -> bool {
    let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some((scheme, encoded)) = value.trim().split_once(' ') else {
        return false;
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return false;
    }
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(credentials) = String::from_utf8(decoded) else {
        return false;
    };
    matches!(
        credentials.split_once(':'),
        Some((user, pass)) if user == AUTH_USER && pass == password
    )
}

/// 认证中间件，未设置密码时直接放行
pub async fn require_auth(State(state): State<Arc<AppState>>, req: Request, next: Next) -> Response {
    if !state.config.password_enabled() || check_basic(req.headers(), &state.config.password) {
        return next.run(req).await;
    }
    debug!("Rejected unauthenticated request to {}", req.uri().path());
    Error::Unauthorized.into_response()
}

/// 请求是否来自本机
///
/// 只看 TCP 对端地址，反向代理后面会失效。
pub fn is_local_admin(ip: IpAddr) -> bool {
    ip.to_canonical().is_loopback()
}

/// 拒绝非本机请求
pub fn ensure_admin(ip: IpAddr) -> crate::Result<()> {
    if is_local_admin(ip) {
        Ok(())
    } else {
        debug!("Denied admin action from {}", ip);
        Err(Error::Forbidden)
    }
}
