//! 路由处理函数

use super::auth::{ensure_admin, is_local_admin};
use super::pages::{self, BrowsePage, browse_url};
use super::AppState;
use crate::catalog::{self, FileQuery, guess_mime};
use crate::error::{Error, Result};
use crate::moderation::UploadNotification;
use crate::pending::StagingBatch;
use crate::stream;
use axum::{
    extract::{ConnectInfo, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use serde::Deserialize;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::io::StreamReader;

fn default_type() -> String {
    "all".to_string()
}

fn default_sort() -> String {
    "name".to_string()
}

fn default_order() -> String {
    "asc".to_string()
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    #[serde(default)]
    pub p: String,
    #[serde(default)]
    pub q: String,
    #[serde(rename = "type", default = "default_type")]
    pub file_type: String,
    #[serde(default = "default_sort")]
    pub sort: String,
    #[serde(default = "default_order")]
    pub order: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct FolderQuery {
    pub p: Option<String>,
}

/// 302 跳转
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn range_header(headers: &HeaderMap) -> Option<&str> {
    // 非 ASCII 的 Range 头按格式错误处理
    headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or(""))
}

/// GET `/`
pub async fn index(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<BrowseQuery>,
) -> Result<Html<String>> {
    let sandbox = state.store.sandbox();
    let dir = sandbox.resolve_dir(&query.p)?;
    let current_rel = sandbox.rel_to_root(&dir).unwrap_or_default();
    let is_admin = is_local_admin(addr.ip());

    let store = state.store.clone();
    let (listing, pending) = tokio::task::spawn_blocking(move || {
        let listing = catalog::list_dir(store.sandbox(), &dir);
        let pending = if is_admin { store.list_pending() } else { Vec::new() };
        (listing, pending)
    })
    .await
    .map_err(|e| Error::Io(io::Error::other(e)))?;

    let files = FileQuery::from_params(&query.q, &query.file_type, &query.sort, &query.order)
        .apply(listing.files);

    let page = BrowsePage {
        host_name: &state.host_name,
        current_rel: &current_rel,
        folders: &listing.folders,
        files: &files,
        search: &query.q,
        file_type: &query.file_type,
        sort: &query.sort,
        order: &query.order,
        password_enabled: state.config.password_enabled(),
        is_admin,
        pending: &pending,
    };
    Ok(Html(pages::browse(&page).into_string()))
}

/// 解析播放、下载、流式路由的文件路径，任何路径错误都按 404 处理
fn content_file(state: &AppState, path: &str) -> Result<PathBuf> {
    state.store.sandbox().resolve_file(path).map_err(|e| match e {
        Error::BadRequest(reason) => {
            debug!("Hiding bad content path {:?}: {}", path, reason);
            Error::not_found("file not found")
        }
        other => other,
    })
}

/// GET `/player/*path`
pub async fn player(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Html<String>> {
    let full = content_file(&state, &path)?;
    if !tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_file()) {
        return Err(Error::not_found("file not found"));
    }
    let rel = state.store.sandbox().rel_to_root(&full).unwrap_or_default();
    let name = full
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Html(pages::player(&name, &rel, guess_mime(&full)).into_string()))
}

/// GET `/download/*path`
pub async fn download(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let full = content_file(&state, &path)?;
    stream::serve_file(&full, range_header(&headers), true).await
}

/// GET `/stream/*path`
pub async fn stream(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response> {
    let full = content_file(&state, &path)?;
    stream::serve_file(&full, range_header(&headers), false).await
}

/// POST `/upload`
///
/// 目标文件夹取查询参数 `p`，没有时取表单中第一个 `p` 字段。
/// 文件写入待审核区后发出一条通知，然后跳转回目标文件夹。
pub async fn upload(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<FolderQuery>,
    mut multipart: Multipart,
) -> Result<Response> {
    let mut target = query.p;
    let mut batch: Option<StagingBatch<'_>> = None;
    let mut saw_files = false;
    let mut failure: Option<Error> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                failure = Some(Error::bad_request(format!("malformed upload: {}", e)));
                break;
            }
        };

        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("p") => {
                let value = match field.text().await {
                    Ok(v) => v,
                    Err(e) => {
                        failure = Some(Error::bad_request(format!("malformed upload: {}", e)));
                        break;
                    }
                };
                // 第一个文件之后目标已固定
                if target.is_none() && batch.is_none() {
                    target = Some(value);
                }
            }
            Some("files") => {
                saw_files = true;
                let filename = field.file_name().unwrap_or_default().to_string();
                if filename.is_empty() {
                    continue;
                }
                if batch.is_none() {
                    // 目标不合法时还没有写入任何文件
                    batch = Some(state.store.begin_stage(target.as_deref().unwrap_or("")).await?);
                }
                let Some(staging) = batch.as_mut() else {
                    continue;
                };

                let reader = StreamReader::new(field.map_err(io::Error::other));
                tokio::pin!(reader);
                if let Err(e) = staging.save(&filename, reader).await {
                    failure = Some(e);
                    break;
                }
            }
            other => debug!("Ignoring upload field {:?}", other),
        }
    }

    let target = target.unwrap_or_default();
    // 通知里使用规范化后的目标文件夹
    let (target_rel, staged) = match batch {
        Some(batch) => (batch.target_rel().to_string(), batch.finish()),
        None => (String::new(), Vec::new()),
    };
    if let Some(notification) = UploadNotification::from_staged(&target_rel, staged, addr.ip()) {
        info!(
            "Staged {} files from {} for {}",
            notification.file_count(),
            notification.client_addr,
            notification.target_folder
        );
        state.notifier.notify(notification);
    }

    if let Some(e) = failure {
        warn!("Upload from {} failed: {}", addr.ip(), e);
        return Err(e);
    }
    if !saw_files {
        return Ok(found("/"));
    }

    let sandbox = state.store.sandbox();
    let dir = sandbox.resolve_dir(&target).map_err(|e| {
        Error::bad_request(format!("invalid upload target: {}", e))
    })?;
    let rel = sandbox.rel_to_root(&dir).unwrap_or_default();
    Ok(found(&browse_url(&rel)))
}

/// POST `/approve/*path`
pub async fn approve(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
) -> Result<Response> {
    ensure_admin(addr.ip())?;
    state.store.approve(&path).await?;
    Ok(found("/"))
}

/// POST `/reject/*path`
pub async fn reject(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
) -> Result<Response> {
    ensure_admin(addr.ip())?;
    state.store.reject(&path).await?;
    Ok(found("/"))
}

/// POST `/delete/*path?p=<folder>`
///
/// 删除失败时静默忽略，总是跳回原文件夹。
pub async fn delete(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(path): Path<String>,
    Query(query): Query<FolderQuery>,
) -> Result<Response> {
    ensure_admin(addr.ip())?;
    match state.store.sandbox().resolve_file(&path) {
        Ok(full) if tokio::fs::metadata(&full).await.is_ok_and(|m| m.is_file()) => {
            match tokio::fs::remove_file(&full).await {
                Ok(()) => info!("Deleted {:?}", full),
                Err(e) => warn!("Failed to delete {:?}: {}", full, e),
            }
        }
        Ok(_) => debug!("Delete skipped, {:?} is not a file", path),
        Err(e) => debug!("Delete skipped for {:?}: {}", path, e),
    }
    Ok(found(&browse_url(query.p.as_deref().unwrap_or(""))))
}
