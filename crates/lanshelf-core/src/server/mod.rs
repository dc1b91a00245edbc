//! HTTP 服务器
//!
//! 路由表只定义一次，任何前端（CLI、TUI）都通过 [`MediaServer`] 使用它。
//!
//! | 方法 | 路径 | 用途 |
//! |------|------|------|
//! | GET  | `/` | 浏览目录 |
//! | GET  | `/player/*path` | 播放页 |
//! | GET  | `/download/*path` | 下载 |
//! | GET  | `/stream/*path` | 支持 Range 的字节流 |
//! | POST | `/upload` | 上传到待审核区 |
//! | POST | `/approve/*path` | 批准（仅本机） |
//! | POST | `/reject/*path` | 拒绝（仅本机） |
//! | POST | `/delete/*path` | 删除（仅本机） |

pub mod auth;
pub mod pages;
pub mod routes;

use crate::config::{ServerConfig, host_name};
use crate::error::Error;
use crate::moderation::NotifySender;
use crate::pending::PendingStore;
use crate::sandbox::Sandbox;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// 服务器共享状态
pub struct AppState {
    pub config: ServerConfig,
    pub store: PendingStore,
    pub notifier: NotifySender,
    /// 页面标题中显示的主机名
    pub host_name: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self {
            Error::Unauthorized => (
                status,
                [(header::WWW_AUTHENTICATE, r#"Basic realm="Login Required""#)],
                "Authentication required",
            )
                .into_response(),
            Error::RangeNotSatisfiable { size } => (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
            )
                .into_response(),
            Error::Io(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!("I/O error while serving request: {}", e);
                (status, "Internal server error").into_response()
            }
            other => (status, other.to_string()).into_response(),
        }
    }
}

/// 构建路由
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = match state.config.max_upload_mb {
        Some(mb) => DefaultBodyLimit::max((mb as usize).saturating_mul(1024 * 1024)),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/", get(routes::index))
        .route("/player/*path", get(routes::player))
        .route("/download/*path", get(routes::download))
        .route("/stream/*path", get(routes::stream))
        .route("/upload", post(routes::upload))
        .route("/approve/*path", post(routes::approve))
        .route("/reject/*path", post(routes::reject))
        .route("/delete/*path", post(routes::delete))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(body_limit)
        .with_state(state)
}

/// 媒体服务器
///
/// 创建时校验根目录，启动后配置不可变。
pub struct MediaServer {
    state: Arc<AppState>,
}

impl MediaServer {
    pub fn new(config: ServerConfig, notifier: NotifySender) -> crate::Result<Self> {
        let sandbox = Sandbox::new(&config.base_dir, &config.pending_dir_name)?;
        Ok(Self {
            state: Arc::new(AppState {
                config,
                store: PendingStore::new(sandbox),
                notifier,
                host_name: host_name(),
            }),
        })
    }

    /// 与服务器共用同一沙箱的待审核存储
    pub fn store(&self) -> PendingStore {
        self.state.store.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// 绑定端口并在后台开始服务
    pub async fn start(self) -> anyhow::Result<ServerHandle> {
        let listener = TcpListener::bind(self.state.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        info!(
            "Serving {:?} on {} (password {})",
            self.state.store.sandbox().root(),
            addr,
            if self.state.config.password_enabled() { "on" } else { "off" }
        );

        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
            if let Err(e) = &result {
                error!("Server error: {}", e);
            }
            result
        });

        Ok(ServerHandle {
            addr,
            shutdown: Some(shutdown_tx),
            task,
        })
    }
}

/// 运行中的服务器
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

impl ServerHandle {
    /// 实际监听地址（端口为 0 时由系统分配）
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// 服务任务是否已退出
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 停止接受新连接，等待进行中的请求结束
    pub async fn stop(mut self) -> anyhow::Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task.await??;
        info!("Server on {} stopped", self.addr);
        Ok(())
    }
}
