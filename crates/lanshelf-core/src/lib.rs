//! Lanshelf Core Library
//!
//! 局域网媒体文件服务器的核心实现：浏览、流式播放、下载，以及需要主机审核的上传。
//!
//! # 模块
//!
//! - **sandbox**: 把客户端给出的相对路径限制在内容根目录内
//! - **catalog**: 目录列表、搜索过滤和排序
//! - **stream**: 支持 HTTP Range 的分块文件传输
//! - **pending**: 待审核上传的暂存、批准和拒绝
//! - **moderation**: 服务线程与管理端之间的上传通知队列
//! - **server**: HTTP 路由表与服务器生命周期
//! - **config** / **logging**: 设置持久化与日志模型
//!
//! # 使用示例
//!
//! ```ignore
//! use lanshelf_core::{AutoModerator, Decision, MediaServer, ServerConfig, bridge};
//!
//! let config = ServerConfig::default();
//! let (notifier, mut queue) = bridge(config.notify_capacity);
//! let server = MediaServer::new(config, notifier)?;
//! let store = server.store();
//! let handle = server.start().await?;
//!
//! // 管理端定期取出上传通知并做出决定
//! let mut moderator = AutoModerator(Decision::Approve);
//! queue.drain_with(&store, &mut moderator).await;
//!
//! handle.stop().await?;
//! ```

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod moderation;
pub mod pending;
pub mod sandbox;
pub mod server;
pub mod stream;

pub use error::{Error, Result};

pub use config::{AppSettings, ServerConfig, host_name, local_ip};

pub use sandbox::Sandbox;

pub use catalog::{Category, FileEntry, FileQuery, FolderEntry, Listing, SortKey};

pub use pending::{PendingStore, PendingUpload, StagedFile};

pub use moderation::{
    AutoModerator, Decision, ModerationOutcome, ModerationQueue, Moderator, NotifySender,
    POLL_INTERVAL, UploadNotification, apply_decision, bridge,
};

pub use server::{AppState, MediaServer, ServerHandle, build_router};

pub use logging::{LogEntry, LogLevel};
