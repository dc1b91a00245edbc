//! 上传审核桥
//!
//! 服务线程在上传成功后把 [`UploadNotification`] 放入有界队列，
//! 管理端按固定间隔取出全部通知并逐条做出批准/拒绝决定。
//!
//! - 入队不阻塞：队列满时丢弃通知，上传本身仍然成功，管理员可通过待审核列表补救
//! - 每条通知只会被一个消费者取走
//! - 决定对整条通知的所有文件生效

use crate::pending::{PendingStore, StagedFile};
use chrono::{DateTime, Local};
use log::{debug, info, warn};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};

/// 管理端轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// 一次上传请求产生的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadNotification {
    pub time: DateTime<Local>,
    /// 目标文件夹（相对内容根目录），根目录为 `/`
    pub target_folder: String,
    /// 待审核区内的相对路径，与 `display_names` 一一对应
    pub pending_paths: Vec<String>,
    pub display_names: Vec<String>,
    pub client_addr: IpAddr,
}

impl UploadNotification {
    /// 没有保存任何文件时返回 `None`
    pub fn from_staged(target_rel: &str, staged: Vec<StagedFile>, client_addr: IpAddr) -> Option<Self> {
        if staged.is_empty() {
            return None;
        }
        let target = target_rel.trim();
        let (pending_paths, display_names) = staged
            .into_iter()
            .map(|s| (s.pending_rel, s.display_name))
            .unzip();
        Some(Self {
            time: Local::now(),
            target_folder: if target.is_empty() { "/".to_string() } else { target.to_string() },
            pending_paths,
            display_names,
            client_addr,
        })
    }

    pub fn file_count(&self) -> usize {
        self.pending_paths.len()
    }

    /// 显示用时间
    pub fn time_label(&self) -> String {
        self.time.format("%Y-%m-%d %H:%M").to_string()
    }
}

/// 审核决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// 审核结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationOutcome {
    /// 批准后文件的新位置
    pub approved: Vec<PathBuf>,
    /// 已删除的文件数
    pub rejected: usize,
    /// 已被处理过或处理失败的文件数
    pub skipped: usize,
}

/// 对一条通知的所有文件执行决定
///
/// 单个文件的失败只记录日志，不影响其他文件。
pub async fn apply_decision(
    store: &PendingStore,
    notification: &UploadNotification,
    decision: Decision,
) -> ModerationOutcome {
    let mut outcome = ModerationOutcome::default();
    for rel in &notification.pending_paths {
        match decision {
            Decision::Approve => match store.approve(rel).await {
                Ok(Some(dest)) => outcome.approved.push(dest),
                Ok(None) => outcome.skipped += 1,
                Err(e) => {
                    warn!("Failed to approve {}: {}", rel, e);
                    outcome.skipped += 1;
                }
            },
            Decision::Reject => match store.reject(rel).await {
                Ok(true) => outcome.rejected += 1,
                Ok(false) => outcome.skipped += 1,
                Err(e) => {
                    warn!("Failed to reject {}: {}", rel, e);
                    outcome.skipped += 1;
                }
            },
        }
    }
    info!(
        "{:?} upload from {} ({} files): {} approved, {} rejected, {} skipped",
        decision,
        notification.client_addr,
        notification.file_count(),
        outcome.approved.len(),
        outcome.rejected,
        outcome.skipped
    );
    outcome
}

/// 审核者
pub trait Moderator {
    fn decide(&mut self, notification: &UploadNotification) -> Decision;
}

/// 固定决定的审核者（无人值守模式）
#[derive(Debug, Clone, Copy)]
pub struct AutoModerator(pub Decision);

impl Moderator for AutoModerator {
    fn decide(&mut self, _notification: &UploadNotification) -> Decision {
        self.0
    }
}

/// 服务端持有的通知发送端
#[derive(Debug, Clone)]
pub struct NotifySender {
    tx: mpsc::Sender<UploadNotification>,
}

impl NotifySender {
    /// 非阻塞入队，返回是否成功
    pub fn notify(&self, notification: UploadNotification) -> bool {
        match self.tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(n)) => {
                warn!(
                    "Moderation queue full, dropped notification for {} files from {}",
                    n.file_count(),
                    n.client_addr
                );
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Moderation queue closed, notification dropped");
                false
            }
        }
    }
}

/// 管理端持有的通知队列
#[derive(Debug)]
pub struct ModerationQueue {
    rx: mpsc::Receiver<UploadNotification>,
}

impl ModerationQueue {
    /// 非阻塞取出当前所有通知
    pub fn drain(&mut self) -> Vec<UploadNotification> {
        let mut out = Vec::new();
        while let Ok(n) = self.rx.try_recv() {
            out.push(n);
        }
        out
    }

    /// 等待下一条通知，所有发送端关闭后返回 `None`
    pub async fn recv(&mut self) -> Option<UploadNotification> {
        self.rx.recv().await
    }

    /// 取出当前所有通知并逐条交给审核者处理，返回处理的通知数
    pub async fn drain_with<M: Moderator>(&mut self, store: &PendingStore, moderator: &mut M) -> usize {
        let batch = self.drain();
        for notification in &batch {
            let decision = moderator.decide(notification);
            apply_decision(store, notification, decision).await;
        }
        batch.len()
    }
}

/// 创建有界审核通道
pub fn bridge(capacity: usize) -> (NotifySender, ModerationQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (NotifySender { tx }, ModerationQueue { rx })
}
