//! Application state

use lanshelf_core::{
    AppSettings, Decision, LogEntry, LogLevel, MediaServer, ModerationOutcome, ModerationQueue,
    POLL_INTERVAL, PendingStore, PendingUpload, ServerHandle, UploadNotification, apply_decision,
    bridge,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// 日志面板最多保留的条数
const MAX_LOGS: usize = 500;
/// 退出时等待服务器停止的时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// 后台任务发回 UI 的事件
pub enum AppEvent {
    LogMessage { level: LogLevel, message: String },
    ServerStarted(ServerHandle),
    ServerStopped,
    ServerFailed(String),
    Moderated { decision: Decision, outcome: ModerationOutcome },
    FileHandled { path: String, decision: Decision, ok: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AppMode {
    Idle,
    EditDir,
    EditPassword,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tab {
    Server,
    Pending,
    Log,
}

pub enum ServerState {
    Stopped,
    Starting,
    Running(ServerHandle),
    Stopping,
}

pub struct App {
    pub mode: AppMode,
    pub tab: Tab,
    pub settings: AppSettings,
    pub server: ServerState,
    pub share_url: String,
    store: Option<PendingStore>,
    queue: Option<ModerationQueue>,
    /// 等待决定的上传通知，队首显示在弹窗中
    pub notifications: VecDeque<UploadNotification>,
    pub pending: Vec<PendingUpload>,
    pub selected_pending: usize,
    pub logs: Vec<LogEntry>,
    pub log_level: LogLevel,
    pub input_buffer: String,
    pub status_message: String,
    pub event_tx: mpsc::Sender<AppEvent>,
    event_rx: mpsc::Receiver<AppEvent>,
    last_poll: Instant,
}

impl App {
    pub fn new(settings: AppSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let log_level = if settings.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Info
        };
        let share_url = settings.server.share_url();
        Self {
            mode: AppMode::Idle,
            tab: Tab::Server,
            settings,
            server: ServerState::Stopped,
            share_url,
            store: None,
            queue: None,
            notifications: VecDeque::new(),
            pending: Vec::new(),
            selected_pending: 0,
            logs: vec![
                LogEntry::new(LogLevel::Info, "Lanshelf TUI 启动"),
                LogEntry::new(LogLevel::Info, "按 's' 启动服务器, 'q' 退出"),
            ],
            log_level,
            input_buffer: String::new(),
            status_message: "服务器未启动".to_string(),
            event_tx,
            event_rx,
            last_poll: Instant::now(),
        }
    }

    pub fn add_log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry::new(level, message));
        if self.logs.len() > MAX_LOGS {
            let excess = self.logs.len() - MAX_LOGS;
            self.logs.drain(..excess);
        }
    }

    /// 当前显示级别下可见的日志
    pub fn visible_logs(&self) -> impl DoubleEndedIterator<Item = &LogEntry> {
        self.logs.iter().filter(|e| self.log_level.shows(e.level))
    }

    pub fn toggle_log_level(&mut self) {
        self.log_level = self.log_level.toggled();
        self.status_message = format!("日志级别: {}", self.log_level);
    }

    pub fn clear_logs(&mut self) {
        self.logs.clear();
    }

    pub fn next_tab(&mut self) {
        self.tab = match self.tab {
            Tab::Server => Tab::Pending,
            Tab::Pending => Tab::Log,
            Tab::Log => Tab::Server,
        };
    }

    pub fn is_running(&self) -> bool {
        matches!(self.server, ServerState::Running(_))
    }

    pub fn toggle_server(&mut self) {
        match self.server {
            ServerState::Stopped => self.start_server(),
            ServerState::Running(_) => self.stop_server(),
            ServerState::Starting | ServerState::Stopping => {}
        }
    }

    fn start_server(&mut self) {
        let config = self.settings.server.clone();
        if let Err(e) = std::fs::create_dir_all(&config.base_dir) {
            self.add_log(LogLevel::Error, format!("无法创建共享目录: {}", e));
            return;
        }

        let (notifier, queue) = bridge(config.notify_capacity);
        self.share_url = config.share_url();
        let server = match MediaServer::new(config, notifier) {
            Ok(server) => server,
            Err(e) => {
                self.add_log(LogLevel::Error, format!("无法启动服务器: {}", e));
                return;
            }
        };
        self.store = Some(server.store());
        self.queue = Some(queue);
        self.server = ServerState::Starting;
        self.status_message = "正在启动...".to_string();
        self.refresh_pending();

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let event = match server.start().await {
                Ok(handle) => AppEvent::ServerStarted(handle),
                Err(e) => AppEvent::ServerFailed(e.to_string()),
            };
            let _ = tx.send(event).await;
        });
    }

    fn stop_server(&mut self) {
        let ServerState::Running(handle) = std::mem::replace(&mut self.server, ServerState::Stopping)
        else {
            return;
        };
        self.status_message = "正在停止...".to_string();

        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let event = match handle.stop().await {
                Ok(()) => AppEvent::ServerStopped,
                Err(e) => AppEvent::ServerFailed(e.to_string()),
            };
            let _ = tx.send(event).await;
        });
    }

    /// 退出前停止服务器，最多等待 [`SHUTDOWN_GRACE`]
    pub async fn shutdown(&mut self) {
        if let ServerState::Running(handle) = std::mem::replace(&mut self.server, ServerState::Stopped)
        {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle.stop()).await;
        }
    }

    /// 服务器退出后收尾
    ///
    /// 队列里剩下的通知仍交给弹窗处理；处理完后才释放旧目录的存储。
    fn detach_server(&mut self) {
        self.server = ServerState::Stopped;
        if let Some(mut queue) = self.queue.take() {
            self.notifications.extend(queue.drain());
        }
        if self.notifications.is_empty() {
            self.store = None;
        }
        self.refresh_pending();
    }

    /// 弹窗中当前显示的通知
    pub fn current_notification(&self) -> Option<&UploadNotification> {
        self.notifications.front()
    }

    /// 对弹窗中的通知做出决定
    pub fn decide_current(&mut self, decision: Decision) {
        let (Some(n), Some(store)) = (self.notifications.pop_front(), self.store.clone()) else {
            return;
        };
        if self.notifications.is_empty() && matches!(self.server, ServerState::Stopped) {
            self.store = None;
        }
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let outcome = apply_decision(&store, &n, decision).await;
            let _ = tx.send(AppEvent::Moderated { decision, outcome }).await;
        });
    }

    pub fn next_pending(&mut self) {
        if !self.pending.is_empty() {
            self.selected_pending = (self.selected_pending + 1) % self.pending.len();
        }
    }

    pub fn previous_pending(&mut self) {
        if !self.pending.is_empty() {
            self.selected_pending = self
                .selected_pending
                .checked_sub(1)
                .unwrap_or(self.pending.len() - 1);
        }
    }

    /// 对待审核列表中选中的单个文件做出决定
    pub fn decide_selected(&mut self, decision: Decision) {
        let (Some(upload), Some(store)) = (
            self.pending.get(self.selected_pending).cloned(),
            self.pending_store(),
        ) else {
            return;
        };
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let path = upload.rel_path;
            let ok = match decision {
                Decision::Approve => matches!(store.approve(&path).await, Ok(Some(_))),
                Decision::Reject => matches!(store.reject(&path).await, Ok(true)),
            };
            let _ = tx.send(AppEvent::FileHandled { path, decision, ok }).await;
        });
    }

    /// 服务器运行时使用它的存储，停止后按当前设置的共享目录操作
    fn pending_store(&self) -> Option<PendingStore> {
        if !matches!(self.server, ServerState::Stopped)
            && let Some(store) = &self.store
        {
            return Some(store.clone());
        }
        let server = &self.settings.server;
        lanshelf_core::Sandbox::new(&server.base_dir, &server.pending_dir_name)
            .ok()
            .map(PendingStore::new)
    }

    pub fn refresh_pending(&mut self) {
        self.pending = self
            .pending_store()
            .map(|store| store.list_pending())
            .unwrap_or_default();
        if self.selected_pending >= self.pending.len() {
            self.selected_pending = self.pending.len().saturating_sub(1);
        }
    }

    pub fn begin_edit(&mut self, mode: AppMode) {
        self.input_buffer = match mode {
            AppMode::EditDir => self.settings.server.base_dir.display().to_string(),
            AppMode::EditPassword => self.settings.server.password.clone(),
            AppMode::Idle => String::new(),
        };
        self.mode = mode;
    }

    /// 保存输入框内容到设置
    pub fn commit_edit(&mut self) {
        let value = self.input_buffer.trim().to_string();
        match self.mode {
            AppMode::EditDir if !value.is_empty() => {
                self.settings.server.base_dir = PathBuf::from(&value);
                self.add_log(LogLevel::Info, format!("共享目录已更新为: {}", value));
            }
            AppMode::EditPassword => {
                self.settings.server.password = value;
                let state = if self.settings.server.password_enabled() {
                    "已设置"
                } else {
                    "已关闭"
                };
                self.add_log(LogLevel::Info, format!("访问密码{}", state));
            }
            _ => {}
        }
        if let Err(e) = self.settings.save() {
            self.add_log(LogLevel::Warn, format!("保存设置失败: {}", e));
        }
        if self.is_running() {
            self.add_log(LogLevel::Warn, "重启服务器后生效");
        }
        self.mode = AppMode::Idle;
        self.refresh_pending();
    }

    fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::LogMessage { level, message } => self.add_log(level, message),
            AppEvent::ServerStarted(handle) => {
                self.share_url = self.settings.server.share_url_on(handle.local_addr().port());
                self.add_log(LogLevel::Info, format!("服务器已启动: {}", self.share_url));
                self.status_message = format!("运行中 {}", handle.local_addr());
                self.server = ServerState::Running(handle);
            }
            AppEvent::ServerStopped => {
                self.detach_server();
                self.status_message = "服务器已停止".to_string();
                self.add_log(LogLevel::Info, "服务器已停止");
            }
            AppEvent::ServerFailed(e) => {
                self.detach_server();
                self.status_message = "服务器出错".to_string();
                self.add_log(LogLevel::Error, format!("服务器错误: {}", e));
            }
            AppEvent::Moderated { decision, outcome } => {
                let message = match decision {
                    Decision::Approve => format!("已批准 {} 个文件", outcome.approved.len()),
                    Decision::Reject => format!("已拒绝 {} 个文件", outcome.rejected),
                };
                self.add_log(LogLevel::Info, message);
                if outcome.skipped > 0 {
                    self.add_log(LogLevel::Warn, format!("{} 个文件已被处理或失败", outcome.skipped));
                }
                self.refresh_pending();
            }
            AppEvent::FileHandled { path, decision, ok } => {
                let verb = match decision {
                    Decision::Approve => "批准",
                    Decision::Reject => "拒绝",
                };
                if ok {
                    self.add_log(LogLevel::Info, format!("已{}: {}", verb, path));
                } else {
                    self.add_log(LogLevel::Warn, format!("{}失败或已处理: {}", verb, path));
                }
                self.refresh_pending();
            }
        }
    }

    /// 处理后台事件，并按固定间隔取出上传通知
    pub fn tick(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
        }

        if self.last_poll.elapsed() >= POLL_INTERVAL {
            self.last_poll = Instant::now();
            if let Some(queue) = self.queue.as_mut() {
                let fresh = queue.drain();
                if !fresh.is_empty() {
                    let count: usize = fresh.iter().map(|n| n.file_count()).sum();
                    self.notifications.extend(fresh);
                    self.add_log(LogLevel::Info, format!("收到 {} 个新上传文件，等待审核", count));
                    self.refresh_pending();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(AppSettings::default())
    }

    #[test]
    fn test_log_filter_and_cap() {
        let mut app = app();
        app.clear_logs();
        app.add_log(LogLevel::Debug, "hidden");
        app.add_log(LogLevel::Warn, "shown");
        assert_eq!(app.visible_logs().count(), 1);

        app.toggle_log_level();
        assert_eq!(app.log_level, LogLevel::Debug);
        assert_eq!(app.visible_logs().count(), 2);

        for i in 0..MAX_LOGS + 10 {
            app.add_log(LogLevel::Info, format!("{}", i));
        }
        assert_eq!(app.logs.len(), MAX_LOGS);
        assert_eq!(app.logs.last().unwrap().message, format!("{}", MAX_LOGS + 9));
    }

    #[test]
    fn test_tab_cycle() {
        let mut app = app();
        app.next_tab();
        assert_eq!(app.tab, Tab::Pending);
        app.next_tab();
        app.next_tab();
        assert_eq!(app.tab, Tab::Server);
    }

    #[test]
    fn test_pending_selection_wraps() {
        let dir = tempfile::tempdir().unwrap();
        let pending = dir.path().join("_pending_uploads");
        std::fs::create_dir(&pending).unwrap();
        std::fs::write(pending.join("a.txt"), b"a").unwrap();
        std::fs::write(pending.join("b.txt"), b"b").unwrap();

        let mut settings = AppSettings::default();
        settings.server.base_dir = dir.path().to_path_buf();
        let mut app = App::new(settings);
        app.refresh_pending();
        assert_eq!(app.pending.len(), 2);

        app.previous_pending();
        assert_eq!(app.selected_pending, 1);
        app.next_pending();
        assert_eq!(app.selected_pending, 0);
    }

    fn dir_with_pending(file: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let pending = dir.path().join("_pending_uploads");
        std::fs::create_dir(&pending).unwrap();
        std::fs::write(pending.join(file), b"x").unwrap();
        dir
    }

    fn pending_names(app: &App) -> Vec<&str> {
        app.pending.iter().map(|p| p.rel_path.as_str()).collect()
    }

    #[test]
    fn test_pending_follows_directory_after_stop() {
        let a = dir_with_pending("from_a.txt");
        let b = dir_with_pending("from_b.txt");

        let mut settings = AppSettings::default();
        settings.server.base_dir = a.path().to_path_buf();
        let mut app = App::new(settings);

        // 模拟服务器在 A 上运行
        let sandbox = lanshelf_core::Sandbox::new(a.path(), "_pending_uploads").unwrap();
        let (_notifier, queue) = bridge(4);
        app.store = Some(PendingStore::new(sandbox));
        app.queue = Some(queue);
        app.server = ServerState::Stopping;
        app.refresh_pending();
        assert_eq!(pending_names(&app), ["from_a.txt"]);

        app.handle_event(AppEvent::ServerStopped);
        assert!(app.store.is_none());
        assert!(app.queue.is_none());

        // 停止后修改目录，待审核列表跟随新目录
        app.settings.server.base_dir = b.path().to_path_buf();
        app.refresh_pending();
        assert_eq!(pending_names(&app), ["from_b.txt"]);
    }

    #[test]
    fn test_failed_server_releases_store() {
        let a = dir_with_pending("from_a.txt");
        let b = dir_with_pending("from_b.txt");

        let mut settings = AppSettings::default();
        settings.server.base_dir = b.path().to_path_buf();
        let mut app = App::new(settings);
        let sandbox = lanshelf_core::Sandbox::new(a.path(), "_pending_uploads").unwrap();
        app.store = Some(PendingStore::new(sandbox));
        app.server = ServerState::Starting;

        app.handle_event(AppEvent::ServerFailed("address in use".to_string()));
        assert!(app.store.is_none());
        assert_eq!(pending_names(&app), ["from_b.txt"]);
    }

    #[test]
    fn test_begin_edit_prefills() {
        let mut settings = AppSettings::default();
        settings.server.password = "pw".to_string();
        let mut app = App::new(settings);
        app.begin_edit(AppMode::EditPassword);
        assert_eq!(app.input_buffer, "pw");
        assert_eq!(app.mode, AppMode::EditPassword);
    }
}
