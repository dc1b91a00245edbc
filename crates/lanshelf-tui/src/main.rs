//! Lanshelf TUI - 服务器管理终端界面
//!
//! 使用 ratatui 启停服务器、审核上传并查看日志。
//!
//! # 日志
//!
//! 日志默认显示在 TUI 的"日志"标签页中。
//! 如需输出到文件进行调试，设置 RUST_LOG 环境变量：
//!
//! ```bash
//! RUST_LOG=debug cargo run -p lanshelf-tui 2>> /tmp/lanshelf.log
//! ```

mod app;
mod tui_log;
mod ui;

use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use lanshelf_core::{AppSettings, Decision};
use ratatui::prelude::*;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use app::{App, AppMode, Tab};
use tui_log::TuiLogLayer;

#[tokio::main]
async fn main() -> Result<()> {
    // 可选参数：共享目录
    let mut settings = AppSettings::load();
    if let Some(dir) = std::env::args().nth(1) {
        settings.server.base_dir = PathBuf::from(dir);
    }

    let mut app = App::new(settings);

    // 初始化日志系统，发送到 TUI 日志面板
    init_logging(app.event_tx.clone());

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;
    app.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    res
}

/// 初始化日志系统
///
/// - 总是将日志发送到 TUI 日志面板
/// - 如果设置了 RUST_LOG，同时输出到 stderr（用于调试）
fn init_logging(log_tx: tokio::sync::mpsc::Sender<app::AppEvent>) {
    // 桥接 log crate（lanshelf-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let tui_layer = TuiLogLayer::new(log_tx);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,lanshelf_core=debug"));

    if std::env::var("RUST_LOG").is_ok() {
        use tracing_subscriber::fmt;

        let stderr_layer = fmt::layer()
            .with_writer(io::stderr)
            .with_target(true)
            .compact();

        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .with(stderr_layer)
            .try_init();
    } else {
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tui_layer)
            .try_init();
    }
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        // 使用 poll 避免无限阻塞，同时让出运行时给后台任务
        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
        {
            // 审核弹窗拦截按键
            if app.current_notification().is_some() {
                match key.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') => app.decide_current(Decision::Approve),
                    KeyCode::Char('n') | KeyCode::Char('N') => app.decide_current(Decision::Reject),
                    _ => {}
                }
                app.tick();
                continue;
            }

            match app.mode {
                AppMode::EditDir | AppMode::EditPassword => match key.code {
                    KeyCode::Esc => app.mode = AppMode::Idle,
                    KeyCode::Enter => app.commit_edit(),
                    KeyCode::Char(c) => app.input_buffer.push(c),
                    KeyCode::Backspace => {
                        app.input_buffer.pop();
                    }
                    _ => {}
                },
                AppMode::Idle => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => {
                        return Ok(());
                    }
                    KeyCode::Char('s') => app.toggle_server(),
                    KeyCode::Char('e') => {
                        app.tab = Tab::Server;
                        app.begin_edit(AppMode::EditDir);
                    }
                    KeyCode::Char('p') => {
                        app.tab = Tab::Server;
                        app.begin_edit(AppMode::EditPassword);
                    }
                    KeyCode::Up | KeyCode::Char('k') => app.previous_pending(),
                    KeyCode::Down | KeyCode::Char('j') => app.next_pending(),
                    KeyCode::Char('a') if app.tab == Tab::Pending => {
                        app.decide_selected(Decision::Approve)
                    }
                    KeyCode::Char('x') if app.tab == Tab::Pending => {
                        app.decide_selected(Decision::Reject)
                    }
                    KeyCode::Char('r') => app.refresh_pending(),
                    KeyCode::Tab => app.next_tab(),
                    KeyCode::Char('1') => app.tab = Tab::Server,
                    KeyCode::Char('2') => {
                        app.tab = Tab::Pending;
                        app.refresh_pending();
                    }
                    KeyCode::Char('3') => app.tab = Tab::Log,
                    KeyCode::Char('d') => app.toggle_log_level(),
                    KeyCode::Char('c') => app.clear_logs(),
                    _ => {}
                },
            }
        }

        // 处理后台事件和上传通知
        app.tick();
        tokio::task::yield_now().await;
    }
}
