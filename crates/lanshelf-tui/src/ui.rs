//! UI rendering module

use lanshelf_core::server::pages::{format_time, human_size};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Tabs, Wrap},
};

use crate::app::{App, AppMode, ServerState, Tab};

pub fn draw(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Status bar
        ])
        .split(frame.area());

    draw_header(frame, app, chunks[0]);
    draw_main(frame, app, chunks[1]);
    draw_status_bar(frame, app, chunks[2]);

    if app.current_notification().is_some() {
        draw_moderation_popup(frame, app);
    }
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let pending_title = format!("待审核 ({}) [2]", app.pending.len());
    let titles = vec!["服务器 [1]".to_string(), pending_title, "日志 [3]".to_string()];
    let selected = match app.tab {
        Tab::Server => 0,
        Tab::Pending => 1,
        Tab::Log => 2,
    };

    let tabs = Tabs::new(titles)
        .block(Block::default().borders(Borders::ALL).title(" Lanshelf "))
        .select(selected)
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Yellow).bold());

    frame.render_widget(tabs, area);
}

fn draw_main(frame: &mut Frame, app: &App, area: Rect) {
    match app.tab {
        Tab::Server => draw_server_tab(frame, app, area),
        Tab::Pending => draw_pending_tab(frame, app, area),
        Tab::Log => draw_log_tab(frame, app, area),
    }
}

fn draw_server_tab(frame: &mut Frame, app: &App, area: Rect) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(3)])
        .split(area);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(rows[0]);

    let server = &app.settings.server;
    let state = match app.server {
        ServerState::Stopped => Span::styled("已停止", Style::default().fg(Color::Red)),
        ServerState::Starting => Span::styled("启动中...", Style::default().fg(Color::Yellow)),
        ServerState::Running(_) => Span::styled("运行中", Style::default().fg(Color::Green)),
        ServerState::Stopping => Span::styled("停止中...", Style::default().fg(Color::Yellow)),
    };
    let url = if app.is_running() {
        Span::styled(app.share_url.clone(), Style::default().fg(Color::Cyan).bold())
    } else {
        Span::raw("--")
    };

    let info = vec![
        Line::from(vec![Span::raw("状态:     "), state]),
        Line::from(vec![Span::raw("分享链接: "), url]),
        Line::from(format!("共享目录: {}", server.base_dir.display())),
        Line::from(format!("监听地址: {}", server.bind_addr())),
        Line::from(format!(
            "访问密码: {}",
            if server.password_enabled() { "🔒 已设置 (用户名 user)" } else { "无" }
        )),
        Line::from(format!("待审核目录: {}", server.pending_dir_name)),
    ];
    let info = Paragraph::new(info)
        .block(Block::default().borders(Borders::ALL).title(" 📡 服务器 "))
        .wrap(Wrap { trim: false });
    frame.render_widget(info, chunks[0]);

    let help_text = if app.is_running() {
        "按 's' 停止服务器\n按 'e' 修改共享目录\n按 'p' 修改密码\nTab 切换标签\n\n修改设置后需重启服务器"
    } else {
        "按 's' 启动服务器\n按 'e' 修改共享目录\n按 'p' 修改密码\n按 'q' 退出"
    };
    let help = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title(" 帮助 "))
        .wrap(Wrap { trim: true });
    frame.render_widget(help, chunks[1]);

    let (title, content) = match app.mode {
        AppMode::EditDir => (" 共享目录 (Enter 保存, Esc 取消) ", app.input_buffer.clone()),
        AppMode::EditPassword => (
            " 访问密码 (留空关闭, Enter 保存, Esc 取消) ",
            app.input_buffer.clone(),
        ),
        AppMode::Idle => (" 输入 ", String::new()),
    };
    let style = if app.mode == AppMode::Idle {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let input = Paragraph::new(content)
        .style(style)
        .block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(input, rows[1]);
}

fn draw_pending_tab(frame: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .pending
        .iter()
        .enumerate()
        .map(|(i, upload)| {
            let content = format!(
                "{}  {}  {}",
                upload.rel_path,
                human_size(upload.size),
                format_time(upload.modified)
            );
            let style = if i == app.selected_pending {
                Style::default().bg(Color::DarkGray).fg(Color::White)
            } else {
                Style::default()
            };
            ListItem::new(content).style(style)
        })
        .collect();

    let title = if app.pending.is_empty() {
        " 📥 没有待审核的文件 "
    } else {
        " 📥 待审核 ([a]批准 [x]拒绝 [r]刷新) "
    };
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, area);
}

fn draw_log_tab(frame: &mut Frame, app: &App, area: Rect) {
    let height = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem> = app
        .visible_logs()
        .rev()
        .take(height)
        .map(|entry| {
            let color = match entry.level {
                lanshelf_core::LogLevel::Error => Color::Red,
                lanshelf_core::LogLevel::Warn => Color::Yellow,
                lanshelf_core::LogLevel::Info => Color::White,
                _ => Color::DarkGray,
            };
            ListItem::new(entry.to_string()).style(Style::default().fg(color))
        })
        .collect();

    let title = format!(" 📋 日志 [{}] ([d]级别 [c]清空) ", app.log_level);
    let list = List::new(items).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(list, area);
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let mode_text = match app.server {
        ServerState::Running(_) => " 🟢 运行中 ",
        ServerState::Starting | ServerState::Stopping => " 🟡 ",
        ServerState::Stopped => " ⏸️  已停止 ",
    };

    let status = Paragraph::new(format!(
        "{}│ {} │ 待审核: {} │ [s]启停 [Tab]切换 [q]退出",
        mode_text,
        app.status_message,
        app.pending.len()
    ))
    .block(Block::default().borders(Borders::ALL));

    frame.render_widget(status, area);
}

fn draw_moderation_popup(frame: &mut Frame, app: &App) {
    let Some(n) = app.current_notification() else {
        return;
    };
    let area = centered_rect(60, 50, frame.area());

    let mut lines = vec![
        Line::from(format!("时间: {}", n.time_label())),
        Line::from(format!("来自: {}", n.client_addr)),
        Line::from(format!("目标: {}", n.target_folder)),
        Line::from(format!("文件 ({}):", n.file_count())),
    ];
    lines.extend(n.display_names.iter().map(|name| Line::from(format!("  • {}", name))));
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("[y] 全部批准", Style::default().fg(Color::Green).bold()),
        Span::raw("   "),
        Span::styled("[n] 全部拒绝", Style::default().fg(Color::Red).bold()),
    ]));
    if app.notifications.len() > 1 {
        lines.push(Line::from(format!("还有 {} 条上传等待审核", app.notifications.len() - 1)));
    }

    let popup = Paragraph::new(lines)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" 📥 新上传 ")
                .style(Style::default().fg(Color::Yellow)),
        )
        .wrap(Wrap { trim: true });

    frame.render_widget(Clear, area);
    frame.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
