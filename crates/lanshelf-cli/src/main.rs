//! Lanshelf CLI
//!
//! 无界面运行媒体服务器，并在终端中审核上传；也可以离线处理待审核文件。

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lanshelf_core::{
    AppSettings, AutoModerator, Decision, MediaServer, Moderator, POLL_INTERVAL, PendingStore,
    Sandbox, UploadNotification, bridge,
};
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lanshelf", version, about = "局域网媒体文件服务器")]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 启动服务器
    Serve {
        /// 共享目录
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// 监听地址
        #[arg(long)]
        host: Option<String>,
        /// 监听端口
        #[arg(short, long)]
        port: Option<u16>,
        /// 访问密码 (空字符串表示关闭认证)
        #[arg(long)]
        password: Option<String>,
        /// 不询问，自动批准或拒绝所有上传
        #[arg(long, value_enum)]
        auto: Option<AutoMode>,
        /// 把本次参数保存为默认设置
        #[arg(long)]
        save: bool,
    },
    /// 列出待审核文件
    Pending {
        /// 共享目录
        #[arg(short, long)]
        dir: Option<PathBuf>,
        /// 以 JSON 输出
        #[arg(long)]
        json: bool,
    },
    /// 批准待审核文件
    Approve {
        /// 待审核区内的相对路径
        path: String,
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// 拒绝（删除）待审核文件
    Reject {
        /// 待审核区内的相对路径
        path: String,
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
    /// 查看当前设置
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum AutoMode {
    Approve,
    Reject,
}

impl From<AutoMode> for Decision {
    fn from(mode: AutoMode) -> Self {
        match mode {
            AutoMode::Approve => Decision::Approve,
            AutoMode::Reject => Decision::Reject,
        }
    }
}

/// 在终端逐条询问
struct PromptModerator;

impl Moderator for PromptModerator {
    fn decide(&mut self, n: &UploadNotification) -> Decision {
        println!();
        println!(
            "📥 [{}] {} 上传了 {} 个文件到 {}",
            n.time_label(),
            n.client_addr,
            n.file_count(),
            n.target_folder
        );
        for name in &n.display_names {
            println!("   - {}", name);
        }
        print!("   批准? [y/N] ");
        let _ = io::stdout().flush();

        let mut line = String::new();
        let read = tokio::task::block_in_place(|| io::stdin().lock().read_line(&mut line));
        match read {
            Ok(_) if matches!(line.trim().to_lowercase().as_str(), "y" | "yes") => {
                println!("   ✅ 已批准");
                Decision::Approve
            }
            _ => {
                println!("   ❌ 已拒绝");
                Decision::Reject
            }
        }
    }
}

enum CliModerator {
    Auto(AutoModerator),
    Prompt(PromptModerator),
}

impl Moderator for CliModerator {
    fn decide(&mut self, n: &UploadNotification) -> Decision {
        match self {
            CliModerator::Auto(m) => {
                let decision = m.decide(n);
                println!(
                    "📥 {} 个文件来自 {} → {:?}",
                    n.file_count(),
                    n.client_addr,
                    decision
                );
                decision
            }
            CliModerator::Prompt(m) => m.decide(n),
        }
    }
}

#[derive(Serialize)]
struct PendingRow {
    path: String,
    size: u64,
    category: &'static str,
}

fn init_logging(verbose: bool) {
    // 桥接 log crate（lanshelf-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default = if verbose {
        "debug"
    } else {
        "info,lanshelf_core=debug"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .try_init();
}

/// 按设置（可被 `--dir` 覆盖）打开待审核存储
fn open_store(settings: &AppSettings, dir: Option<PathBuf>) -> Result<PendingStore> {
    let base = dir.unwrap_or_else(|| settings.server.base_dir.clone());
    let sandbox = Sandbox::new(&base, &settings.server.pending_dir_name)
        .with_context(|| format!("无法打开共享目录 {:?}", base))?;
    Ok(PendingStore::new(sandbox))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = AppSettings::load();
    init_logging(cli.verbose || settings.verbose);

    match cli.command {
        Commands::Serve {
            dir,
            host,
            port,
            password,
            auto,
            save,
        } => {
            if let Some(dir) = dir {
                settings.server.base_dir = dir;
            }
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(password) = password {
                settings.server.password = password;
            }
            if save {
                settings.save()?;
                println!("💾 设置已保存");
            }
            serve(settings, auto).await?;
        }
        Commands::Pending { dir, json } => {
            let store = open_store(&settings, dir)?;
            let pending = store.list_pending();
            if json {
                let rows: Vec<PendingRow> = pending
                    .iter()
                    .map(|p| PendingRow {
                        path: p.rel_path.clone(),
                        size: p.size,
                        category: p.category.as_str(),
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if pending.is_empty() {
                println!("   没有待审核的文件");
            } else {
                for (i, p) in pending.iter().enumerate() {
                    println!("   [{}] {} ({} bytes)", i, p.rel_path, p.size);
                }
            }
        }
        Commands::Approve { path, dir } => {
            let store = open_store(&settings, dir)?;
            match store.approve(&path).await? {
                Some(dest) => println!("✅ 已批准: {}", dest.display()),
                None => println!("   {} 已不在待审核区", path),
            }
        }
        Commands::Reject { path, dir } => {
            let store = open_store(&settings, dir)?;
            if store.reject(&path).await? {
                println!("❌ 已拒绝: {}", path);
            } else {
                println!("   {} 已不在待审核区", path);
            }
        }
        Commands::Config => {
            let server = &settings.server;
            println!("共享目录: {}", server.base_dir.display());
            println!("监听地址: {}", server.bind_addr());
            println!("访问密码: {}", if server.password_enabled() { "已设置" } else { "无" });
            println!("待审核目录: {}", server.pending_dir_name);
            println!("分享链接: {}", server.share_url());
        }
    }

    Ok(())
}

async fn serve(settings: AppSettings, auto: Option<AutoMode>) -> Result<()> {
    let config = settings.server;
    std::fs::create_dir_all(&config.base_dir)
        .with_context(|| format!("无法创建共享目录 {:?}", config.base_dir))?;

    let (notifier, mut queue) = bridge(config.notify_capacity);
    let server = MediaServer::new(config, notifier)?;
    let store = server.store();
    let url_config = server.config().clone();
    let handle = server.start().await?;
    let share_url = url_config.share_url_on(handle.local_addr().port());

    println!("🚀 服务器已启动: {}", share_url);
    println!("   按 Ctrl+C 停止");

    let mut moderator = match auto {
        Some(mode) => CliModerator::Auto(AutoModerator(mode.into())),
        None => CliModerator::Prompt(PromptModerator),
    };

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                queue.drain_with(&store, &mut moderator).await;
                if handle.is_finished() {
                    tracing::error!("Server task exited unexpectedly");
                    break;
                }
            }
            _ = &mut shutdown => {
                println!();
                println!("⏹️  正在停止...");
                break;
            }
        }
    }

    handle.stop().await?;
    Ok(())
}
