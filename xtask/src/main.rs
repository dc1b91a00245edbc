use anyhow::Result;
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Lanshelf 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建所有组件 (release)
    Build,
    /// 运行服务器 (开发模式，自动批准上传)
    Dev {
        /// 共享目录 (默认 ./files)
        #[arg(short, long, default_value = "files")]
        dir: String,
        /// 监听端口
        #[arg(short, long, default_value = "4142")]
        port: String,
    },
    /// 运行 TUI (开发模式)
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 /tmp/lanshelf.log)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
    },
    /// 安装到 /usr/local/bin
    Install,
    /// 从 /usr/local/bin 卸载
    Uninstall,
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .map(std::path::PathBuf::from)
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Dev { dir, port } => dev(&sh, &dir, &port)?,
        Commands::Tui {
            log_level,
            log_file,
        } => tui(&sh, &log_level, log_file)?,
        Commands::Install => install(&sh)?,
        Commands::Uninstall => uninstall(&sh)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(sh, "cargo build --release -p lanshelf-cli -p lanshelf-tui").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn dev(sh: &Shell, dir: &str, port: &str) -> Result<()> {
    println!("🚀 启动开发服务器 (共享 {})...", dir);
    cmd!(
        sh,
        "cargo run -p lanshelf-cli -- --verbose serve --dir {dir} --port {port} --auto approve"
    )
    .run()?;
    Ok(())
}

fn tui(sh: &Shell, log_level: &str, log_file: Option<String>) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| "/tmp/lanshelf.log".to_string());

    println!("🖥️  启动 TUI 调试模式...");
    println!("   日志级别: {}", log_level);
    println!("   日志文件: {}", log_file);
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {}", log_file);
    println!();

    let rust_log = format!(
        "{level},lanshelf_core={level},tower_http=info,hyper=info",
        level = log_level
    );

    // 使用 shell 执行以支持重定向
    let command = format!(
        "RUST_LOG='{}' cargo run -p lanshelf-tui 2>> '{}'",
        rust_log, log_file
    );

    cmd!(sh, "bash -c {command}").run()?;

    println!();
    println!("📁 日志已保存到: {}", log_file);
    Ok(())
}

fn install(sh: &Shell) -> Result<()> {
    println!("📦 安装 Lanshelf...");

    build(sh)?;

    println!("📋 复制二进制文件...");
    cmd!(sh, "sudo cp target/release/lanshelf /usr/local/bin/").run()?;
    cmd!(sh, "sudo cp target/release/lanshelf-tui /usr/local/bin/").run()?;

    println!("✅ 安装完成");
    println!("   使用 'lanshelf serve --dir <目录>' 启动服务器");
    println!("   使用 'lanshelf-tui' 启动管理界面");
    Ok(())
}

fn uninstall(sh: &Shell) -> Result<()> {
    println!("🗑️  卸载 Lanshelf...");

    let _ = cmd!(sh, "sudo rm /usr/local/bin/lanshelf").run();
    let _ = cmd!(sh, "sudo rm /usr/local/bin/lanshelf-tui").run();

    println!("✅ 卸载完成");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("lanshelf-{}-{}", version, std::env::consts::ARCH);

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    cmd!(sh, "cp target/release/lanshelf dist/{dist_name}/").run()?;
    cmd!(sh, "cp target/release/lanshelf-tui dist/{dist_name}/").run()?;
    if sh.path_exists("README.md") {
        cmd!(sh, "cp README.md dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages lanshelf-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    cmd!(sh, "rm -rf dist").run()?;
    println!("✅ 清理完成");
    Ok(())
}
