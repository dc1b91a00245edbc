//! 应用配置和持久化
//!
//! 提供共享目录、监听地址、端口、密码等设置的存储和读取。
//! 服务器启动后配置不可变，修改需要重启服务器。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, UdpSocket};
use std::path::PathBuf;

/// 默认端口
pub const DEFAULT_PORT: u16 = 4142;
/// 待审核上传目录名
pub const DEFAULT_PENDING_DIR: &str = "_pending_uploads";
/// 通知队列默认容量
pub const DEFAULT_NOTIFY_CAPACITY: usize = 64;

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 共享的根目录
    pub base_dir: PathBuf,
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 访问密码，空字符串表示不需要认证
    pub password: String,
    /// 待审核目录名（位于根目录下）
    pub pending_dir_name: String,
    /// 上传通知队列容量，满了之后丢弃新通知
    pub notify_capacity: usize,
    /// 单次请求体上限 (MB)，未设置则不限制
    pub max_upload_mb: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("files"),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            password: String::new(),
            pending_dir_name: DEFAULT_PENDING_DIR.to_string(),
            notify_capacity: DEFAULT_NOTIFY_CAPACITY,
            max_upload_mb: None,
        }
    }
}

impl ServerConfig {
    /// 是否启用了密码
    pub fn password_enabled(&self) -> bool {
        !self.password.is_empty()
    }

    /// 监听地址字符串
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// 其他设备访问用的 URL
    pub fn share_url(&self) -> String {
        self.share_url_on(self.port)
    }

    /// 使用实际监听端口生成分享链接（配置端口为 0 时由系统分配）
    pub fn share_url_on(&self, port: u16) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" => local_ip(),
            other => other.to_string(),
        };
        format!("http://{}:{}/", host, port)
    }
}

/// 应用设置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// 服务器配置
    pub server: ServerConfig,
    /// 详细日志模式
    pub verbose: bool,
}

impl AppSettings {
    /// 获取配置文件路径
    fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lanshelf");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        let path = Self::config_path();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// 获取本机局域网 IP
///
/// 通过 UDP "连接" 外部地址让系统选择出口网卡，不会真正发送数据。
pub fn local_ip() -> String {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect(("8.8.8.8", 80))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_string())
}

/// 获取主机名（显示在页面标题中）
pub fn host_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "lanshelf".to_string())
}
