//! 日志模块
//!
//! 提供跨前端的统一日志级别和条目定义，管理界面用它过滤日志面板。

use std::fmt;

/// 日志级别
///
/// 实现了 `PartialOrd`，数值越大越详细。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    /// 获取对应的图标
    pub fn icon(&self) -> &'static str {
        match self {
            LogLevel::Error => "❌",
            LogLevel::Warn => "⚠️",
            LogLevel::Info => "ℹ️",
            LogLevel::Debug => "🔍",
            LogLevel::Trace => "📝",
        }
    }

    /// 获取显示名称
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    /// 日志面板切换详细程度: Info -> Debug -> Trace -> Info
    pub fn toggled(self) -> Self {
        match self {
            LogLevel::Info => LogLevel::Debug,
            LogLevel::Debug => LogLevel::Trace,
            _ => LogLevel::Info,
        }
    }

    /// 在当前显示级别下是否显示 `other`
    pub fn shows(self, other: LogLevel) -> bool {
        other <= self
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            // 未知级别宽容处理为 Info
            _ => Ok(LogLevel::Info),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 日志条目
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.level.icon(), self.level, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_lenient() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" DEBUG ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("loud".parse::<LogLevel>(), Ok(LogLevel::Info));
    }

    #[test]
    fn test_filtering() {
        assert!(LogLevel::Info.shows(LogLevel::Error));
        assert!(LogLevel::Info.shows(LogLevel::Info));
        assert!(!LogLevel::Info.shows(LogLevel::Debug));
        assert_eq!(LogLevel::Trace.toggled(), LogLevel::Info);
    }
}
