//! 错误类型
//!
//! 所有错误都只作用于触发它的单个请求或审核操作，不会让服务器进程退出。

use std::io;

/// 核心库错误
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 结构性错误：路径穿越、越界、期望目录但不是目录 (400)
    #[error("bad request: {0}")]
    BadRequest(String),

    /// 目录或文件不存在，或文件位于待审核区 (404)
    #[error("not found: {0}")]
    NotFound(String),

    /// 非本机调用管理接口 (403)
    #[error("admin actions are only allowed from the local host")]
    Forbidden,

    /// 缺少或错误的 Basic 认证 (401)
    #[error("authentication required")]
    Unauthorized,

    /// Range 头无法解析或起点越界 (416)
    #[error("range not satisfiable (file size {size})")]
    RangeNotSatisfiable { size: u64 },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Error::BadRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// 对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            Error::BadRequest(_) => 400,
            Error::Unauthorized => 401,
            Error::Forbidden => 403,
            Error::NotFound(_) => 404,
            Error::RangeNotSatisfiable { .. } => 416,
            Error::Io(e) if e.kind() == io::ErrorKind::NotFound => 404,
            Error::Io(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::bad_request("x").status_code(), 400);
        assert_eq!(Error::not_found("x").status_code(), 404);
        assert_eq!(Error::Forbidden.status_code(), 403);
        assert_eq!(Error::Unauthorized.status_code(), 401);
        assert_eq!(Error::RangeNotSatisfiable { size: 3 }.status_code(), 416);
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(missing).status_code(), 404);
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(Error::from(denied).status_code(), 500);
    }
}
