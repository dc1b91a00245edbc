//! 路径沙箱
//!
//! 把客户端提交的相对路径解析到配置的根目录内部。
//!
//! - 任何逻辑分段等于 `..` 的路径直接拒绝 (400)
//! - 解析符号链接后必须仍以边界根目录为前缀，否则拒绝 (400)
//! - 内容根目录下落入待审核区的文件视为不存在 (404)

use crate::error::{Error, Result};
use log::warn;
use std::ffi::OsString;
use std::io;
use std::path::{Component, Path, PathBuf};

/// 规范化客户端提交的相对路径
///
/// 去掉首尾空白，反斜杠转为正斜杠；`""`、`"."`、`"/"` 表示根目录本身（返回空路径）。
pub fn normalize_rel(rel: &str) -> Result<PathBuf> {
    let rel = rel.trim().replace('\\', "/");
    let mut out = PathBuf::new();
    for segment in rel.split('/') {
        match segment {
            ".." => {
                return Err(Error::bad_request(
                    "invalid path: directory traversal detected",
                ));
            }
            "" | "." => {}
            other => out.push(other),
        }
    }
    Ok(out)
}

/// 以正斜杠连接路径分段
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// 解析路径中的符号链接，允许末尾若干段尚不存在
///
/// 找到最深的已存在祖先目录做 canonicalize，再接上其余分段。
fn resolve_lenient(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut missing: Vec<OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                for part in missing.iter().rev() {
                    resolved.push(part);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let name = existing.file_name().map(|n| n.to_os_string());
                match (name, existing.parent()) {
                    (Some(name), Some(parent)) => {
                        missing.push(name);
                        existing = parent.to_path_buf();
                    }
                    _ => return Err(e),
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// 沙箱：内容根目录 + 待审核根目录
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    pending: PathBuf,
}

impl Sandbox {
    /// 创建沙箱，根目录必须存在且是目录
    pub fn new(base_dir: &Path, pending_dir_name: &str) -> Result<Self> {
        let root = base_dir.canonicalize().map_err(|e| {
            Error::not_found(format!("server root {}: {}", base_dir.display(), e))
        })?;
        if !root.is_dir() {
            return Err(Error::bad_request(format!(
                "server root {} is not a directory",
                root.display()
            )));
        }

        let name = normalize_rel(pending_dir_name)?;
        if name.as_os_str().is_empty() || name.components().count() != 1 {
            return Err(Error::bad_request(format!(
                "invalid pending directory name: {:?}",
                pending_dir_name
            )));
        }
        let pending = resolve_lenient(&root.join(&name))?;
        if !pending.starts_with(&root) {
            return Err(Error::bad_request("pending directory escapes the server root"));
        }

        Ok(Self { root, pending })
    }

    /// 内容根目录（已 canonicalize）
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 待审核根目录
    pub fn pending_root(&self) -> &Path {
        &self.pending
    }

    /// 待审核目录名
    pub fn pending_dir_name(&self) -> &str {
        self.pending
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// 是否位于待审核区内（含待审核根目录本身）
    pub fn is_pending(&self, path: &Path) -> bool {
        path.starts_with(&self.pending)
    }

    /// 解析内容根目录下的目录
    pub fn resolve_dir(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = normalize_rel(rel)?;
        let full = self
            .root
            .join(&rel_path)
            .canonicalize()
            .map_err(|_| Error::not_found("directory not found"))?;

        self.ensure_inside(&full, &self.root, rel)?;
        if self.is_pending(&full) {
            return Err(Error::not_found("directory not found"));
        }
        if !full.is_dir() {
            return Err(Error::bad_request("path is not a directory"));
        }
        Ok(full)
    }

    /// 解析内容根目录下的文件
    ///
    /// 不检查文件是否存在，由调用方决定如何处理。
    pub fn resolve_file(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = normalize_rel(rel)?;
        let full = resolve_lenient(&self.root.join(&rel_path))
            .map_err(|_| Error::not_found("file not found"))?;

        self.ensure_inside(&full, &self.root, rel)?;
        if self.is_pending(&full) {
            return Err(Error::not_found("file not found (pending)"));
        }
        Ok(full)
    }

    /// 解析待审核区内的路径
    pub fn resolve_pending(&self, rel: &str) -> Result<PathBuf> {
        let rel_path = normalize_rel(rel)?;
        let full = resolve_lenient(&self.pending.join(&rel_path))
            .map_err(|_| Error::not_found("pending file not found"))?;

        self.ensure_inside(&full, &self.pending, rel)?;
        Ok(full)
    }

    /// 解析批准后的目标位置，允许目录尚不存在
    ///
    /// 必须落在内容根目录内且不在待审核区，调用方据此再创建目录。
    pub fn resolve_destination(&self, rel: &Path) -> Result<PathBuf> {
        let full = resolve_lenient(&self.root.join(rel))?;
        if !full.starts_with(&self.root) || self.is_pending(&full) {
            warn!("Rejected destination {:?}: resolves to {:?}", rel, full);
            return Err(Error::bad_request("approve destination escapes the server root"));
        }
        Ok(full)
    }

    /// 绝对路径转为相对内容根目录的正斜杠路径
    pub fn rel_to_root(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.root).ok().map(to_slash)
    }

    /// 绝对路径转为相对待审核根目录的正斜杠路径
    pub fn rel_to_pending(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.pending).ok().map(to_slash)
    }

    fn ensure_inside(&self, full: &Path, boundary: &Path, rel: &str) -> Result<()> {
        if full.starts_with(boundary) {
            Ok(())
        } else {
            warn!("Rejected path {:?}: resolves outside {:?}", rel, boundary);
            Err(Error::bad_request("access denied: path outside root"))
        }
    }
}
