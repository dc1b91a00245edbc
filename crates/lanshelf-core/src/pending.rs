//! 待审核上传
//!
//! 上传的文件先放进待审核目录，管理员批准后移动到内容根目录的相同相对位置，
//! 拒绝则删除。生命周期只有 Staged -> Approved | Rejected。
//!
//! 同名冲突通过数字后缀 (`name_1.ext`, `name_2.ext`, ...) 解决，不加锁；
//! 并发重命名到同一个后缀是已知竞态。

use crate::catalog::{Category, guess_mime};
use crate::error::{Error, Result};
use crate::sandbox::Sandbox;
use log::{debug, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWriteExt};
use walkdir::WalkDir;

/// 清理上传文件名
///
/// 路径分隔符视为空白，连续空白合并为 `_`，只保留 ASCII 字母数字和 `_.-`，
/// 去掉首尾的 `.` 和 `_`。结果可能为空。
pub fn sanitize_filename(name: &str) -> String {
    let spaced: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();
    kept.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// 按冲突次数生成带数字后缀的文件名: `movie.mp4` -> `movie_2.mp4`
pub fn suffixed_name(name: &str, counter: u32) -> String {
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => {
            format!("{}_{}{}", &name[..i], counter, &name[i..])
        }
        _ => format!("{}_{}", name, counter),
    }
}

/// 在目录中以 create_new 方式创建不冲突的文件
async fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let mut candidate = dir.join(name);
    let mut counter = 1;
    loop {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = dir.join(suffixed_name(name, counter));
                counter += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// 为移动目标选择不冲突的路径
async fn unique_destination(dest: PathBuf) -> io::Result<PathBuf> {
    if !fs::try_exists(&dest).await? {
        return Ok(dest);
    }
    let (Some(parent), Some(name)) = (dest.parent(), dest.file_name()) else {
        return Ok(dest);
    };
    let name = name.to_string_lossy().into_owned();
    let mut counter = 1;
    loop {
        let candidate = parent.join(suffixed_name(&name, counter));
        if !fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        counter += 1;
    }
}

async fn is_regular_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// 已暂存的上传文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// 相对待审核根目录的路径
    pub pending_rel: String,
    /// 清理后的文件名
    pub display_name: String,
    /// 客户端提交的原始文件名
    pub submitted_name: String,
}

/// 待审核文件信息
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpload {
    pub rel_path: String,
    pub name: String,
    pub size: u64,
    pub modified: SystemTime,
    pub category: Category,
}

/// 待审核存储
#[derive(Debug, Clone)]
pub struct PendingStore {
    sandbox: Sandbox,
}

impl PendingStore {
    pub fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// 开始一次上传暂存
    ///
    /// 目标文件夹必须是内容根目录下已存在的目录，否则返回 400。
    pub async fn begin_stage(&self, target_rel: &str) -> Result<StagingBatch<'_>> {
        let target = self.sandbox.resolve_dir(target_rel).map_err(|e| {
            warn!("Rejected upload target {:?}: {}", target_rel, e);
            Error::bad_request(format!("invalid upload target: {}", e))
        })?;
        let rel = self.sandbox.rel_to_root(&target).unwrap_or_default();
        let dir = self.sandbox.pending_root().join(&rel);
        fs::create_dir_all(&dir).await?;

        Ok(StagingBatch {
            store: self,
            target_rel: rel,
            dir,
            saved: Vec::new(),
        })
    }

    /// 暂存一组文件，返回实际保存的文件
    pub async fn stage<I, R>(&self, target_rel: &str, files: I) -> Result<Vec<StagedFile>>
    where
        I: IntoIterator<Item = (String, R)>,
        R: AsyncRead + Unpin,
    {
        let mut batch = self.begin_stage(target_rel).await?;
        for (name, reader) in files {
            batch.save(&name, reader).await?;
        }
        Ok(batch.finish())
    }

    /// 批准：移动到内容根目录的相同相对位置
    ///
    /// 文件已不存在（被并发处理）时什么都不做，返回 `None`。
    pub async fn approve(&self, pending_rel: &str) -> Result<Option<PathBuf>> {
        let pending_path = self.sandbox.resolve_pending(pending_rel)?;
        if !is_regular_file(&pending_path).await {
            debug!("Approve skipped, {:?} no longer pending", pending_rel);
            return Ok(None);
        }

        let Ok(rel_inside) = pending_path.strip_prefix(self.sandbox.pending_root()) else {
            return Ok(None);
        };
        // 先检查目标位置，再创建任何目录
        let dest = self.sandbox.resolve_destination(rel_inside)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let dest = unique_destination(dest).await?;

        match fs::rename(&pending_path, &dest).await {
            Ok(()) => {
                info!("Approved upload {} -> {:?}", pending_rel, dest);
                Ok(Some(dest))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Approve raced, {:?} vanished", pending_rel);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 拒绝：删除待审核文件
    ///
    /// 不存在或不是普通文件时什么都不做，返回 `false`。
    pub async fn reject(&self, pending_rel: &str) -> Result<bool> {
        let pending_path = self.sandbox.resolve_pending(pending_rel)?;
        if !is_regular_file(&pending_path).await {
            return Ok(false);
        }
        match fs::remove_file(&pending_path).await {
            Ok(()) => {
                info!("Rejected upload {}", pending_rel);
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// 递归列出所有待审核文件，按修改时间从新到旧排列
    pub fn list_pending(&self) -> Vec<PendingUpload> {
        let root = self.sandbox.pending_root();
        if !root.is_dir() {
            return Vec::new();
        }

        let mut uploads: Vec<PendingUpload> = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let meta = e.metadata().ok()?;
                let rel_path = self.sandbox.rel_to_pending(e.path())?;
                Some(PendingUpload {
                    rel_path,
                    name: e.file_name().to_string_lossy().into_owned(),
                    size: meta.len(),
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    category: Category::from_mime(guess_mime(e.path())),
                })
            })
            .collect();

        uploads.sort_by(|a, b| b.modified.cmp(&a.modified));
        uploads
    }
}

/// 一次上传请求的暂存过程
pub struct StagingBatch<'a> {
    store: &'a PendingStore,
    /// 规范化后的目标文件夹，根目录为空串
    target_rel: String,
    dir: PathBuf,
    saved: Vec<StagedFile>,
}

impl StagingBatch<'_> {
    pub fn target_rel(&self) -> &str {
        &self.target_rel
    }

    /// 保存一个文件
    ///
    /// 清理后文件名为空时跳过并返回 `None`。写入失败（例如客户端中途断开）会删除半截文件。
    pub async fn save<R>(&mut self, filename: &str, mut reader: R) -> Result<Option<StagedFile>>
    where
        R: AsyncRead + Unpin,
    {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            debug!("Skipping upload with unusable name {:?}", filename);
            return Ok(None);
        }

        let (path, mut file) = create_unique(&self.dir, &name).await?;
        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => file.flush().await.map(|_| n),
            Err(e) => Err(e),
        };
        drop(file);
        if let Err(e) = written {
            warn!("Upload of {:?} interrupted: {}", filename, e);
            let _ = fs::remove_file(&path).await;
            return Err(e.into());
        }

        let Some(pending_rel) = self.store.sandbox.rel_to_pending(&path) else {
            return Err(Error::bad_request("staged file escaped the pending directory"));
        };
        let staged = StagedFile {
            pending_rel,
            display_name: name,
            submitted_name: filename.to_string(),
        };
        self.saved.push(staged.clone());
        Ok(Some(staged))
    }

    /// 已保存的文件数
    pub fn len(&self) -> usize {
        self.saved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.saved.is_empty()
    }

    /// 结束暂存，返回所有已保存的文件
    pub fn finish(self) -> Vec<StagedFile> {
        self.saved
    }
}
