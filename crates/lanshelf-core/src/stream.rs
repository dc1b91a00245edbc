//! 文件流式传输
//!
//! 支持单段 HTTP Range 请求，用于媒体播放时拖动进度条。
//! 文件按固定大小分块读取，客户端断开时响应体被丢弃，文件句柄随之关闭。

use crate::catalog::guess_mime;
use crate::error::{Error, Result};
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use log::debug;
use regex::Regex;
use std::io::{self, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

/// 每次读取的块大小 (1 MiB)
pub const CHUNK_SIZE: usize = 1024 * 1024;

static RANGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^bytes=(\d+)-(\d*)$").expect("valid range regex"));

/// 闭区间字节范围
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// 字节数
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `Content-Range` 头的值
    pub fn content_range(&self, total: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, total)
    }
}

/// 解析 `Range` 头
///
/// 只支持 `bytes=<start>-[<end>]`；多段或格式错误、起点越界、终点小于起点都返回 416。
/// 省略终点表示到文件末尾，终点超出文件时截断到最后一个字节。
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange> {
    let unsatisfiable = Error::RangeNotSatisfiable { size };

    let Some(caps) = RANGE_RE.captures(header.trim()) else {
        return Err(unsatisfiable);
    };
    let Ok(start) = caps[1].parse::<u64>() else {
        return Err(unsatisfiable);
    };
    if start >= size {
        return Err(unsatisfiable);
    }

    let last = size - 1;
    let end = match &caps[2] {
        "" => last,
        // 超出 u64 的终点同样截断
        digits => digits.parse::<u64>().unwrap_or(u64::MAX).min(last),
    };
    if end < start {
        return Err(unsatisfiable);
    }

    Ok(ByteRange { start, end })
}

/// 文件分块流
pub type ChunkStream = ReaderStream<Take<File>>;

/// 打开从 `start` 开始、最多 `len` 字节的分块流
///
/// 流只能消费一次；丢弃即释放文件句柄。
pub async fn open_chunks(path: &Path, start: u64, len: u64) -> io::Result<ChunkStream> {
    let mut file = File::open(path).await?;
    if start > 0 {
        file.seek(SeekFrom::Start(start)).await?;
    }
    Ok(ReaderStream::with_capacity(file.take(len), CHUNK_SIZE))
}

/// 下载时的 `Content-Disposition`
pub fn attachment_disposition(name: &str) -> String {
    let fallback: String = name
        .chars()
        .map(|c| {
            if c.is_ascii() && c != '"' && c != '\\' && !c.is_ascii_control() {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

/// 构造文件响应
///
/// 没有 `Range` 头时返回 200 和完整文件，否则返回 206 和请求的片段。
/// `attachment` 为真时附加下载头。
pub async fn serve_file(path: &Path, range: Option<&str>, attachment: bool) -> Result<Response> {
    let meta = tokio::fs::metadata(path).await?;
    if !meta.is_file() {
        return Err(Error::not_found("file not found"));
    }
    let size = meta.len();

    let span = range.map(|h| parse_range(h, size)).transpose()?;
    let (status, start, len) = match span {
        Some(r) => {
            debug!("Range {}-{}/{} for {:?}", r.start, r.end, size, path);
            (StatusCode::PARTIAL_CONTENT, r.start, r.len())
        }
        None => (StatusCode::OK, 0, size),
    };

    let chunks = open_chunks(path, start, len).await?;

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, guess_mime(path))
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, len);
    if let Some(r) = span {
        builder = builder.header(header::CONTENT_RANGE, r.content_range(size));
    }
    if attachment {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        builder = builder.header(header::CONTENT_DISPOSITION, attachment_disposition(&name));
    }

    builder
        .body(Body::from_stream(chunks))
        .map_err(|e| Error::Io(io::Error::other(e)))
}
