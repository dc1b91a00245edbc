//! 目录浏览
//!
//! 列出沙箱内目录的子文件夹和文件，按内容类型区分媒体种类，
//! 并提供可组合的过滤/排序步骤。

use crate::sandbox::Sandbox;
use log::debug;
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::SystemTime;

/// 无法识别类型时使用的 MIME
pub const FALLBACK_MIME: &str = "application/octet-stream";

/// 媒体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Video,
    Image,
    Audio,
    Other,
}

impl Category {
    /// 根据 MIME 前缀判断种类
    pub fn from_mime(mime: &str) -> Self {
        if mime.starts_with("video") {
            Category::Video
        } else if mime.starts_with("image") {
            Category::Image
        } else if mime.starts_with("audio") {
            Category::Audio
        } else {
            Category::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Video => "video",
            Category::Image => "image",
            Category::Audio => "audio",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(Category::Video),
            "image" => Ok(Category::Image),
            "audio" => Ok(Category::Audio),
            "other" => Ok(Category::Other),
            _ => Err(()),
        }
    }
}

/// 猜测文件的 MIME 类型
pub fn guess_mime(path: &Path) -> &'static str {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_MIME)
}

/// 文件夹条目
#[derive(Debug, Clone, PartialEq)]
pub struct FolderEntry {
    pub name: String,
    /// 相对内容根目录的正斜杠路径
    pub rel_path: String,
    /// 直接子项数量（无权限时为 0）
    pub child_count: usize,
}

/// 文件条目
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub name: String,
    pub rel_path: String,
    pub size: u64,
    pub modified: SystemTime,
    pub mime: &'static str,
    /// 小写扩展名，不含点
    pub ext: String,
    pub category: Category,
}

impl FileEntry {
    fn from_path(path: &Path, name: String, rel_path: String) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        let mime = guess_mime(path);
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Some(Self {
            name,
            rel_path,
            size: meta.len(),
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            mime,
            ext,
            category: Category::from_mime(mime),
        })
    }
}

/// 目录列表
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
}

fn count_children(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// 列出目录内容
///
/// `dir` 必须是已通过沙箱校验的目录。名称不区分大小写升序排列，
/// 待审核目录不会出现在结果中；无权限时返回部分或空列表。
pub fn list_dir(sandbox: &Sandbox, dir: &Path) -> Listing {
    let mut listing = Listing::default();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read directory {:?}: {}", dir, e);
            return listing;
        }
    };

    let mut paths: Vec<_> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    paths.sort_by_cached_key(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    });

    let pending_name = sandbox.pending_dir_name();
    for path in paths {
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(rel_path) = sandbox.rel_to_root(&path) else {
            continue;
        };

        if path.is_dir() {
            if name == pending_name {
                continue;
            }
            listing.folders.push(FolderEntry {
                child_count: count_children(&path),
                name,
                rel_path,
            });
        } else if let Some(file) = FileEntry::from_path(&path, name, rel_path) {
            listing.files.push(file);
        }
    }

    listing
}

/// 排序字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Name,
    Size,
    Modified,
}

impl SortKey {
    /// 未知值回退为按名称
    pub fn parse(s: &str) -> Self {
        match s {
            "size" => SortKey::Size,
            "mtime" => SortKey::Modified,
            _ => SortKey::Name,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Name => "name",
            SortKey::Size => "size",
            SortKey::Modified => "mtime",
        }
    }
}

/// 过滤和排序条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileQuery {
    /// 名称子串（不区分大小写），空表示不过滤
    pub search: String,
    /// `None` 表示全部种类
    pub category: Option<Category>,
    pub sort: SortKey,
    pub descending: bool,
}

impl FileQuery {
    /// 从浏览页查询参数构造 (`q`, `type`, `sort`, `order`)
    pub fn from_params(q: &str, file_type: &str, sort: &str, order: &str) -> Self {
        Self {
            search: q.trim().to_string(),
            category: file_type.parse().ok(),
            sort: SortKey::parse(sort),
            descending: order == "desc",
        }
    }

    /// 过滤后稳定排序，相等元素保持原有相对顺序
    pub fn apply(&self, files: Vec<FileEntry>) -> Vec<FileEntry> {
        let needle = self.search.to_lowercase();
        let mut files: Vec<FileEntry> = files
            .into_iter()
            .filter(|f| needle.is_empty() || f.name.to_lowercase().contains(&needle))
            .filter(|f| self.category.is_none_or(|c| f.category == c))
            .collect();

        let compare = |a: &FileEntry, b: &FileEntry| -> Ordering {
            match self.sort {
                SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
                SortKey::Size => a.size.cmp(&b.size),
                SortKey::Modified => a.modified.cmp(&b.modified),
            }
        };

        if self.descending {
            files.sort_by(|a, b| compare(b, a));
        } else {
            files.sort_by(compare);
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn entry(name: &str, size: u64, secs: u64) -> FileEntry {
        let mime = guess_mime(Path::new(name));
        FileEntry {
            name: name.to_string(),
            rel_path: name.to_string(),
            size,
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
            mime,
            ext: String::new(),
            category: Category::from_mime(mime),
        }
    }

    #[test]
    fn test_category_from_mime() {
        assert_eq!(Category::from_mime("video/mp4"), Category::Video);
        assert_eq!(Category::from_mime("image/png"), Category::Image);
        assert_eq!(Category::from_mime("audio/mpeg"), Category::Audio);
        assert_eq!(Category::from_mime("text/plain"), Category::Other);
        assert_eq!(Category::from_mime(FALLBACK_MIME), Category::Other);
        assert_eq!(guess_mime(Path::new("noext")), FALLBACK_MIME);
    }

    #[test]
    fn test_list_dir_sorted_and_hides_pending() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("_pending_uploads")).unwrap();
        fs::create_dir(dir.path().join("Zeta")).unwrap();
        fs::create_dir(dir.path().join("alpha")).unwrap();
        fs::write(dir.path().join("alpha/one.txt"), b"1").unwrap();
        fs::write(dir.path().join("alpha/two.txt"), b"2").unwrap();
        fs::write(dir.path().join("b.MP4"), b"video").unwrap();
        fs::write(dir.path().join("A.png"), b"img").unwrap();

        let sandbox = Sandbox::new(dir.path(), "_pending_uploads").unwrap();
        let listing = list_dir(&sandbox, sandbox.root());

        let folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, ["alpha", "Zeta"]);
        assert_eq!(listing.folders[0].child_count, 2);
        assert_eq!(listing.folders[0].rel_path, "alpha");

        let files: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(files, ["A.png", "b.MP4"]);
        assert_eq!(listing.files[1].category, Category::Video);
        assert_eq!(listing.files[1].ext, "mp4");
        assert_eq!(listing.files[1].size, 5);
    }

    #[test]
    fn test_list_subdir_rel_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("movies/old")).unwrap();
        fs::write(dir.path().join("movies/a.mkv"), b"a").unwrap();

        let sandbox = Sandbox::new(dir.path(), "_pending_uploads").unwrap();
        let movies = sandbox.resolve_dir("movies").unwrap();
        let listing = list_dir(&sandbox, &movies);

        assert_eq!(listing.folders[0].rel_path, "movies/old");
        assert_eq!(listing.files[0].rel_path, "movies/a.mkv");
    }

    #[test]
    fn test_unreadable_dir_yields_empty_listing() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Sandbox::new(dir.path(), "_pending_uploads").unwrap();
        let listing = list_dir(&sandbox, &dir.path().join("vanished"));
        assert_eq!(listing, Listing::default());
    }

    #[test]
    fn test_filter_by_name_and_category() {
        let files = vec![
            entry("Holiday.mp4", 10, 1),
            entry("holiday.jpg", 5, 2),
            entry("notes.txt", 1, 3),
        ];
        let query = FileQuery::from_params("HOLI", "all", "name", "asc");
        let names: Vec<_> = query.apply(files.clone()).into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["Holiday.mp4", "holiday.jpg"]);

        let query = FileQuery::from_params("holi", "image", "name", "asc");
        let names: Vec<_> = query.apply(files).into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["holiday.jpg"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let files = vec![
            entry("c.txt", 7, 1),
            entry("a.txt", 3, 1),
            entry("b.txt", 7, 2),
        ];

        let query = FileQuery::from_params("", "all", "size", "desc");
        let names: Vec<_> = query.apply(files.clone()).into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["c.txt", "b.txt", "a.txt"]);

        let query = FileQuery::from_params("", "all", "mtime", "asc");
        let names: Vec<_> = query.apply(files).into_iter().map(|f| f.name).collect();
        assert_eq!(names, ["c.txt", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_filter_sort_idempotent() {
        let files = vec![
            entry("beta.mp3", 9, 4),
            entry("Alpha.mp3", 9, 2),
            entry("gamma.mp4", 1, 3),
            entry("delta.mp3", 2, 1),
        ];
        for (sort, order) in [("name", "asc"), ("size", "desc"), ("mtime", "desc")] {
            let query = FileQuery::from_params("a", "audio", sort, order);
            let once = query.apply(files.clone());
            let twice = query.apply(once.clone());
            assert_eq!(once, twice, "sort={} order={}", sort, order);
        }
    }

    #[test]
    fn test_unknown_params_fall_back() {
        let query = FileQuery::from_params("", "movies", "weird", "sideways");
        assert_eq!(query, FileQuery::default());
    }
}
