//! HTML 页面
//!
//! 页面只负责展示，所有数据在路由处理函数里准备好。

use crate::catalog::{Category, FALLBACK_MIME, FileEntry, FolderEntry};
use crate::pending::PendingUpload;
use chrono::{DateTime, Local};
use humansize::{BINARY, format_size};
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::time::SystemTime;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; margin: 0 auto; max-width: 1100px; padding: 1rem; background: #f6f7f9; color: #222; }
header { display: flex; align-items: center; gap: .75rem; flex-wrap: wrap; }
.badge { font-size: .8rem; padding: .1rem .5rem; border-radius: 1rem; background: #e3e7ee; }
.crumbs a { text-decoration: none; }
table { width: 100%; border-collapse: collapse; background: #fff; margin: .75rem 0; }
th, td { text-align: left; padding: .35rem .5rem; border-bottom: 1px solid #eee; }
td.num { text-align: right; white-space: nowrap; }
form.inline { display: inline; }
section { margin-top: 1.25rem; }
.pending { border-left: 4px solid #e0a800; padding-left: .75rem; }
.muted { color: #777; font-size: .9rem; }
.player video, .player audio, .player img { max-width: 100%; max-height: 80vh; }
"#;

/// 浏览页数据
pub struct BrowsePage<'a> {
    pub host_name: &'a str,
    /// 当前目录（相对内容根目录，根目录为空串）
    pub current_rel: &'a str,
    pub folders: &'a [FolderEntry],
    pub files: &'a [FileEntry],
    pub search: &'a str,
    pub file_type: &'a str,
    pub sort: &'a str,
    pub order: &'a str,
    pub password_enabled: bool,
    pub is_admin: bool,
    pub pending: &'a [PendingUpload],
}

/// 面包屑中的一级
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crumb {
    pub name: String,
    pub rel_path: String,
}

/// 把相对路径拆成面包屑
pub fn breadcrumbs(rel: &str) -> Vec<Crumb> {
    let mut crumbs = Vec::new();
    let mut acc = String::new();
    for segment in rel.split('/').filter(|s| !s.is_empty()) {
        if !acc.is_empty() {
            acc.push('/');
        }
        acc.push_str(segment);
        crumbs.push(Crumb {
            name: segment.to_string(),
            rel_path: acc.clone(),
        });
    }
    crumbs
}

/// 逐段百分号编码，保留 `/`
pub fn encode_path(rel: &str) -> String {
    rel.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// 浏览指定目录的 URL
pub fn browse_url(rel: &str) -> String {
    if rel.is_empty() {
        "/".to_string()
    } else {
        format!("/?p={}", urlencoding::encode(rel))
    }
}

pub fn human_size(bytes: u64) -> String {
    format_size(bytes, BINARY)
}

pub fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time).format("%Y-%m-%d %H:%M").to_string()
}

fn icon(category: Category) -> &'static str {
    match category {
        Category::Video => "🎬",
        Category::Image => "🖼️",
        Category::Audio => "🎵",
        Category::Other => "📄",
    }
}

fn layout(title: &str, body: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(STYLE)) }
            }
            body { (body) }
        }
    }
}

/// 目录浏览页
pub fn browse(page: &BrowsePage) -> Markup {
    let total_size: u64 = page.files.iter().map(|f| f.size).sum();
    let item_count = page.folders.len() + page.files.len();

    let body = html! {
        header {
            h1 { "📁 " (page.host_name) }
            @if page.password_enabled {
                span.badge { "🔒 password" }
            }
            @if page.is_admin {
                span.badge { "admin" }
            }
        }

        nav.crumbs {
            a href="/" { "Home" }
            @for crumb in breadcrumbs(page.current_rel) {
                " / "
                a href=(browse_url(&crumb.rel_path)) { (crumb.name) }
            }
        }

        form method="get" action="/" {
            input type="hidden" name="p" value=(page.current_rel);
            input type="search" name="q" placeholder="Search files" value=(page.search);
            select name="type" {
                option value="all" selected[page.file_type == "all"] { "All" }
                option value="video" selected[page.file_type == "video"] { "Video" }
                option value="image" selected[page.file_type == "image"] { "Image" }
                option value="audio" selected[page.file_type == "audio"] { "Audio" }
                option value="other" selected[page.file_type == "other"] { "Other" }
            }
            select name="sort" {
                option value="name" selected[page.sort == "name"] { "Name" }
                option value="size" selected[page.sort == "size"] { "Size" }
                option value="mtime" selected[page.sort == "mtime"] { "Modified" }
            }
            select name="order" {
                option value="asc" selected[page.order != "desc"] { "Ascending" }
                option value="desc" selected[page.order == "desc"] { "Descending" }
            }
            button type="submit" { "Filter" }
        }

        p.muted { (item_count) " items · " (human_size(total_size)) }

        @if !page.folders.is_empty() {
            table {
                thead { tr { th { "Folder" } th { "Items" } } }
                tbody {
                    @for folder in page.folders {
                        tr {
                            td { a href=(browse_url(&folder.rel_path)) { "📁 " (folder.name) } }
                            td.num { (folder.child_count) }
                        }
                    }
                }
            }
        }

        table {
            thead {
                tr { th { "Name" } th { "Size" } th { "Modified" } th { "Type" } th {} }
            }
            tbody {
                @for file in page.files {
                    @let encoded = encode_path(&file.rel_path);
                    tr {
                        td {
                            @if file.category == Category::Other {
                                a href={ "/download/" (encoded) } { (icon(file.category)) " " (file.name) }
                            } @else {
                                a href={ "/player/" (encoded) } { (icon(file.category)) " " (file.name) }
                            }
                        }
                        td.num { (human_size(file.size)) }
                        td { (format_time(file.modified)) }
                        td { (file.ext) " " span.muted { (file.mime) } }
                        td {
                            a href={ "/stream/" (encoded) } { "Open" }
                            " · "
                            a href={ "/download/" (encoded) } { "Download" }
                            @if page.is_admin {
                                " · "
                                form.inline method="post"
                                    action={ "/delete/" (encoded) "?p=" (urlencoding::encode(page.current_rel)) } {
                                    button type="submit" { "Delete" }
                                }
                            }
                        }
                    }
                }
                @if page.files.is_empty() {
                    tr { td.muted colspan="5" { "No files" } }
                }
            }
        }

        section {
            h2 { "Upload" }
            form method="post" action="/upload" enctype="multipart/form-data" {
                input type="hidden" name="p" value=(page.current_rel);
                input type="file" name="files" multiple;
                button type="submit" { "Upload" }
            }
            p.muted { "Uploads appear here after the host approves them." }
        }

        @if page.is_admin {
            section.pending {
                h2 { "Pending uploads (" (page.pending.len()) ")" }
                @if page.pending.is_empty() {
                    p.muted { "Nothing waiting for review." }
                } @else {
                    table {
                        thead {
                            tr { th { "File" } th { "Size" } th { "Uploaded" } th {} }
                        }
                        tbody {
                            @for upload in page.pending {
                                @let encoded = encode_path(&upload.rel_path);
                                tr {
                                    td { (icon(upload.category)) " " (upload.rel_path) }
                                    td.num { (human_size(upload.size)) }
                                    td { (format_time(upload.modified)) }
                                    td {
                                        form.inline method="post" action={ "/approve/" (encoded) } {
                                            button type="submit" { "Approve" }
                                        }
                                        " "
                                        form.inline method="post" action={ "/reject/" (encoded) } {
                                            button type="submit" { "Reject" }
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    };

    let title = if page.current_rel.is_empty() {
        page.host_name.to_string()
    } else {
        format!("{} · {}", page.current_rel, page.host_name)
    };
    layout(&title, body)
}

/// 播放页
///
/// 未知类型按 `video/mp4` 处理。
pub fn player(name: &str, rel_path: &str, mime: &str) -> Markup {
    let mime = if mime == FALLBACK_MIME { "video/mp4" } else { mime };
    let src = format!("/stream/{}", encode_path(rel_path));
    let parent = rel_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let body = html! {
        nav.crumbs {
            a href=(browse_url(parent)) { "← Back" }
        }
        h1 { (name) }
        div.player {
            @match Category::from_mime(mime) {
                Category::Image => {
                    img src=(src) alt=(name);
                }
                Category::Audio => {
                    audio controls autoplay {
                        source src=(src) type=(mime);
                    }
                }
                _ => {
                    video controls autoplay preload="metadata" {
                        source src=(src) type=(mime);
                    }
                }
            }
        }
        p {
            a href={ "/download/" (encode_path(rel_path)) } { "Download" }
        }
    };
    layout(name, body)
}
