//! 集成测试 - 通过真实 HTTP 连接验证路由表
//!
//! 每个测试在临时目录上启动服务器（端口 0），用 reqwest 访问。

use axum::extract::connect_info::MockConnectInfo;
use lanshelf_core::{
    Decision, MediaServer, ModerationQueue, PendingStore, ServerConfig, ServerHandle,
    apply_decision, bridge,
};
use reqwest::{StatusCode, header, multipart, redirect};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use tempfile::TempDir;

struct TestServer {
    dir: TempDir,
    base: String,
    queue: ModerationQueue,
    store: PendingStore,
    handle: ServerHandle,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }
}

async fn start_server(password: &str, setup: impl FnOnce(&Path)) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    setup(dir.path());

    let config = ServerConfig {
        base_dir: dir.path().to_path_buf(),
        host: "127.0.0.1".to_string(),
        port: 0,
        password: password.to_string(),
        ..ServerConfig::default()
    };
    let (notifier, queue) = bridge(config.notify_capacity);
    let server = MediaServer::new(config, notifier).unwrap();
    let store = server.store();
    let handle = server.start().await.unwrap();
    let base = format!("http://{}", handle.local_addr());

    TestServer {
        dir,
        base,
        queue,
        store,
        handle,
    }
}

/// 不自动跟随跳转，便于检查 302
fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(redirect::Policy::none())
        .build()
        .unwrap()
}

fn file_part(name: &str, data: &[u8]) -> multipart::Part {
    multipart::Part::bytes(data.to_vec()).file_name(name.to_string())
}

/// 上传、通知、批准、浏览的完整流程
#[tokio::test]
async fn test_upload_then_approve_appears_in_listing() {
    let mut server = start_server("", |root| {
        fs::create_dir(root.join("movies")).unwrap();
    })
    .await;

    let form = multipart::Form::new()
        .part("files", file_part("one.mp4", b"first"))
        .part("files", file_part("two.mp4", b"second"));
    let resp = client()
        .post(server.url("/upload?p=movies"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/?p=movies");

    // 批准前文件不可见
    assert!(!server.root().join("movies/one.mp4").exists());
    let pending = server.store.list_pending();
    assert_eq!(pending.len(), 2);

    let notifications = server.queue.drain();
    assert_eq!(notifications.len(), 1);
    let n = &notifications[0];
    assert_eq!(n.target_folder, "movies");
    assert_eq!(n.file_count(), 2);
    assert!(n.client_addr.is_loopback());

    let outcome = apply_decision(&server.store, n, Decision::Approve).await;
    assert_eq!(outcome.approved.len(), 2);
    assert!(server.store.list_pending().is_empty());

    let page = client()
        .get(server.url("/?p=movies"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(page.contains("one.mp4"));
    assert!(page.contains("two.mp4"));
    assert_eq!(fs::read(server.root().join("movies/two.mp4")).unwrap(), b"second");

    server.handle.stop().await.unwrap();
}

/// 表单中的 `p` 字段作为目标，拒绝后文件被删除
#[tokio::test]
async fn test_upload_form_target_and_reject_route() {
    let mut server = start_server("", |root| {
        fs::create_dir(root.join("music")).unwrap();
    })
    .await;

    let form = multipart::Form::new()
        .text("p", "music")
        .part("files", file_part("../../evil name.mp3", b"x"));
    let resp = client()
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/?p=music");

    let n = server.queue.drain().pop().unwrap();
    assert_eq!(n.display_names, ["evil_name.mp3"]);
    assert_eq!(n.pending_paths, ["music/evil_name.mp3"]);

    // 管理员页面列出待审核文件
    let page = client().get(server.url("/")).send().await.unwrap().text().await.unwrap();
    assert!(page.contains("music/evil_name.mp3"));
    assert!(page.contains("/approve/music/evil_name.mp3"));

    let resp = client()
        .post(server.url("/reject/music/evil_name.mp3"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert!(server.store.list_pending().is_empty());
    assert!(!server.root().join("music/evil_name.mp3").exists());
}

/// 表单目标在通知中使用规范化后的形式
#[tokio::test]
async fn test_upload_notification_uses_normalized_target() {
    let mut server = start_server("", |root| {
        fs::create_dir(root.join("movies")).unwrap();
    })
    .await;

    let form = multipart::Form::new()
        .text("p", "./movies\\")
        .part("files", file_part("a.mp4", b"a"));
    let resp = client()
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/?p=movies");

    let n = server.queue.drain().pop().unwrap();
    assert_eq!(n.target_folder, "movies");
    assert_eq!(n.pending_paths, ["movies/a.mp4"]);

    // 根目录别名统一显示为 `/`
    let form = multipart::Form::new()
        .text("p", " ./ ")
        .part("files", file_part("b.mp4", b"b"));
    client()
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    let n = server.queue.drain().pop().unwrap();
    assert_eq!(n.target_folder, "/");
}

/// 非本机调用方不能审核或删除
#[tokio::test]
async fn test_moderation_routes_forbidden_for_remote_callers() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs/keep.txt"), b"keep").unwrap();

    let config = ServerConfig {
        base_dir: dir.path().to_path_buf(),
        ..ServerConfig::default()
    };
    let (notifier, _queue) = bridge(config.notify_capacity);
    let server = MediaServer::new(config, notifier).unwrap();
    let store = server.store();
    store
        .stage("", vec![("held.mp4".to_string(), &b"h"[..])])
        .await
        .unwrap();

    let remote = SocketAddr::from(([192, 168, 1, 50], 40000));
    let app = server.router().layer(MockConnectInfo(remote));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    for route in ["/approve/held.mp4", "/reject/held.mp4", "/delete/docs/keep.txt?p=docs"] {
        let resp = client()
            .post(format!("{}{}", base, route))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN, "route={}", route);
    }

    assert_eq!(store.list_pending().len(), 1);
    assert!(!dir.path().join("held.mp4").exists());
    assert_eq!(fs::read(dir.path().join("docs/keep.txt")).unwrap(), b"keep");

    // 远程访问者看不到待审核面板，但仍可浏览
    let page = client().get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(page.status(), StatusCode::OK);
    let page = page.text().await.unwrap();
    assert!(page.contains("docs"));
    assert!(!page.contains("/approve/held.mp4"));
}

#[tokio::test]
async fn test_approve_route_moves_file() {
    let server = start_server("", |_| {}).await;
    server
        .store
        .stage("", vec![("clip.mp4".to_string(), &b"abc"[..])])
        .await
        .unwrap();

    let resp = client()
        .post(server.url("/approve/clip.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/");
    assert!(server.root().join("clip.mp4").is_file());

    // 重复批准什么都不做
    let resp = client()
        .post(server.url("/approve/clip.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_upload_rejections() {
    let mut server = start_server("", |_| {}).await;

    // 目标不存在
    let form = multipart::Form::new().part("files", file_part("a.txt", b"a"));
    let resp = client()
        .post(server.url("/upload?p=missing"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // 目标越界
    let form = multipart::Form::new().part("files", file_part("a.txt", b"a"));
    let resp = client()
        .post(server.url("/upload?p=..%2F.."))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // 没有文件字段
    let form = multipart::Form::new().text("p", "");
    let resp = client()
        .post(server.url("/upload"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/");

    assert!(server.queue.drain().is_empty());
    assert!(server.store.list_pending().is_empty());
}

/// Range 请求：206、截断、416
#[tokio::test]
async fn test_stream_ranges() {
    let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    let payload = data.clone();
    let server = start_server("", move |root| {
        fs::write(root.join("clip.mp4"), &payload).unwrap();
    })
    .await;

    let resp = client().get(server.url("/stream/clip.mp4")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[header::ACCEPT_RANGES], "bytes");
    assert_eq!(resp.headers()[header::CONTENT_TYPE], "video/mp4");
    assert_eq!(resp.bytes().await.unwrap().len(), 1000);

    let resp = client()
        .get(server.url("/stream/clip.mp4"))
        .header(header::RANGE, "bytes=0-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 0-999/1000");
    assert_eq!(resp.headers()[header::CONTENT_LENGTH], "1000");

    let resp = client()
        .get(server.url("/stream/clip.mp4"))
        .header(header::RANGE, "bytes=100-199999")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes 100-999/1000");
    assert_eq!(&resp.bytes().await.unwrap()[..], &data[100..]);

    let resp = client()
        .get(server.url("/stream/clip.mp4"))
        .header(header::RANGE, "bytes=1000-")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(resp.headers()[header::CONTENT_RANGE], "bytes */1000");

    let resp = client()
        .get(server.url("/download/clip.mp4"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let disposition = resp.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.starts_with("attachment;"));
}

/// 越界路径和待审核区都不可访问
#[tokio::test]
async fn test_sandbox_boundaries() {
    let server = start_server("", |root| {
        fs::write(root.join("a.txt"), b"a").unwrap();
    })
    .await;
    server
        .store
        .stage("", vec![("secret.txt".to_string(), &b"s"[..])])
        .await
        .unwrap();

    // 文件路由上的越界路径一律 404
    for route in ["/stream/..%2Fetc%2Fpasswd", "/download/..%2Fa.txt", "/player/a%2F..%2F..%2Fx"] {
        let resp = client().get(server.url(route)).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND, "route={}", route);
    }

    let resp = client().get(server.url("/?p=..")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client()
        .get(server.url("/stream/_pending_uploads/secret.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client().get(server.url("/?p=_pending_uploads")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let resp = client().get(server.url("/?p=a.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let resp = client().get(server.url("/player/missing.mp4")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // 列表里不出现待审核目录
    let page = client().get(server.url("/")).send().await.unwrap().text().await.unwrap();
    assert!(page.contains("a.txt"));
    assert!(!page.contains("?p=_pending_uploads"));
}

#[tokio::test]
async fn test_password_protects_every_route() {
    let server = start_server("s3cret", |root| {
        fs::write(root.join("a.txt"), b"a").unwrap();
    })
    .await;

    let resp = client().get(server.url("/")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()[header::WWW_AUTHENTICATE],
        "Basic realm=\"Login Required\""
    );

    let resp = client().get(server.url("/stream/a.txt")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client()
        .get(server.url("/"))
        .basic_auth("user", Some("wrong"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = client()
        .get(server.url("/stream/a.txt"))
        .basic_auth("user", Some("s3cret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "a");
}

#[tokio::test]
async fn test_delete_redirects_even_when_missing() {
    let server = start_server("", |root| {
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs/old.txt"), b"old").unwrap();
    })
    .await;

    let resp = client()
        .post(server.url("/delete/docs/old.txt?p=docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
    assert_eq!(resp.headers()[header::LOCATION], "/?p=docs");
    assert!(!server.root().join("docs/old.txt").exists());

    let resp = client()
        .post(server.url("/delete/docs/old.txt?p=docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FOUND);
}
