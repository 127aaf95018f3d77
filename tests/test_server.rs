//! End-to-end tests against a live server on an ephemeral port

mod common;

use std::io::{Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use common::{content_root, write_file};
use lantern::cache::FileCache;
use lantern::config::ServerConfig;
use lantern::server::{Server, ServerHandle};

fn start(root: &std::path::Path) -> ServerHandle {
    let cache = FileCache::new(root, true);
    cache.rebuild().unwrap();
    let cfg = ServerConfig {
        bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        backlog: 16,
    };
    Server::bind(&cfg, Arc::new(cache)).unwrap().start().unwrap()
}

fn exchange(addr: SocketAddr, request: &str) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream.write_all(request.as_bytes()).unwrap();

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();
    String::from_utf8(reply).unwrap()
}

#[test]
fn test_serves_cached_file() {
    let root = content_root(&[("index.html", "hi")]);
    let server = start(root.path());

    let reply = exchange(
        server.local_addr(),
        "GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n",
    );

    assert!(reply.starts_with("HTTP/1.1 200 OK\r\n"), "{}", reply);
    assert!(reply.contains("Content-Type: text/html; charset=UTF-8\r\n"));
    assert!(reply.contains("Content-Length: 2\r\n"));
    assert!(reply.contains("Connection: close\r\n"));
    assert!(reply.ends_with("\r\n\r\nhi"));
}

#[test]
fn test_serves_many_connections() {
    let root = content_root(&[("a.txt", "alpha"), ("b.js", "beta")]);
    let server = start(root.path());

    for _ in 0..20 {
        let a = exchange(server.local_addr(), "GET /a.txt HTTP/1.1\r\nHost: h\r\n\r\n");
        let b = exchange(server.local_addr(), "GET /b.js HTTP/1.1\r\nHost: h\r\n\r\n");
        assert!(a.ends_with("alpha"));
        assert!(b.ends_with("beta"));
    }
}

#[test]
fn test_error_replies() {
    let root = content_root(&[("index.html", "hi")]);
    let server = start(root.path());

    let missing = exchange(server.local_addr(), "GET /nope HTTP/1.1\r\nHost: h\r\n\r\n");
    let bad = exchange(server.local_addr(), "GET /index.html HTTP/1.1\r\n\r\n");
    let post = exchange(server.local_addr(), "POST /index.html HTTP/1.1\r\nHost: h\r\n\r\n");

    assert!(missing.starts_with("HTTP/1.1 404 Not Found\r\n"), "{}", missing);
    assert!(bad.starts_with("HTTP/1.1 400 Bad Request\r\n"), "{}", bad);
    assert!(post.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"), "{}", post);
}

#[test]
fn test_conditional_request() {
    let root = content_root(&[("index.html", "hi")]);
    let server = start(root.path());

    let full = exchange(server.local_addr(), "GET /index.html HTTP/1.1\r\nHost: h\r\n\r\n");
    let etag = full
        .lines()
        .find_map(|line| line.strip_prefix("ETag: "))
        .unwrap()
        .to_string();

    let cached = exchange(
        server.local_addr(),
        &format!("GET /index.html HTTP/1.1\r\nHost: h\r\nIf-None-Match: {}\r\n\r\n", etag),
    );

    assert!(cached.starts_with("HTTP/1.1 304 Not Modified\r\n"), "{}", cached);
    assert!(cached.ends_with("\r\n\r\n"));
}

#[test]
fn test_serves_large_file() {
    let root = content_root(&[]);
    let contents: Vec<u8> = (0..8 * 1024 * 1024u32).map(|i| (i % 251) as u8).collect();
    write_file(root.path(), "big.bin", &contents);
    let server = start(root.path());

    let mut stream = TcpStream::connect(server.local_addr()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(30)))
        .unwrap();
    stream
        .write_all(b"GET /big.bin HTTP/1.1\r\nHost: h\r\n\r\n")
        .unwrap();
    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).unwrap();

    let split = reply
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .unwrap();
    let head = String::from_utf8_lossy(&reply[..split]);
    assert!(head.starts_with("HTTP/1.1 200 OK"), "{}", head);
    assert!(head.contains(&format!("Content-Length: {}", contents.len())));
    assert_eq!(reply.len() - split - 4, contents.len());
    assert!(reply[split + 4..] == contents[..]);
}
