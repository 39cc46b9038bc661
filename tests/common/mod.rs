//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use sand_http::{HttpConfig, HttpGrain, HttpGrainBuilder};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Config bound to an ephemeral loopback port.
pub fn local_config() -> HttpConfig {
    let mut config = HttpConfig::new(0);
    config.host = "127.0.0.1".to_string();
    config
}

/// Build, init and start a grain. Returns it with its bound address.
pub async fn start(builder: HttpGrainBuilder) -> (HttpGrain, SocketAddr) {
    let mut grain = builder.build();
    grain.init().expect("init failed");
    let addr = grain.start().await.expect("start failed");
    (grain, addr)
}

/// HTTP client that never reuses connections.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

/// Send one raw HTTP/1.1 request on `stream` and read its response.
#[allow(dead_code)]
pub async fn roundtrip(stream: &mut TcpStream, request: &str) -> String {
    stream.write_all(request.as_bytes()).await.unwrap();
    read_response(stream).await
}

/// Read one response head and its `content-length` delimited body.
#[allow(dead_code)]
pub async fn read_response(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut chunk))
            .await
            .expect("response timed out")
            .unwrap();
        assert!(n > 0, "connection closed before a full response");
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + length {
                return text.into_owned();
            }
        }
    }
}
