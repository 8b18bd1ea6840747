//! Shared helpers for unit tests

use std::future::Future;
use std::path::Path;

use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::core::Settings;

/// Serve exactly one connection with a hand-written HTTP response
///
/// The request head is consumed before `handler` runs, so closing the socket
/// early never resets the connection with unread data.
pub async fn serve_once<F, Fut>(handler: F) -> String
where
    F: FnOnce(TcpStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        handler(socket).await;
    });
    format!("http://{}/Skakavi-Krompir-Linux", addr)
}

/// Client that ignores proxy environment variables
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Default settings rooted at `dir`
pub fn test_settings(dir: &Path) -> Settings {
    Settings {
        data_directory: Some(dir.to_path_buf()),
        ..Settings::default()
    }
}
