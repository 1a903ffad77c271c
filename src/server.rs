// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 异步服务器
//!
//! 位于 `Website` 之前的 Tokio 监听循环。每个连接一个任务；处理函数和静态阶段做的是同步文件 I/O，
//! 所以分发放在阻塞线程池上执行。每个连接只处理一个请求。

use log::{debug, error, info, warn};
use std::{sync::Arc, time::Instant};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    runtime::Builder,
};

use crate::{
    config::Config,
    exception::Exception,
    param::*,
    request::Request,
    response::Response,
    website::Website,
};

/// Largest request head we are willing to buffer.
const MAX_HEAD_SIZE: usize = 64 * 1024;
/// Largest request body we are willing to buffer.
const MAX_BODY_SIZE: usize = 1 << 20;

/// Builds the runtime, binds the configured address and serves until the
/// process gets SIGQUIT or Ctrl-C.
pub fn run(website: Arc<Website>, config: &Config) -> Result<(), Exception> {
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()?;
    let address = config.bind_address();
    runtime.block_on(async move {
        let listener = TcpListener::bind(address).await?;
        info!("服务端将在{}上监听Socket连接", address);
        tokio::spawn(exit_on_quit());
        serve(listener, website).await
    })
}

/// Accepts connections on `listener` forever.
pub async fn serve(listener: TcpListener, website: Arc<Website>) -> Result<(), Exception> {
    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("接受连接失败: {}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立: {}", id, addr);
        let website = Arc::clone(&website);
        tokio::spawn(async move {
            handle_connection(&mut stream, id, website).await;
        });
        id += 1;
    }
}

async fn exit_on_quit() {
    wait_for_quit().await;
    warn!("Received quit signal, exiting immediately");
    std::process::exit(0);
}

#[cfg(unix)]
async fn wait_for_quit() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::quit()) {
        Ok(mut quit) => {
            tokio::select! {
                _ = quit.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            error!("Can't listen for SIGQUIT: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_quit() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn handle_connection(stream: &mut TcpStream, id: u128, website: Arc<Website>) {
    let buffer = match read_request(stream, id).await {
        Some(buffer) => buffer,
        None => return,
    };
    let start_time = Instant::now();

    let request = match Request::try_from(&buffer, id) {
        Ok(request) => request,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let code = match e {
                Exception::UnsupportedHttpVersion => 505,
                Exception::UnSupportedRequestMethod => 501,
                _ => 400,
            };
            let response = Response::from_status_code(code, DEFAULT_CHARSET);
            write_response(stream, id, response).await;
            return;
        }
    };

    let (request, mut response) = if request.method() == HttpRequestMethod::Options {
        (request, options_response())
    } else {
        let dispatched = tokio::task::spawn_blocking(move || {
            let mut request = request;
            let response = website.serve(&mut request);
            (request, response)
        })
        .await;
        match dispatched {
            Ok(pair) => pair,
            Err(e) => {
                error!("[ID{}]处理请求时发生未知异常: {}", id, e);
                let response = Response::from_status_code(500, DEFAULT_CHARSET);
                write_response(stream, id, response).await;
                return;
            }
        }
    };
    response.set_header("Connection", "close");
    let response = response.finalize(&request);

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}, ",
        id,
        request.version(),
        request.path(),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );
    write_response(stream, id, response).await;
}

/// Reads up to the end of the head plus `Content-Length` body bytes.
async fn read_request(stream: &mut TcpStream, id: u128) -> Option<Vec<u8>> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        match stream.read(&mut chunk).await {
            Ok(0) => {
                debug!("[ID{}]客户端关闭了连接", id);
                return None;
            }
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
                return None;
            }
        }
        if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        if buffer.len() > MAX_HEAD_SIZE {
            warn!("[ID{}]请求头过大", id);
            return None;
        }
    };

    let content_length = content_length(&buffer[..head_end]).min(MAX_BODY_SIZE);
    while buffer.len() < head_end + content_length {
        match stream.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&chunk[..n]),
            Err(e) => {
                error!("[ID{}]读取请求体时遇到错误: {}", id, e);
                return None;
            }
        }
    }
    debug!("[ID{}]HTTP请求接收完毕", id);
    Some(buffer)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn options_response() -> Response {
    let allowed: Vec<String> = ALLOWED_METHODS.iter().map(|m| m.to_string()).collect();
    let mut response = Response::new();
    response.set_code(204);
    response.set_header("Allow", &allowed.join(", "));
    response
}

async fn write_response(stream: &mut TcpStream, id: u128, response: Response) {
    if let Err(e) = stream.write_all(&response.as_bytes()).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    if let Err(e) = stream.shutdown().await {
        debug!("[ID{}]关闭连接失败: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_length() {
        assert_eq!(content_length(b"POST / HTTP/1.1\r\ncontent-length: 12\r\n\r\n"), 12);
        assert_eq!(content_length(b"GET / HTTP/1.1\r\n\r\n"), 0);
        assert_eq!(content_length(b"GET / HTTP/1.1\r\nContent-Length: x\r\n\r\n"), 0);
    }

    #[test]
    fn test_options_lists_methods() {
        let response = options_response();
        assert_eq!(response.status_code(), 204);
        assert_eq!(response.header("Allow"), Some("GET, HEAD, OPTIONS, POST"));
    }
}
