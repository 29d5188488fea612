//! 行分隔 JSON 请求服务
//!
//! 每行一个请求（`{"method": "park"}`），每行一个应答（`SimpleResponse`）。
//! 每个连接一个线程；运动本身由 Arm Control 串行化。
//! 关闭标志置位后，accept 循环和连接线程在下一个轮询周期内退出。

use crate::service::{MovementsService, Request, SimpleResponse};
use anyhow::{Context, Result};
use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// accept / 读取的轮询周期
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RequestServer {
    listener: TcpListener,
    service: Arc<MovementsService>,
    running: Arc<AtomicBool>,
}

impl RequestServer {
    pub fn bind(address: &str, service: Arc<MovementsService>) -> Result<Self> {
        let listener =
            TcpListener::bind(address).with_context(|| format!("failed to bind {}", address))?;
        listener
            .set_nonblocking(true)
            .context("failed to make listener non-blocking")?;
        Ok(Self {
            listener,
            service,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// 关闭标志（置为 false 即停止服务）
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// 阻塞运行，直到关闭标志被清除
    pub fn run(&self) -> Result<()> {
        info!("Serving requests on {}", self.local_addr()?);
        let mut workers: Vec<JoinHandle<()>> = Vec::new();

        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("Client connected: {}", peer);
                    let service = self.service.clone();
                    let running = self.running.clone();
                    let worker = thread::Builder::new()
                        .name(format!("cafebot-conn-{}", peer))
                        .spawn(move || {
                            if let Err(e) = serve_connection(stream, &service, &running) {
                                warn!("Connection {} closed with error: {}", peer, e);
                            } else {
                                info!("Client disconnected: {}", peer);
                            }
                        })
                        .context("failed to spawn connection thread")?;
                    workers.push(worker);
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(POLL_INTERVAL);
                },
                Err(e) => {
                    error!("Accept failed: {}", e);
                    thread::sleep(POLL_INTERVAL);
                },
            }
            workers.retain(|worker| !worker.is_finished());
        }

        info!("Request server stopping");
        for worker in workers {
            let name = worker.thread().name().unwrap_or("connection").to_string();
            if worker.join().is_err() {
                error!("Connection thread {} panicked", name);
            }
        }
        Ok(())
    }
}

/// 解析一行请求并执行
pub fn handle_line(service: &MovementsService, line: &str) -> SimpleResponse {
    match serde_json::from_str::<Request>(line) {
        Ok(request) => service.dispatch(&request),
        Err(e) => {
            warn!("Malformed request {:?}: {}", line, e);
            SimpleResponse::failed(format!("malformed request: {}", e))
        },
    }
}

fn serve_connection(
    stream: TcpStream,
    service: &MovementsService,
    running: &AtomicBool,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();

    while running.load(Ordering::Acquire) {
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => return Ok(()),
            Ok(_) => {
                // 超时前读到的部分行保留在 buf 中
                if buf.last() != Some(&b'\n') {
                    continue;
                }
                let line = String::from_utf8_lossy(&buf).trim().to_string();
                buf.clear();
                if line.is_empty() {
                    continue;
                }
                debug!("Request: {}", line);
                let response = handle_line(service, &line);
                let mut text = serde_json::to_string(&response)?;
                text.push('\n');
                writer.write_all(text.as_bytes())?;
                writer.flush()?;
            },
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {},
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::sim_arm;
    use cafebot_driver::{DriverCall, SimArm};

    fn start(sim: Arc<SimArm>) -> (SocketAddr, Arc<AtomicBool>, JoinHandle<()>) {
        let service = Arc::new(MovementsService::new(sim_arm(sim)));
        let server = RequestServer::bind("127.0.0.1:0", service).unwrap();
        let addr = server.local_addr().unwrap();
        let running = server.running_flag();
        let handle = thread::spawn(move || server.run().unwrap());
        (addr, running, handle)
    }

    fn call(stream: &mut TcpStream, reader: &mut BufReader<TcpStream>, line: &str) -> SimpleResponse {
        stream.write_all(line.as_bytes()).unwrap();
        stream.write_all(b"\n").unwrap();
        let mut reply = String::new();
        reader.read_line(&mut reply).unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    /// 测试一条连接上依次处理多条请求
    #[test]
    fn test_park_over_tcp() {
        let sim = Arc::new(SimArm::new());
        let (addr, running, handle) = start(sim.clone());

        let mut stream = TcpStream::connect(addr).unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());

        assert_eq!(
            call(&mut stream, &mut reader, r#"{"method": "park"}"#),
            SimpleResponse::ok()
        );
        assert_eq!(sim.count_calls(|c| matches!(c, DriverCall::SetPosition { .. })), 1);

        let response = call(&mut stream, &mut reader, "not json");
        assert!(!response.success);
        assert!(response.message.starts_with("malformed request"));

        let response = call(&mut stream, &mut reader, r#"{"method": "fly"}"#);
        assert_eq!(response.message, "unknown method 'fly'");

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_with_idle_client() {
        let (addr, running, handle) = start(Arc::new(SimArm::new()));
        let _idle = TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(150));

        running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn test_handle_line() {
        let sim = Arc::new(SimArm::new());
        let service = MovementsService::new(sim_arm(sim.clone()));
        assert!(handle_line(&service, r#"{"method": "enable"}"#).success);
        assert!(!handle_line(&service, r#"{"cmd": "park"}"#).success);
    }
}
