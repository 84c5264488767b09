use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use config::PressureConfig;
use rk_adapter::{AdapterFactoryManager, AdapterFactoryRef, HttpAdapterFactory, HttpProxyServer};
use rk_proxy::{PressureMonitor, ProxyServer, Server, StaticResolver, TunnelContext, TunnelPool};
use rk_rule::{IpRange, Rule, RuleManager};
use rk_stat::{FixedMemoryProbe, StatEvent};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    server: Arc<ProxyServer>,
    addr: SocketAddr,
    ctx: Arc<TunnelContext>,
    probe: Arc<FixedMemoryProbe>,
    _stats: mpsc::UnboundedReceiver<StatEvent>,
}

async fn start_proxy(append_direct: bool) -> Harness {
    let registry = AdapterFactoryManager::default();
    let rules = RuleManager::new(Vec::new(), registry.direct(), append_direct);
    start_proxy_with(rules, StaticResolver::new()).await
}

async fn start_proxy_with(rules: RuleManager<AdapterFactoryRef>, resolver: StaticResolver) -> Harness {
    let (stat_tx, stat_rx) = mpsc::unbounded_channel();
    let probe = Arc::new(FixedMemoryProbe::new(0));
    let pressure = PressureMonitor::new(
        probe.clone(),
        PressureConfig {
            threshold_bytes: 1024,
            idle_cutoff_ms: 10,
            ..Default::default()
        },
    );
    let pool = TunnelPool::spawn(pressure.config().idle_cutoff(), stat_tx.clone());
    let ctx = Arc::new(TunnelContext::new(
        Arc::new(rules),
        Arc::new(resolver),
        pressure,
        pool,
        stat_tx,
    ));
    let server = Arc::new(
        ProxyServer::bind("127.0.0.1:0".parse().unwrap(), ctx.clone())
            .await
            .unwrap(),
    );
    let addr = server.local_addr().unwrap();
    let running = server.clone();
    tokio::spawn(async move { running.start().await });
    Harness {
        server,
        addr,
        ctx,
        probe,
        _stats: stat_rx,
    }
}

async fn echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let (mut conn, _) = listener.accept().await.unwrap();
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match conn.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if conn.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

async fn read_head(conn: &mut TcpStream) -> String {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        let n = timeout(WAIT, conn.read(&mut byte)).await.unwrap().unwrap();
        assert_eq!(n, 1, "connection closed inside the response head");
        head.push(byte[0]);
    }
    String::from_utf8(head).unwrap()
}

async fn http_connect(proxy: SocketAddr, target: SocketAddr) -> TcpStream {
    let mut conn = TcpStream::connect(proxy).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n\r\n", target, target);
    conn.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut conn).await;
    assert_eq!(head, "HTTP/1.1 200 Connection established\r\n\r\n");
    conn
}

async fn assert_echo(conn: &mut TcpStream, payload: &[u8]) {
    conn.write_all(payload).await.unwrap();
    let mut buf = vec![0u8; payload.len()];
    timeout(WAIT, conn.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(buf, payload);
}

async fn assert_closed(conn: &mut TcpStream) {
    let mut buf = [0u8; 16];
    match timeout(WAIT, conn.read(&mut buf)).await.unwrap() {
        Ok(n) => assert_eq!(n, 0),
        Err(_) => {} // reset
    }
}

#[tokio::test]
async fn test_http_connect_relay() {
    let proxy = start_proxy(true).await;
    let target = echo_server().await;

    let mut conn = http_connect(proxy.addr, target).await;
    assert_echo(&mut conn, b"ping").await;
    assert_echo(&mut conn, &[7u8; 40 * 1024]).await;
    assert_eq!(proxy.ctx.pool.count().await, 1);

    drop(conn);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.ctx.pool.count().await, 0);
}

#[tokio::test]
async fn test_socks5_relay() {
    let proxy = start_proxy(true).await;
    let target = echo_server().await;

    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    conn.write_all(&[5, 1, 0]).await.unwrap();
    let mut reply = [0u8; 2];
    conn.read_exact(&mut reply).await.unwrap();
    assert_eq!(reply, [5, 0]);

    let mut request = vec![5, 1, 0, 1, 127, 0, 0, 1];
    request.extend_from_slice(&target.port().to_be_bytes());
    conn.write_all(&request).await.unwrap();
    let mut reply = [0u8; 10];
    timeout(WAIT, conn.read_exact(&mut reply)).await.unwrap().unwrap();
    assert_eq!(&reply[..2], &[5, 0]);

    assert_echo(&mut conn, b"over socks").await;
}

#[tokio::test]
async fn test_plain_http_forwarded_without_proxy_headers() {
    let proxy = start_proxy(true).await;
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let origin = tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let head = read_head(&mut conn).await;
        conn.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await.unwrap();
        head
    });

    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!(
        "GET http://{}/index.html HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n\r\n",
        target, target
    );
    conn.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut conn).await;
    assert!(head.starts_with("HTTP/1.1 200 OK"));

    let forwarded = timeout(WAIT, origin).await.unwrap().unwrap();
    assert_eq!(forwarded, format!("GET /index.html HTTP/1.1\r\nHost: {}\r\n\r\n", target));
}

#[tokio::test]
async fn test_no_rule_matched_answers_bad_gateway() {
    let proxy = start_proxy(false).await;
    let target = echo_server().await;

    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT {} HTTP/1.1\r\n\r\n", target);
    conn.write_all(request.as_bytes()).await.unwrap();
    let head = read_head(&mut conn).await;
    assert!(head.starts_with("HTTP/1.1 502"));
    assert_closed(&mut conn).await;
}

#[tokio::test]
async fn test_memory_pressure_recycles_oldest() {
    let proxy = start_proxy(true).await;
    let target = echo_server().await;

    let mut first = http_connect(proxy.addr, target).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _second = http_connect(proxy.addr, target).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    let _third = http_connect(proxy.addr, target).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(proxy.ctx.pool.count().await, 3);

    proxy.probe.set(4096);
    let mut fourth = TcpStream::connect(proxy.addr).await.unwrap();
    assert_closed(&mut first).await;
    proxy.probe.set(0);

    fourth
        .write_all(format!("CONNECT {} HTTP/1.1\r\n\r\n", target).as_bytes())
        .await
        .unwrap();
    assert_eq!(read_head(&mut fourth).await, "HTTP/1.1 200 Connection established\r\n\r\n");
    assert_echo(&mut fourth, b"still serving").await;
}

#[tokio::test]
async fn test_stop_closes_live_tunnels() {
    let proxy = start_proxy(true).await;
    let target = echo_server().await;

    let mut conn = http_connect(proxy.addr, target).await;
    assert_echo(&mut conn, b"hello").await;
    proxy.server.stop().await.unwrap();
    assert_closed(&mut conn).await;
    assert_eq!(proxy.ctx.pool.count().await, 0);
}

fn loopback_only() -> Rule<AdapterFactoryRef> {
    Rule::IpRangeList {
        ranges: vec![IpRange::parse("127.0.0.0/8").unwrap()],
        adapter: AdapterFactoryManager::default().direct(),
    }
}

#[tokio::test]
async fn test_domain_routed_by_resolved_ip() {
    let rules = RuleManager::new(vec![loopback_only()], AdapterFactoryManager::default().direct(), false);
    let resolver = StaticResolver::new()
        .with_host("echo.test", "127.0.0.1".parse().unwrap())
        .with_host("far.test", "10.1.2.3".parse().unwrap());
    let proxy = start_proxy_with(rules, resolver).await;
    let target = echo_server().await;

    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT echo.test:{} HTTP/1.1\r\n\r\n", target.port());
    conn.write_all(request.as_bytes()).await.unwrap();
    assert_eq!(read_head(&mut conn).await, "HTTP/1.1 200 Connection established\r\n\r\n");
    assert_echo(&mut conn, b"ping").await;

    // resolves outside the range, nothing else matches
    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("CONNECT far.test:{} HTTP/1.1\r\n\r\n", target.port());
    conn.write_all(request.as_bytes()).await.unwrap();
    assert!(read_head(&mut conn).await.starts_with("HTTP/1.1 502"));
    assert_closed(&mut conn).await;
}

#[tokio::test]
async fn test_unresolvable_host_routed_by_dns_fail() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream = listener.local_addr().unwrap();
    let (head_tx, head_rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut conn, _) = listener.accept().await.unwrap();
        let head = read_head(&mut conn).await;
        conn.write_all(b"HTTP/1.1 200 Connection established\r\n\r\n").await.unwrap();
        head_tx.send(head).unwrap();
        let mut buf = [0u8; 1024];
        while let Ok(n) = conn.read(&mut buf).await {
            if n == 0 || conn.write_all(&buf[..n]).await.is_err() {
                break;
            }
        }
    });

    let upstream: AdapterFactoryRef = Arc::new(HttpAdapterFactory::new(HttpProxyServer {
        host: upstream.ip().to_string(),
        port: upstream.port(),
        auth: None,
    }));
    let rules = RuleManager::new(
        vec![loopback_only(), Rule::DnsFail { adapter: upstream }],
        AdapterFactoryManager::default().direct(),
        false,
    );
    let proxy = start_proxy_with(rules, StaticResolver::new()).await;

    let mut conn = TcpStream::connect(proxy.addr).await.unwrap();
    conn.write_all(b"CONNECT missing.test:80 HTTP/1.1\r\n\r\n").await.unwrap();
    assert_eq!(read_head(&mut conn).await, "HTTP/1.1 200 Connection established\r\n\r\n");
    let head = timeout(WAIT, head_rx).await.unwrap().unwrap();
    assert!(head.starts_with("CONNECT missing.test:80 HTTP/1.1\r\n"));
    assert_echo(&mut conn, b"through upstream").await;
}
