//! Loopback servers for network-facing tests

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Minimal HTTP/1.1 server answering with a scripted sequence of responses.
///
/// The last response repeats once the script runs out.
pub struct HttpResponder {
    addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl HttpResponder {
    pub async fn start(script: Vec<(u16, &str)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let script: Arc<Vec<(u16, String)>> = Arc::new(
            script
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect(),
        );

        let counter = Arc::clone(&hits);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let (status, body) = script[index.min(script.len() - 1)].clone();
                tokio::spawn(async move {
                    read_request_head(&mut stream).await;
                    let response = format!(
                        "HTTP/1.1 {} Scripted\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, hits, handle }
    }

    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    /// Number of connections accepted so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

impl Drop for HttpResponder {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn read_request_head(stream: &mut TcpStream) {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&buf[..n]),
        }
    }
}

/// No-auth SOCKS5 server that relays CONNECT requests to their target.
///
/// A silent relay accepts the CONNECT and then never forwards a byte.
pub struct Socks5Relay {
    addr: SocketAddr,
    connects: Arc<Mutex<Vec<SocketAddr>>>,
    handle: JoinHandle<()>,
}

impl Socks5Relay {
    pub async fn start() -> Self {
        Self::spawn(false).await
    }

    pub async fn start_silent() -> Self {
        Self::spawn(true).await
    }

    async fn spawn(silent: bool) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connects = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&connects);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    let _ = relay(stream, log, silent).await;
                });
            }
        });

        Self {
            addr,
            connects,
            handle,
        }
    }

    /// The relay as a `host:port` candidate
    pub fn candidate(&self) -> String {
        self.addr.to_string()
    }

    /// Targets requested through CONNECT so far
    pub fn connects(&self) -> Vec<SocketAddr> {
        self.connects.lock().unwrap().clone()
    }
}

impl Drop for Socks5Relay {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn relay(
    mut client: TcpStream,
    log: Arc<Mutex<Vec<SocketAddr>>>,
    silent: bool,
) -> std::io::Result<()> {
    // Greeting: VER NMETHODS METHODS...
    let mut header = [0u8; 2];
    client.read_exact(&mut header).await?;
    let mut methods = vec![0u8; header[1] as usize];
    client.read_exact(&mut methods).await?;
    client.write_all(&[0x05, 0x00]).await?;

    // Request: VER CMD RSV ATYP DST.ADDR DST.PORT
    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    let target = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            let port = client.read_u16().await?;
            SocketAddr::from((Ipv4Addr::from(ip), port))
        }
        0x04 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            let port = client.read_u16().await?;
            SocketAddr::from((Ipv6Addr::from(ip), port))
        }
        0x03 => {
            let len = client.read_u8().await? as usize;
            let mut host = vec![0u8; len];
            client.read_exact(&mut host).await?;
            let port = client.read_u16().await?;
            let host = String::from_utf8_lossy(&host).to_string();
            let resolved = tokio::net::lookup_host((host.as_str(), port))
                .await?
                .next()
                .ok_or_else(|| std::io::Error::other("unresolved host"))?;
            resolved
        }
        _ => return Ok(()),
    };

    let mut upstream = match TcpStream::connect(target).await {
        Ok(stream) => stream,
        Err(_) => {
            client
                .write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                .await?;
            return Ok(());
        }
    };
    log.lock().unwrap().push(target);
    client
        .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await?;

    if silent {
        // Hold both ends open until the peer gives up
        let mut sink = [0u8; 1024];
        while client.read(&mut sink).await? != 0 {}
        return Ok(());
    }

    tokio::io::copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(())
}
