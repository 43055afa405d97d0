use crate::config::ResolverConfig;
use crate::core::{ErrorKind, ResolveError};
use crate::dns::MessageId;
use crate::timeout::Timeout;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const MAX_DATAGRAM_SIZE: usize = 65535;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp => write!(f, "udp"),
            Self::Tcp => write!(f, "tcp"),
        }
    }
}

/// Something that happened on a socket owned by the `Transport`.
#[derive(Debug)]
pub enum TransportEvent {
    /// Bytes of a (possibly malformed) DNS message received from a nameserver.
    Inbound {
        endpoint: usize,
        protocol: Protocol,
        bytes: Vec<u8>,
    },
    /// A TCP exchange for a transaction could not be completed.
    StreamFailed {
        id: MessageId,
        endpoint: usize,
        err: ResolveError,
    },
}

/// A configured nameserver and its health.
#[derive(Debug, Clone)]
pub struct Endpoint {
    addr: SocketAddr,
    consecutive_failures: u32,
    down_until: Option<Instant>,
}

impl Endpoint {
    fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            consecutive_failures: 0,
            down_until: None,
        }
    }

    #[cfg(test)]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_available(&self, now: Instant) -> bool {
        self.down_until.map(|t| t <= now).unwrap_or(true)
    }
}

#[derive(Debug)]
struct UdpChannel {
    sock: std::net::UdpSocket,
    reader: JoinHandle<()>,
}

/// Owns every socket used to talk to nameservers.
///
/// Each nameserver gets a single connected UDP socket shared by all queries sent
/// to it. Datagrams arriving on any socket, and results of TCP exchanges, are funneled
/// into one queue that can be drained without blocking via `poll` or awaited via
/// `readable`. Matching what arrives to queries is left to the caller.
#[derive(Debug)]
pub struct Transport {
    runtime: Handle,
    endpoints: Vec<Endpoint>,
    current: usize,
    rotate: bool,
    timeout: Duration,
    failover_threshold: u32,
    backoff_min: Duration,
    backoff_max: Duration,
    udp: HashMap<usize, UdpChannel>,
    streams: HashMap<MessageId, JoinHandle<()>>,
    inbound_tx: UnboundedSender<TransportEvent>,
    inbound_rx: UnboundedReceiver<TransportEvent>,
}

impl Transport {
    pub fn new(config: &ResolverConfig, runtime: Handle) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Self {
            runtime,
            endpoints: config.nameservers.iter().copied().map(Endpoint::new).collect(),
            current: 0,
            rotate: config.rotate,
            timeout: config.timeout,
            failover_threshold: config.failover_threshold.max(1),
            backoff_min: config.backoff_min,
            backoff_max: config.backoff_max,
            udp: HashMap::new(),
            streams: HashMap::new(),
            inbound_tx,
            inbound_rx,
        }
    }

    #[cfg(test)]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn addr(&self, endpoint: usize) -> SocketAddr {
        self.endpoints[endpoint % self.endpoints.len()].addr
    }

    /// Pick the nameserver for an attempt. First attempts (`previous` is `None`) start
    /// at the current nameserver, or the next in turn when rotating. Retries move on
    /// from the nameserver used by the previous attempt. Backed off nameservers are
    /// skipped unless every nameserver is backed off.
    pub fn select(&mut self, previous: Option<usize>, now: Instant) -> usize {
        let n = self.endpoints.len();
        let start = match previous {
            Some(p) => (p + 1) % n,
            None if self.rotate => {
                let idx = self.current;
                self.current = (self.current + 1) % n;
                idx
            }
            None => self.current,
        };

        (0..n)
            .map(|i| (start + i) % n)
            .find(|&i| self.endpoints[i].is_available(now))
            .unwrap_or(start)
    }

    /// Record a failed attempt (timeout, server failure, broken stream) against a nameserver,
    /// backing it off once it has failed too many times in a row.
    pub fn record_failure(&mut self, endpoint: usize, now: Instant) {
        let n = self.endpoints.len();
        let threshold = self.failover_threshold;
        let (min, max) = (self.backoff_min, self.backoff_max);
        let ep = &mut self.endpoints[endpoint];
        ep.consecutive_failures = ep.consecutive_failures.saturating_add(1);

        if ep.consecutive_failures >= threshold {
            let exp = (ep.consecutive_failures - threshold).min(16);
            let backoff = min.saturating_mul(1 << exp).min(max);
            ep.down_until = Some(now + backoff);

            tracing::warn!(
                message = "backing off nameserver",
                server = %ep.addr,
                failures = ep.consecutive_failures,
                backoff = ?backoff,
            );

            if self.current == endpoint && n > 1 {
                self.current = (endpoint + 1) % n;
                tracing::debug!(message = "failing over to next nameserver", server = %self.endpoints[self.current].addr);
            }
        }
    }

    pub fn record_success(&mut self, endpoint: usize) {
        let ep = &mut self.endpoints[endpoint];
        if ep.consecutive_failures > 0 {
            tracing::debug!(message = "nameserver recovered", server = %ep.addr, failures = ep.consecutive_failures);
        }

        ep.consecutive_failures = 0;
        ep.down_until = None;
    }

    /// Send an encoded message for transaction `id` to a nameserver without blocking.
    ///
    /// UDP messages are written to the shared socket for the nameserver, binding it
    /// first if needed. TCP messages start a background exchange whose result arrives
    /// later as a `TransportEvent`, replacing any earlier exchange for the same `id`.
    pub fn send(&mut self, id: MessageId, endpoint: usize, protocol: Protocol, bytes: Vec<u8>) -> Result<(), ResolveError> {
        match protocol {
            Protocol::Udp => self.send_udp(endpoint, &bytes),
            Protocol::Tcp => {
                self.send_tcp(id, endpoint, bytes);
                Ok(())
            }
        }
    }

    fn send_udp(&mut self, endpoint: usize, bytes: &[u8]) -> Result<(), ResolveError> {
        let stale = self.udp.get(&endpoint).map(|c| c.reader.is_finished()).unwrap_or(false);
        if stale {
            tracing::debug!(message = "rebinding UDP socket", server = %self.endpoints[endpoint].addr);
            self.udp.remove(&endpoint);
        }

        let channel = match self.udp.entry(endpoint) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let server = self.endpoints[endpoint].addr;
                e.insert(Self::bind_udp(&self.runtime, endpoint, server, self.inbound_tx.clone())?)
            }
        };

        channel.sock.send(bytes)?;
        Ok(())
    }

    fn bind_udp(
        runtime: &Handle,
        endpoint: usize,
        server: SocketAddr,
        tx: UnboundedSender<TransportEvent>,
    ) -> Result<UdpChannel, ResolveError> {
        let local = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let sock = std::net::UdpSocket::bind(local)?;
        sock.connect(server)?;
        sock.set_nonblocking(true)?;
        let recv = sock.try_clone()?;

        let reader = runtime.spawn(async move {
            match UdpSocket::from_std(recv) {
                Ok(s) => read_datagrams(s, endpoint, tx).await,
                Err(e) => tracing::warn!(message = "unable to register UDP socket", server = %server, err = %e),
            }
        });

        tracing::debug!(message = "bound UDP socket", server = %server, local = ?sock.local_addr().ok());
        Ok(UdpChannel { sock, reader })
    }

    fn send_tcp(&mut self, id: MessageId, endpoint: usize, bytes: Vec<u8>) {
        self.forget(id);

        let server = self.endpoints[endpoint].addr;
        let timeout = self.timeout;
        let tx = self.inbound_tx.clone();

        let handle = self.runtime.spawn(async move {
            let res = async {
                let stream = TcpStream::connect(server).await?;
                let (read, write) = stream.into_split();
                let mut client = TcpClient::new(read, write);
                client.exchange(&bytes).await
            }
            .timeout(timeout, format!("tcp://{} exchange", server))
            .await;

            let event = match res {
                Ok(bytes) => TransportEvent::Inbound {
                    endpoint,
                    protocol: Protocol::Tcp,
                    bytes,
                },
                Err(err) => TransportEvent::StreamFailed { id, endpoint, err },
            };

            // The receiver only goes away when the transport is dropped.
            let _ = tx.send(event);
        });

        self.streams.insert(id, handle);
    }

    /// Stop tracking transaction `id`, aborting any TCP exchange still running for it.
    pub fn forget(&mut self, id: MessageId) {
        if let Some(handle) = self.streams.remove(&id) {
            if !handle.is_finished() {
                tracing::trace!(message = "aborting TCP exchange", id = %id);
            }
            handle.abort();
        }
    }

    #[cfg(test)]
    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    /// Return every event that is ready without waiting.
    pub fn poll(&mut self) -> Vec<TransportEvent> {
        self.streams.retain(|_, h| !h.is_finished());

        let mut out = Vec::new();
        while let Ok(ev) = self.inbound_rx.try_recv() {
            out.push(ev);
        }

        out
    }

    /// Wait for the next event. Cancel safe.
    pub async fn readable(&mut self) -> Option<TransportEvent> {
        self.inbound_rx.recv().await
    }

    /// Close every socket and abort every TCP exchange, discarding anything already received.
    pub fn shutdown(&mut self) {
        for (_, channel) in self.udp.drain() {
            channel.reader.abort();
        }

        for (_, handle) in self.streams.drain() {
            handle.abort();
        }

        while self.inbound_rx.try_recv().is_ok() {}
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Forward every datagram received on `sock` to the transport until the transport
/// goes away or the socket fails.
async fn read_datagrams<T>(sock: T, endpoint: usize, tx: UnboundedSender<TransportEvent>)
where
    T: AsyncDatagram,
{
    let mut buf = vec![0_u8; MAX_DATAGRAM_SIZE];

    loop {
        match sock.recv(&mut buf).await {
            Ok(n) => {
                let event = TransportEvent::Inbound {
                    endpoint,
                    protocol: Protocol::Udp,
                    bytes: buf[..n].to_vec(),
                };

                if tx.send(event).is_err() {
                    return;
                }
            }
            // ICMP errors from earlier sends on a connected socket show up here. They
            // don't mean the socket is unusable so keep reading and let the query time out.
            Err(e) if is_transient(&e) => {
                tracing::debug!(message = "transient error reading UDP socket", endpoint = endpoint, err = %e);
            }
            Err(e) => {
                tracing::warn!(message = "error reading UDP socket", endpoint = endpoint, err = %e);
                return;
            }
        }
    }
}

fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset | io::ErrorKind::Interrupted
    )
}

trait AsyncDatagram {
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

impl AsyncDatagram for UdpSocket {
    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }
}

/// Client for exchanging a single length prefixed DNS message over a stream.
struct TcpClient<R, W>
where
    R: AsyncRead + Unpin + Send + Sync + 'static,
    W: AsyncWrite + Unpin + Send + Sync + 'static,
{
    read: BufReader<R>,
    write: BufWriter<W>,
}

impl<R, W> TcpClient<R, W>
where
    R: AsyncRead + Unpin + Sync + Send + 'static,
    W: AsyncWrite + Unpin + Sync + Send + 'static,
{
    fn new(read: R, write: W) -> Self {
        Self {
            read: BufReader::new(read),
            write: BufWriter::new(write),
        }
    }

    async fn exchange(&mut self, msg: &[u8]) -> Result<Vec<u8>, ResolveError> {
        let len = u16::try_from(msg.len())
            .map_err(|_| ResolveError::internal(format!("message of {} bytes too large for TCP", msg.len())))?;

        self.write.write_u16(len).await?;
        self.write.write_all(msg).await?;
        self.write.flush().await?;

        // Response is prefixed by its size as a big-endian (network order) u16.
        let sz = self.read.read_u16().await?;
        if sz == 0 {
            return Err(ResolveError::new(ErrorKind::MalformedMessage, "empty TCP response"));
        }

        let mut buf = vec![0_u8; usize::from(sz)];
        self.read.read_exact(&mut buf).await?;
        Ok(buf)
    }
}
