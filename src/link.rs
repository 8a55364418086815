//! Keeps a byte-stream connection to a TNC or gpsd alive.
//!
//! A [`Link`] owns a [`Dial`] implementation and the connection state. Its
//! owner calls [`Link::connect`] whenever it needs a (new) connection and
//! [`Link::mark_disconnected`] when the connection fails.

use std::{
    fmt::Display,
    future::Future,
    time::Duration,
};

use tokio::{
    io::{
        AsyncRead,
        AsyncWrite,
    },
    net::TcpStream,
    sync::watch,
};
use tokio_util::sync::CancellationToken;

use crate::Error;

pub const TCP_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const SERIAL_RECONNECT_DELAY: Duration = Duration::from_secs(30);
pub const SERIAL_BAUD_RATE: u32 = 4800;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Something that can open a byte stream.
pub trait Dial: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + Unpin + 'static;

    fn dial(&self) -> impl Future<Output = Result<Self::Stream, std::io::Error>> + Send;

    /// How long to wait after a failed attempt.
    fn reconnect_delay(&self) -> Duration;

    /// How long the connection may stay silent before it is considered dead.
    fn read_timeout(&self) -> Option<Duration> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct TcpDialer {
    address: String,
    read_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            read_timeout: None,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = Some(read_timeout);
        self
    }
}

impl Dial for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self) -> Result<TcpStream, std::io::Error> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn reconnect_delay(&self) -> Duration {
        TCP_RECONNECT_DELAY
    }

    fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl Display for TcpDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tcp://{}", self.address)
    }
}

/// A serial port, 8N1.
#[cfg(feature = "serial")]
#[derive(Clone, Debug)]
pub struct SerialDialer {
    path: String,
    baud_rate: u32,
}

#[cfg(feature = "serial")]
impl SerialDialer {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            baud_rate: SERIAL_BAUD_RATE,
        }
    }
}

#[cfg(feature = "serial")]
impl Dial for SerialDialer {
    type Stream = tokio_serial::SerialStream;

    async fn dial(&self) -> Result<tokio_serial::SerialStream, std::io::Error> {
        use tokio_serial::{
            DataBits,
            Parity,
            SerialPortBuilderExt,
            StopBits,
        };

        let stream = tokio_serial::new(self.path.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .open_native_async()?;
        Ok(stream)
    }

    fn reconnect_delay(&self) -> Duration {
        SERIAL_RECONNECT_DELAY
    }
}

#[cfg(feature = "serial")]
impl Display for SerialDialer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "serial://{}@{}", self.path, self.baud_rate)
    }
}

/// The TNC can be reached over TCP or a serial port.
#[derive(Clone, Debug)]
pub enum Transport {
    Tcp(TcpDialer),
    #[cfg(feature = "serial")]
    Serial(SerialDialer),
}

impl Dial for Transport {
    type Stream = Box<dyn AsyncStream>;

    async fn dial(&self) -> Result<Box<dyn AsyncStream>, std::io::Error> {
        match self {
            Transport::Tcp(dialer) => Ok(Box::new(dialer.dial().await?)),
            #[cfg(feature = "serial")]
            Transport::Serial(dialer) => Ok(Box::new(dialer.dial().await?)),
        }
    }

    fn reconnect_delay(&self) -> Duration {
        match self {
            Transport::Tcp(dialer) => dialer.reconnect_delay(),
            #[cfg(feature = "serial")]
            Transport::Serial(dialer) => dialer.reconnect_delay(),
        }
    }

    fn read_timeout(&self) -> Option<Duration> {
        match self {
            Transport::Tcp(dialer) => dialer.read_timeout(),
            #[cfg(feature = "serial")]
            Transport::Serial(dialer) => dialer.read_timeout(),
        }
    }
}

impl Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp(dialer) => write!(f, "{dialer}"),
            #[cfg(feature = "serial")]
            Transport::Serial(dialer) => write!(f, "{dialer}"),
        }
    }
}

#[derive(Debug)]
pub struct Link<D> {
    name: &'static str,
    dialer: D,
    state: watch::Sender<LinkState>,
}

impl<D: Dial> Link<D> {
    pub fn new(name: &'static str, dialer: D) -> Self {
        let (state, _) = watch::channel(LinkState::Disconnected);
        Self {
            name,
            dialer,
            state,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    pub fn mark_disconnected(&self) {
        let changed = self.state.send_if_modified(|state| {
            let changed = *state != LinkState::Disconnected;
            *state = LinkState::Disconnected;
            changed
        });
        if changed {
            tracing::debug!(link = self.name, "disconnected");
        }
    }

    /// Dials until a connection is established, waiting the dialer's reconnect
    /// delay between attempts.
    ///
    /// Only one call can be connecting at a time; any other returns
    /// [`Error::AlreadyConnecting`] right away. Returns `None` on shutdown.
    pub async fn connect(&self, shutdown: &CancellationToken) -> Result<Option<D::Stream>, Error> {
        let mut guard = ConnectingGuard::acquire(&self.state).ok_or(Error::AlreadyConnecting)?;

        let delay = self.dialer.reconnect_delay();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let result = tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                result = self.dialer.dial() => result,
            };

            match result {
                Ok(stream) => {
                    tracing::info!(link = self.name, attempt, "connected");
                    guard.connected();
                    return Ok(Some(stream));
                }
                Err(error) => {
                    tracing::warn!(
                        link = self.name,
                        attempt,
                        %error,
                        retry_in = %humantime::format_duration(delay),
                        "connect failed"
                    );
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(None),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Holds the `Connecting` state. Reverts to `Disconnected` unless the attempt
/// succeeded, including when the connecting future is dropped.
struct ConnectingGuard<'a> {
    state: &'a watch::Sender<LinkState>,
    connected: bool,
}

impl<'a> ConnectingGuard<'a> {
    fn acquire(state: &'a watch::Sender<LinkState>) -> Option<Self> {
        let acquired = state.send_if_modified(|state| {
            if *state == LinkState::Connecting {
                false
            }
            else {
                *state = LinkState::Connecting;
                true
            }
        });

        acquired.then_some(Self {
            state,
            connected: false,
        })
    }

    fn connected(&mut self) {
        self.connected = true;
        self.state.send_replace(LinkState::Connected);
    }
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        if !self.connected {
            self.state.send_replace(LinkState::Disconnected);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{
                AtomicUsize,
                Ordering,
            },
        },
        time::Duration,
    };

    use parking_lot::Mutex;
    use tokio::{
        io::DuplexStream,
        time::Instant,
    };
    use tokio_util::sync::CancellationToken;

    use crate::{
        Error,
        link::{
            Dial,
            Link,
            LinkState,
        },
    };

    /// Fails a number of times, then hands out queued streams.
    #[derive(Debug, Default)]
    pub(crate) struct TestDialer {
        pub failures: AtomicUsize,
        pub attempts: AtomicUsize,
        in_flight: AtomicUsize,
        pub max_in_flight: AtomicUsize,
        pub streams: Mutex<Vec<DuplexStream>>,
        pub read_timeout: Option<Duration>,
    }

    impl TestDialer {
        pub fn new(failures: usize, streams: Vec<DuplexStream>) -> Self {
            Self {
                failures: AtomicUsize::new(failures),
                streams: Mutex::new(streams),
                ..Default::default()
            }
        }
    }

    impl Dial for TestDialer {
        type Stream = DuplexStream;

        async fn dial(&self) -> Result<DuplexStream, std::io::Error> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(100)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(std::io::ErrorKind::ConnectionRefused.into());
            }

            let mut streams = self.streams.lock();
            if streams.is_empty() {
                Err(std::io::ErrorKind::ConnectionRefused.into())
            }
            else {
                Ok(streams.remove(0))
            }
        }

        fn reconnect_delay(&self) -> Duration {
            Duration::from_secs(5)
        }

        fn read_timeout(&self) -> Option<Duration> {
            self.read_timeout
        }
    }

    #[tokio::test(start_paused = true)]
    async fn it_retries_without_concurrent_dials() {
        let (stream, _peer) = tokio::io::duplex(64);
        let link = Arc::new(Link::new("test", TestDialer::new(2, vec![stream])));
        let shutdown = CancellationToken::new();
        let start = Instant::now();

        assert_eq!(link.state(), LinkState::Disconnected);

        let task = tokio::spawn({
            let link = link.clone();
            let shutdown = shutdown.clone();
            async move { link.connect(&shutdown).await }
        });

        while link.state() != LinkState::Connecting {
            tokio::task::yield_now().await;
        }

        // a second caller doesn't dial
        assert!(matches!(
            link.connect(&shutdown).await,
            Err(Error::AlreadyConnecting)
        ));

        let stream = task.await.unwrap().unwrap();
        assert!(stream.is_some());
        assert_eq!(link.state(), LinkState::Connected);

        let dialer = link.dialer();
        assert_eq!(dialer.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(dialer.max_in_flight.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() >= Duration::from_secs(10));

        link.mark_disconnected();
        assert_eq!(link.state(), LinkState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn it_stops_retrying_on_shutdown() {
        let link = Arc::new(Link::new("test", TestDialer::new(usize::MAX, vec![])));
        let shutdown = CancellationToken::new();

        let task = tokio::spawn({
            let link = link.clone();
            let shutdown = shutdown.clone();
            async move { link.connect(&shutdown).await }
        });

        tokio::time::sleep(Duration::from_secs(12)).await;
        shutdown.cancel();

        assert!(task.await.unwrap().unwrap().is_none());
        assert_eq!(link.state(), LinkState::Disconnected);
        assert_eq!(link.dialer().attempts.load(Ordering::SeqCst), 3);
    }
}
