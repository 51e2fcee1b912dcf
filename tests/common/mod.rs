//! In-process LCN-PCK/IP gateway for integration tests.

#![allow(dead_code)]

use std::time::Duration;

use anyhow::{Context, Result, bail};
use lcn_pck::{Event, LcnOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Constants
// ============================================================================

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

pub const USER: &str = "lcn";
pub const PASSWORD: &str = "secret";

// ============================================================================
// Setup
// ============================================================================

/// Installs a log subscriber honouring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Options pointing at a mock gateway, with short timeouts.
pub fn options(port: u16) -> LcnOptions {
    LcnOptions {
        host: "127.0.0.1".to_string(),
        port,
        user: USER.to_string(),
        password: PASSWORD.to_string(),
        reconnect_timeout: Duration::from_millis(200),
        default_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(2),
        scan_response_timeout: Duration::from_millis(100),
        ..LcnOptions::default()
    }
}

/// Waits for the first event matching `predicate`.
pub async fn wait_for(
    events: &mut broadcast::Receiver<Event>,
    predicate: impl Fn(&Event) -> bool,
) -> Result<Event> {
    let wait = async {
        loop {
            let event = events.recv().await?;
            if predicate(&event) {
                return Ok::<_, anyhow::Error>(event);
            }
        }
    };
    timeout(WAIT, wait)
        .await
        .context("timed out waiting for event")?
}

// ============================================================================
// MockGateway
// ============================================================================

/// Listening side of the mock.
pub struct MockGateway {
    listener: TcpListener,
}

impl MockGateway {
    pub async fn bind() -> Result<Self> {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn port(&self) -> u16 {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .unwrap_or_default()
    }

    /// Accepts the next driver connection and greets it.
    pub async fn accept(&self) -> Result<GatewaySession> {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .context("driver did not connect")??;
        let (reader, writer) = stream.into_split();
        let mut session = GatewaySession {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        session.send("LCN-PCK/IP 1.0").await?;
        Ok(session)
    }

    /// Accepts a connection and runs the full login with bus attach.
    pub async fn accept_ready(&self) -> Result<GatewaySession> {
        let mut session = self.accept().await?;
        session.login().await?;
        session.send("$io:#LCN:connected").await?;
        session.answer_setup().await?;
        Ok(session)
    }
}

// ============================================================================
// GatewaySession
// ============================================================================

/// One accepted driver connection.
pub struct GatewaySession {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl GatewaySession {
    /// Sends one line to the driver.
    pub async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(format!("{line}\r\n").as_bytes()).await?;
        Ok(())
    }

    /// Receives the next line from the driver.
    pub async fn recv(&mut self) -> Result<String> {
        match timeout(WAIT, self.lines.next_line()).await {
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => bail!("driver closed the connection"),
            Ok(Err(err)) => Err(err.into()),
            Err(_) => bail!("driver sent nothing"),
        }
    }

    /// Receives the next line and checks it.
    pub async fn expect(&mut self, expected: &str) -> Result<()> {
        let line = self.recv().await?;
        if line != expected {
            bail!("expected {expected:?}, got {line:?}");
        }
        Ok(())
    }

    /// Asserts the driver stays quiet for `period`.
    pub async fn expect_silence(&mut self, period: Duration) -> Result<()> {
        match timeout(period, self.lines.next_line()).await {
            Err(_) => Ok(()),
            Ok(Ok(Some(line))) => bail!("unexpected line {line:?}"),
            Ok(_) => bail!("driver closed the connection"),
        }
    }

    /// Waits until the driver closes the socket.
    pub async fn closed(&mut self) -> Result<()> {
        loop {
            match timeout(WAIT, self.lines.next_line()).await {
                Ok(Ok(Some(_))) => {}
                Ok(_) => return Ok(()),
                Err(_) => bail!("driver kept the connection open"),
            }
        }
    }

    /// Prompts for and checks the credentials.
    pub async fn login(&mut self) -> Result<()> {
        self.send("Username:").await?;
        self.expect(USER).await?;
        self.send("Password:").await?;
        self.expect(PASSWORD).await?;
        self.send("OK").await
    }

    /// Answers the analog and decimal mode commands.
    pub async fn answer_setup(&mut self) -> Result<()> {
        self.expect("!OM0P").await?;
        self.send("(0..50-mode percent)").await?;
        self.expect("!CHD").await?;
        self.send("(dec-mode)").await
    }
}
