// Shared primitives for starting a server and talking the line protocol in integration tests.
#![allow(dead_code)]

use std::time::Duration;
use swarm_server::ServerSettings;
use swarm_server::domain::tuning::PopulationTuning;
use swarm_server::frameworks::server::ServerHandle;
use swarm_server::use_cases::SimSettings;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

// Upper bound for any single wait in these tests.
pub const WAIT: Duration = Duration::from_secs(3);

// Small, fast, seeded world so tests stay quick and repeatable.
pub fn test_settings() -> ServerSettings {
    ServerSettings {
        sim: SimSettings {
            tick_interval: Duration::from_millis(5),
            workers: 2,
            seed: 7,
            population: PopulationTuning {
                initial_ai: 12,
                decorations: 1,
                ..PopulationTuning::default()
            },
            ..SimSettings::default()
        },
        broadcast_interval: Duration::from_millis(10),
        ..ServerSettings::default()
    }
}

// Bind an ephemeral port so parallel tests never collide, then start the server on it.
pub async fn start_server(settings: ServerSettings) -> ServerHandle {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral test port");
    swarm_server::spawn(listener, settings)
        .await
        .expect("server starts")
}

// A bare socket speaking the line protocol, for tests that need to send raw lines.
pub struct RawClient {
    pub lines: Lines<BufReader<OwnedReadHalf>>,
    pub writer: OwnedWriteHalf,
}

impl RawClient {
    pub async fn connect(server: &ServerHandle) -> Self {
        let stream = TcpStream::connect(server.local_addr())
            .await
            .expect("connect to test server");
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("write line");
    }

    // Read lines until one satisfies `pred`; keyframes interleave with replies.
    pub async fn read_until(&mut self, pred: impl Fn(&str) -> bool) -> String {
        tokio::time::timeout(WAIT, async {
            loop {
                let line = self
                    .lines
                    .next_line()
                    .await
                    .expect("read line")
                    .expect("server kept the connection open");
                if pred(&line) {
                    return line;
                }
            }
        })
        .await
        .expect("expected line in time")
    }

    // Drain until the server closes the stream; false if it stays open past `wait`.
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        tokio::time::timeout(wait, async {
            loop {
                match self.lines.next_line().await {
                    Ok(Some(_)) => continue,
                    Ok(None) | Err(_) => return,
                }
            }
        })
        .await
        .is_ok()
    }
}

// Poll an async condition until it holds or the shared wait elapses.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
