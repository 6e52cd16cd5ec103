// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup: stdout by default, or syslog when `--log-to-syslog` is set.

use std::fmt;
use std::os::unix::net::UnixDatagram;
use std::sync::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::{fmt as tfmt, prelude::*, EnvFilter, Layer};

const SYSLOG_SOCKET_PATH: &str = "/dev/log";

/// Install the global tracing subscriber. `log_to_syslog` swaps the fmt
/// layer for a best-effort syslog layer rather than stdout.
pub fn init(log_to_syslog: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_to_syslog {
        tracing_subscriber::registry()
            .with(filter)
            .with(SyslogLayer::connect())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tfmt::layer())
            .init();
    }
}

/// Minimal RFC3164-style syslog writer over the local `/dev/log` datagram
/// socket. Connection failures and send failures are swallowed: a daemon
/// should not die because its logging sink is unavailable.
struct SyslogLayer {
    socket: Option<Mutex<UnixDatagram>>,
}

impl SyslogLayer {
    fn connect() -> Self {
        let socket = UnixDatagram::unbound()
            .and_then(|sock| sock.connect(SYSLOG_SOCKET_PATH).map(|_| sock))
            .ok()
            .map(Mutex::new);
        if socket.is_none() {
            eprintln!("lsf-agent: could not connect to {SYSLOG_SOCKET_PATH}, syslog logging disabled");
        }
        Self { socket }
    }

    /// <facility*8 + severity>, facility = daemon (3), severity = info (6).
    const PRIORITY: &'static str = "<30>";
}

impl<S: Subscriber> Layer<S> for SyslogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(socket) = &self.socket else {
            return;
        };

        let mut message = MessageVisitor::default();
        event.record(&mut message);

        let line = format!(
            "{}lsf-agent[{}]: {} {}",
            Self::PRIORITY,
            std::process::id(),
            event.metadata().target(),
            message.0
        );

        if let Ok(sock) = socket.lock() {
            let _ = sock.send(line.as_bytes());
        }
    }
}

#[derive(Default)]
struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        } else if self.0.is_empty() {
            self.0 = format!("{}={:?}", field.name(), value);
        } else {
            self.0 = format!("{} {}={:?}", self.0, field.name(), value);
        }
    }
}
