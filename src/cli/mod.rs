pub(crate) mod channels;
pub(crate) mod command;
pub(crate) mod control;
pub(crate) mod listen;
pub(crate) mod ui;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::hw::{EventSink, FanSession, PreparedFan, SessionEvent};

pub use self::command::{Args, Command, FakeArgs, FanTarget, LogLevel, OutputFormat};
pub use self::control::ControlArgs;
pub use self::listen::ListenArgs;

/// A started session together with the backend it runs against.
pub(crate) struct CliSession {
    session: FanSession,
    prepared: PreparedFan,
    events: UnboundedReceiver<SessionEvent>,
}

impl CliSession {
    /// Prepares the backend and starts a session on it.
    pub(crate) async fn open(target: FanTarget) -> Result<Self> {
        let (config, timings, backend) = target.into_parts();
        let prepared = backend.prepare(config).await?;

        let (sink, events) = EventSink::channel();
        let sink = Arc::new(sink);
        let session = match FanSession::new(prepared.config(), timings, sink.clone(), sink) {
            Ok(session) => session,
            Err(error) => {
                prepared.shutdown().await;
                return Err(error.into());
            }
        };
        if let Err(error) = session.start().await {
            prepared.shutdown().await;
            return Err(error.into());
        }

        Ok(Self {
            session,
            prepared,
            events,
        })
    }

    pub(crate) fn session(&self) -> &FanSession {
        &self.session
    }

    pub(crate) fn events(&mut self) -> &mut UnboundedReceiver<SessionEvent> {
        &mut self.events
    }

    /// Stops the session, then the backend.
    pub(crate) async fn close(self) {
        self.session.stop().await;
        self.prepared.shutdown().await;
    }
}

pub(crate) fn write_json_line(out: &mut impl io::Write, value: &impl Serialize) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}
