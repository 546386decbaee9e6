use std::fmt::{self, Display, Formatter};

use crate::cli::listen::{ListenStopReason, ListenSummary};
use crate::config::DeviceAddress;
use crate::hw::{SessionEvent, StatusReport};

use super::painter::Painter;
use super::table::Table;

/// Renders the fan a session is talking to.
pub(crate) struct SessionReadyView<'a> {
    address: &'a DeviceAddress,
    painter: &'a Painter,
}

impl<'a> SessionReadyView<'a> {
    pub(crate) fn new(address: &'a DeviceAddress, painter: &'a Painter) -> Self {
        Self { address, painter }
    }
}

impl Display for SessionReadyView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let local_address = match self.address.local_address() {
            Some(address) => self.painter.value(address.to_string()),
            None => self.painter.muted("<any>"),
        };
        let table = Table::key_value(
            self.painter,
            vec![
                ("fan", self.painter.value(self.address.label())),
                ("mac", self.painter.value(self.address.mac())),
                (
                    "endpoint",
                    self.painter.value(self.address.socket_addr().to_string()),
                ),
                ("local_address", local_address),
            ],
        );

        write!(f, "{}", self.painter.heading("Fan session:"))?;
        write!(f, "\n{table}")
    }
}

/// Renders one session event as a single line.
pub(crate) struct SessionEventView<'a> {
    index: usize,
    event: &'a SessionEvent,
    painter: &'a Painter,
}

impl<'a> SessionEventView<'a> {
    pub(crate) fn new(index: usize, event: &'a SessionEvent, painter: &'a Painter) -> Self {
        Self {
            index,
            event,
            painter,
        }
    }
}

impl Display for SessionEventView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let index = self.painter.muted(format!("[{:04}]", self.index));
        match self.event {
            SessionEvent::Status(report) => {
                write!(f, "{index} {} {}", self.painter.heading("status"), StatusView {
                    report,
                    painter: self.painter,
                })
            }
            SessionEvent::Channel { channel, value } => write!(
                f,
                "{index} {} {}",
                self.painter.channel(channel.to_string()),
                self.painter.value(value.to_string())
            ),
        }
    }
}

struct StatusView<'a> {
    report: &'a StatusReport,
    painter: &'a Painter,
}

impl Display for StatusView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.painter.status(self.report.status))?;
        if let Some(detail) = self.report.detail {
            write!(f, " {}", self.painter.muted(format!("({detail})")))?;
        }
        if let Some(message) = &self.report.message {
            write!(f, " {}", self.painter.muted(message))?;
        }
        Ok(())
    }
}

/// Renders the listen summary line.
pub(crate) struct ListenSummaryView<'a> {
    summary: &'a ListenSummary,
    painter: &'a Painter,
}

impl<'a> ListenSummaryView<'a> {
    pub(crate) fn new(summary: &'a ListenSummary, painter: &'a Painter) -> Self {
        Self { summary, painter }
    }
}

impl Display for ListenSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let stop_reason = self.summary.stop_reason().to_string();
        let stop_reason = match self.summary.stop_reason() {
            ListenStopReason::ReachedLimit(_) | ListenStopReason::ReachedDuration => {
                self.painter.success(stop_reason)
            }
            ListenStopReason::Interrupted | ListenStopReason::EventStreamClosed => {
                self.painter.warning(stop_reason)
            }
        };
        write!(
            f,
            "{} {} {}",
            self.painter.heading("Stopped:"),
            stop_reason,
            self.painter.value(format!(
                "- received {} channel update(s)",
                self.summary.received_updates()
            ))
        )
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;
    use crate::config::FanConfig;
    use crate::handlers::Percent;
    use crate::hw::{ChannelValue, DeviceStatus, StatusDetail};
    use crate::protocol::ChannelId;

    fn painter() -> Painter {
        Painter::new(false)
    }

    #[test]
    fn channel_update_shows_channel_and_value() {
        let percent = Percent::new(43).expect("43 is a valid percent");
        let event = SessionEvent::Channel {
            channel: ChannelId::FanSpeed,
            value: ChannelValue::Percent(percent),
        };
        let painter = painter();
        assert_snapshot!(SessionEventView::new(7, &event, &painter).to_string(), @"[0007] fan-speed 43%");
    }

    #[test]
    fn detailed_offline_status_shows_reason() {
        let event = SessionEvent::Status(StatusReport {
            status: DeviceStatus::Offline,
            detail: Some(StatusDetail::ConfigurationError),
            message: Some("No suitable network interface".to_owned()),
        });
        let painter = painter();
        assert_snapshot!(
            SessionEventView::new(1, &event, &painter).to_string(),
            @"[0001] status offline (configuration error) No suitable network interface"
        );
    }

    #[rstest]
    #[case::limit(ListenStopReason::ReachedLimit(3), "reached limit of 3 update(s)")]
    #[case::interrupted(ListenStopReason::Interrupted, "interrupted")]
    fn summary_names_stop_reason(#[case] stop_reason: ListenStopReason, #[case] expected: &str) {
        let summary = ListenSummary::new(3, stop_reason);
        let painter = painter();
        let rendered = ListenSummaryView::new(&summary, &painter).to_string();
        assert_eq!(
            format!("Stopped: {expected} - received 3 channel update(s)"),
            rendered
        );
    }

    #[test]
    fn ready_view_lists_endpoint() {
        let address = FanConfig::builder()
            .mac("20:F8:5E:AA:BB:CC")
            .label("Porch")
            .ip("10.0.0.2")
            .build()
            .validate()
            .expect("config is valid");
        let painter = painter();
        assert_snapshot!(SessionReadyView::new(&address, &painter).to_string(), @r"
        Fan session:
        ╭───────────────┬───────────────────╮
        │ field         │ value             │
        ├───────────────┼───────────────────┤
        │ fan           │ Porch             │
        │ mac           │ 20:F8:5E:AA:BB:CC │
        │ endpoint      │ 10.0.0.2:31415    │
        │ local_address │ <any>             │
        ╰───────────────┴───────────────────╯
        ");
    }
}
