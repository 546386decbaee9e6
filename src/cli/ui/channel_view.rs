use std::fmt::{self, Display, Formatter};

use crate::protocol::ChannelId;

use super::painter::Painter;
use super::table::Table;

/// Renders the channel catalogue as a table.
pub(crate) struct ChannelTableView<'a> {
    channels: &'a [ChannelId],
    painter: &'a Painter,
}

impl<'a> ChannelTableView<'a> {
    pub(crate) fn new(channels: &'a [ChannelId], painter: &'a Painter) -> Self {
        Self { channels, painter }
    }
}

impl Display for ChannelTableView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let rows = self
            .channels
            .iter()
            .map(|channel| {
                let metadata = channel.metadata();
                let access = if metadata.writable() {
                    self.painter.success("read-write")
                } else {
                    self.painter.muted("read-only")
                };
                vec![
                    self.painter.channel(channel.to_string()),
                    metadata.kind().to_string(),
                    access,
                    metadata.description().to_owned(),
                ]
            })
            .collect();
        let table = Table::grid(["channel", "kind", "access", "description"], rows);

        write!(f, "{}", self.painter.heading("Channels:"))?;
        write!(f, "\n{table}")
    }
}
