use std::io;

use anyhow::Result;
use serde::Serialize;

use crate::cli::command::OutputFormat;
use crate::cli::write_json_line;
use crate::protocol::{ChannelId, known_channels};
use crate::terminal::TerminalClient;

use super::ui::{ChannelTableView, Painter};

#[derive(Serialize)]
struct ChannelRow {
    channel: ChannelId,
    kind: String,
    writable: bool,
    description: &'static str,
}

/// Executes the `channels` command.
pub(crate) fn run<W>(
    out: &mut W,
    terminal_client: &dyn TerminalClient,
    output_format: OutputFormat,
) -> Result<()>
where
    W: io::Write,
{
    let channels: Vec<ChannelId> = known_channels().collect();
    match output_format {
        OutputFormat::Pretty => {
            let painter = Painter::new(terminal_client.stdout_is_terminal());
            writeln!(out, "{}", ChannelTableView::new(&channels, &painter))?;
        }
        OutputFormat::Json => {
            let rows: Vec<ChannelRow> = channels
                .into_iter()
                .map(|channel| {
                    let metadata = channel.metadata();
                    ChannelRow {
                        channel,
                        kind: metadata.kind().to_string(),
                        writable: metadata.writable(),
                        description: metadata.description(),
                    }
                })
                .collect();
            write_json_line(out, &rows)?;
        }
    }
    Ok(())
}
