mod channel_view;
mod painter;
mod session_view;
mod table;

pub(crate) use self::channel_view::ChannelTableView;
pub(crate) use self::painter::Painter;
pub(crate) use self::session_view::{ListenSummaryView, SessionEventView, SessionReadyView};
