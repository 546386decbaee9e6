use owo_colors::{OwoColorize, Style as OwoStyle};

use crate::hw::DeviceStatus;

/// Applies colour and style to terminal text.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    /// Creates a painter with explicit colour control.
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn channel<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().magenta())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    /// Green when online, yellow otherwise.
    pub(crate) fn status(&self, status: DeviceStatus) -> String {
        match status {
            DeviceStatus::Online => self.success(status.to_string()),
            DeviceStatus::Offline | DeviceStatus::Unknown => self.warning(status.to_string()),
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            format!("{}", text.style(style))
        } else {
            text.to_owned()
        }
    }
}
