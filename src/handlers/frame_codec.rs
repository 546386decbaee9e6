use std::fmt;

use thiserror::Error;

const FRAME_OPEN: char = '<';
const FRAME_CLOSE: char = '>';
const REPLY_OPEN: char = '(';
const FIELD_SEPARATOR: char = ';';

/// Errors returned by frame encoding and decoding.
#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum FrameCodecError {
    /// The outbound frame contains characters the fan cannot receive.
    #[error("frame text is not ASCII: `{text}`")]
    NonAscii { text: String },
    /// The inbound token carries no `(` frame start.
    #[error("inbound token has no frame start: `{token}`")]
    MissingFrameStart { token: String },
}

/// Decoded inbound frame: ordered fields, the first being the addressee.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InboundFrame {
    fields: Vec<String>,
}

impl InboundFrame {
    /// Returns all fields in wire order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the field at `index`, if present.
    #[must_use]
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns whether the frame has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the addressing token (MAC or label).
    #[must_use]
    pub fn addressee(&self) -> &str {
        self.field(0).unwrap_or_default()
    }
}

impl fmt::Display for InboundFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.fields.join(";"))
    }
}

/// Encoder and decoder for the fan's ASCII frames.
pub struct FrameCodec;

impl FrameCodec {
    /// Builds a `;PATH;VALUE` command fragment.
    ///
    /// ```
    /// use baf::FrameCodec;
    ///
    /// assert_eq!(";FAN;SPD;SET;3", FrameCodec::command_fragment("FAN;SPD;SET", 3));
    /// ```
    #[must_use]
    pub fn command_fragment(path: &str, value: impl fmt::Display) -> String {
        format!("{FIELD_SEPARATOR}{path}{FIELD_SEPARATOR}{value}")
    }

    /// Encodes an outbound `<mac;fragment>` frame.
    ///
    /// # Errors
    ///
    /// Returns an error when the MAC or fragment contains non-ASCII text.
    ///
    /// ```
    /// use baf::FrameCodec;
    ///
    /// let frame = FrameCodec::encode("20:F8:5E:00:00:01", ";FAN;PWR;ON")?;
    /// assert_eq!(b"<20:F8:5E:00:00:01;FAN;PWR;ON>".to_vec(), frame);
    /// # Ok::<(), baf::FrameCodecError>(())
    /// ```
    pub fn encode(mac: &str, fragment: &str) -> Result<Vec<u8>, FrameCodecError> {
        let text = format!("{FRAME_OPEN}{mac}{fragment}{FRAME_CLOSE}");
        if !text.is_ascii() {
            return Err(FrameCodecError::NonAscii { text });
        }

        Ok(text.into_bytes())
    }

    /// Decodes one `)`-delimited token into its fields.
    ///
    /// Everything before the first `(` is ignored, as is anything after a
    /// line break. Trailing empty fields are dropped.
    ///
    /// # Errors
    ///
    /// Returns an error when the token has no `(`.
    pub fn decode(token: &str) -> Result<InboundFrame, FrameCodecError> {
        let Some((_, body)) = token.split_once(REPLY_OPEN) else {
            return Err(FrameCodecError::MissingFrameStart {
                token: token.to_owned(),
            });
        };
        let body = body.lines().next().unwrap_or_default();
        let mut fields: Vec<String> = body.split(FIELD_SEPARATOR).map(str::to_owned).collect();
        while fields.len() > 1 && fields.last().is_some_and(String::is_empty) {
            fields.pop();
        }

        Ok(InboundFrame { fields })
    }
}
