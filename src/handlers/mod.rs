mod bounds;
mod facade;
mod fan;
mod frame_codec;
mod light;
mod scaling;

pub use self::bounds::{BoundDirection, PairedBound};
pub use self::facade::{ChannelCommand, CommandFacade, Delivery};
pub use self::frame_codec::{FrameCodec, FrameCodecError, InboundFrame};
pub use self::scaling::{NativeScale, Percent, PercentError};
