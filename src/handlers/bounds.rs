use tracing::debug;

use super::{CommandFacade, Delivery, NativeScale, Percent};
use crate::hw::ChannelValue;
use crate::protocol::ChannelId;

/// Which side of a min/max pair a correction moves.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum BoundDirection {
    /// A new minimum was set; raise the maximum if it is now lower.
    RaiseMax,
    /// A new maximum was set; lower the minimum if it is now higher.
    LowerMin,
}

impl BoundDirection {
    /// Value assumed for a partner bound that has never been reported.
    fn unknown_partner(self) -> Percent {
        match self {
            Self::RaiseMax => Percent::MIN,
            Self::LowerMin => Percent::MAX,
        }
    }

    fn inverts(self, new_value: Percent, partner: Percent) -> bool {
        match self {
            Self::RaiseMax => new_value > partner,
            Self::LowerMin => new_value < partner,
        }
    }
}

/// The partner of a min/max channel and how to command it.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PairedBound {
    pub channel: ChannelId,
    pub path: &'static str,
    pub scale: NativeScale,
}

impl CommandFacade {
    /// Keeps a min/max pair ordered after one side was set to `new_value`.
    ///
    /// When the partner bound would end up on the wrong side, it is moved to
    /// `new_value`: recorded, published, then commanded. Returns `None` when
    /// no correction was needed.
    pub async fn clamp_paired_bound(
        &self,
        new_value: Percent,
        paired: PairedBound,
        direction: BoundDirection,
    ) -> Option<Delivery> {
        let partner = self
            .state()
            .percent(paired.channel)
            .unwrap_or(direction.unknown_partner());
        if !direction.inverts(new_value, partner) {
            return None;
        }

        debug!(
            channel = %paired.channel,
            from = partner.value(),
            to = new_value.value(),
            "Moving paired bound"
        );
        self.record(paired.channel, ChannelValue::Percent(new_value));
        Some(
            self.send_percent(paired.path, new_value, paired.scale)
                .await,
        )
    }
}
