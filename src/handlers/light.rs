use super::ChannelCommand;
use super::NativeScale;
use super::PairedBound;
use super::facade::CommandPlan;
use super::fan::{lower_bound, unsupported, upper_bound};
use crate::error::CommandError;
use crate::hw::LastKnownState;
use crate::protocol::ChannelId;

const LIGHT_PRESENT: &str = "PRESENT";
const LIGHT_COLOR: &str = "COLOR";

const LEVEL_MIN: PairedBound = PairedBound {
    channel: ChannelId::LightLevelMin,
    path: "LIGHT;LEVEL;MIN",
    scale: NativeScale::Level,
};
const LEVEL_MAX: PairedBound = PairedBound {
    channel: ChannelId::LightLevelMax,
    path: "LIGHT;LEVEL;MAX",
    scale: NativeScale::Level,
};

/// Plans the frame for a light channel command.
///
/// Light commands need the fan to have reported an installed light; hue
/// also needs a colour-capable light.
pub(crate) fn plan(
    channel: ChannelId,
    command: &ChannelCommand,
    state: &LastKnownState,
) -> Result<CommandPlan, CommandError> {
    if !state.text_equals(ChannelId::LightPresent, LIGHT_PRESENT) {
        return Err(CommandError::LightNotPresent);
    }
    if channel == ChannelId::LightHue && !state.text_equals(ChannelId::LightColor, LIGHT_COLOR) {
        return Err(CommandError::ColourNotSupported);
    }

    let plan = match (channel, command) {
        (ChannelId::LightPower, ChannelCommand::OnOff(on)) => CommandPlan::switch("LIGHT;PWR", *on),
        (ChannelId::LightLevel, ChannelCommand::Percent(percent)) => {
            CommandPlan::scaled("LIGHT;LEVEL;SET", *percent, NativeScale::Level)
        }
        (ChannelId::LightHue, ChannelCommand::Percent(percent)) => {
            CommandPlan::scaled("LIGHT;COLOR;TEMP;VALUE;SET", *percent, NativeScale::Hue)
        }
        (ChannelId::LightAuto, ChannelCommand::OnOff(on)) => CommandPlan::switch("LIGHT;AUTO", *on),
        (ChannelId::LightSmarter, ChannelCommand::OnOff(on)) => {
            CommandPlan::switch("LIGHT;SMART", *on)
        }
        (ChannelId::LightLevelMin, ChannelCommand::Percent(percent)) => {
            lower_bound(LEVEL_MIN, *percent, LEVEL_MAX)
        }
        (ChannelId::LightLevelMax, ChannelCommand::Percent(percent)) => {
            upper_bound(LEVEL_MAX, *percent, LEVEL_MIN)
        }
        _ => return Err(unsupported(channel, command)),
    };

    Ok(plan)
}
