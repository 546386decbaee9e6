use super::facade::CommandPlan;
use super::{BoundDirection, ChannelCommand, NativeScale, PairedBound, Percent};
use crate::error::CommandError;
use crate::protocol::ChannelId;

const SMARTMODE_KEYWORDS: [&str; 3] = ["OFF", "COOLING", "HEATING"];

const LEARN_MIN: PairedBound = PairedBound {
    channel: ChannelId::FanLearnMinspeed,
    path: "LEARN;MINSPEED;SET",
    scale: NativeScale::Speed,
};
const LEARN_MAX: PairedBound = PairedBound {
    channel: ChannelId::FanLearnMaxspeed,
    path: "LEARN;MAXSPEED;SET",
    scale: NativeScale::Speed,
};
const SPEED_MIN: PairedBound = PairedBound {
    channel: ChannelId::FanSpeedMin,
    path: "FAN;SPD;SET;MIN",
    scale: NativeScale::Speed,
};
const SPEED_MAX: PairedBound = PairedBound {
    channel: ChannelId::FanSpeedMax,
    path: "FAN;SPD;SET;MAX",
    scale: NativeScale::Speed,
};

/// Plans the frame for a fan channel command.
pub(crate) fn plan(channel: ChannelId, command: &ChannelCommand) -> Result<CommandPlan, CommandError> {
    let plan = match (channel, command) {
        (ChannelId::FanPower, ChannelCommand::OnOff(on)) => CommandPlan::switch("FAN;PWR", *on),
        (ChannelId::FanSpeed, ChannelCommand::Percent(percent)) => {
            CommandPlan::scaled("FAN;SPD;SET", *percent, NativeScale::Speed)
        }
        (ChannelId::FanAuto, ChannelCommand::OnOff(on)) => CommandPlan::switch("FAN;AUTO", *on),
        (ChannelId::FanWhoosh, ChannelCommand::OnOff(on)) => CommandPlan::switch("FAN;WHOOSH", *on),
        (ChannelId::FanWintermode, ChannelCommand::OnOff(on)) => {
            CommandPlan::switch("FAN;WINTERMODE", *on)
        }
        (ChannelId::FanSleep, ChannelCommand::OnOff(on)) => CommandPlan::switch("SLEEP;STATE", *on),
        (ChannelId::FanSmartmode, ChannelCommand::Text(mode)) => {
            let keyword = SMARTMODE_KEYWORDS
                .into_iter()
                .find(|keyword| keyword.eq_ignore_ascii_case(mode.trim()))
                .ok_or_else(|| unsupported(channel, command))?;
            CommandPlan::keyword("SMARTMODE;STATE;SET", keyword)
        }
        (ChannelId::FanLearnMinspeed, ChannelCommand::Percent(percent)) => {
            lower_bound(LEARN_MIN, *percent, LEARN_MAX)
        }
        (ChannelId::FanLearnMaxspeed, ChannelCommand::Percent(percent)) => {
            upper_bound(LEARN_MAX, *percent, LEARN_MIN)
        }
        (ChannelId::FanSpeedMin, ChannelCommand::Percent(percent)) => {
            lower_bound(SPEED_MIN, *percent, SPEED_MAX)
        }
        (ChannelId::FanSpeedMax, ChannelCommand::Percent(percent)) => {
            upper_bound(SPEED_MAX, *percent, SPEED_MIN)
        }
        _ => return Err(unsupported(channel, command)),
    };

    Ok(plan)
}

pub(crate) fn lower_bound(own: PairedBound, percent: Percent, partner: PairedBound) -> CommandPlan {
    CommandPlan::bound(own.channel, own.path, percent, partner, BoundDirection::RaiseMax)
}

pub(crate) fn upper_bound(own: PairedBound, percent: Percent, partner: PairedBound) -> CommandPlan {
    CommandPlan::bound(own.channel, own.path, percent, partner, BoundDirection::LowerMin)
}

pub(crate) fn unsupported(channel: ChannelId, command: &ChannelCommand) -> CommandError {
    CommandError::UnsupportedCommand {
        channel,
        command: command.to_string(),
    }
}
