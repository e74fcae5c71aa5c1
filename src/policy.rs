//! Activation policy: green powers the device on immediately, yellow only after a
//! quiet stretch of orange/red intervals. The device transitions `off -> on` at most
//! once per activation; turning it back off is left to an external reset.

use serde::Serialize;

use crate::device::{DeviceState, PowerState, Trigger};
use crate::locator::Located;
use crate::quartiles::{ColorBand, ColoredInterval, ColoredSeries};

pub const DEFAULT_YELLOW_LOOKBACK: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyConfig {
    /// Predecessors that must all be orange/red before a yellow interval triggers.
    pub yellow_lookback: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            yellow_lookback: DEFAULT_YELLOW_LOOKBACK,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    GreenTrigger,
    YellowAfterQuietHistory,
    AlreadyOn,
    Waiting,
    InsufficientHistory,
    NotEligible,
    OutsideInterval,
    TriggerFailed,
}

impl DecisionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            DecisionReason::GreenTrigger => "green_trigger",
            DecisionReason::YellowAfterQuietHistory => "yellow_after_quiet_history",
            DecisionReason::AlreadyOn => "already_on",
            DecisionReason::Waiting => "waiting",
            DecisionReason::InsufficientHistory => "insufficient_history",
            DecisionReason::NotEligible => "not_eligible",
            DecisionReason::OutsideInterval => "outside_interval",
            DecisionReason::TriggerFailed => "trigger_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub triggered: bool,
    pub reason: DecisionReason,
    pub power: PowerState,
    pub index: Option<usize>,
    pub interval: Option<ColoredInterval>,
    /// Trigger failure text; the device state is left untouched when present.
    pub error: Option<String>,
}

impl Decision {
    fn new(reason: DecisionReason, power: PowerState, located: Option<Located<'_>>) -> Self {
        Self {
            triggered: false,
            reason,
            power,
            index: located.map(|l| l.index),
            interval: located.map(|l| *l.interval),
            error: None,
        }
    }
}

enum Verdict {
    Fire(DecisionReason),
    Hold(DecisionReason),
}

fn judge(series: &ColoredSeries, index: usize, color: ColorBand, config: &PolicyConfig) -> Verdict {
    match color {
        ColorBand::Green => Verdict::Fire(DecisionReason::GreenTrigger),
        ColorBand::Yellow => {
            let lookback = config.yellow_lookback;
            if index < lookback {
                return Verdict::Hold(DecisionReason::InsufficientHistory);
            }
            let quiet = series.intervals[index - lookback..index]
                .iter()
                .all(|prev| prev.color.is_low());
            if quiet {
                Verdict::Fire(DecisionReason::YellowAfterQuietHistory)
            } else {
                Verdict::Hold(DecisionReason::Waiting)
            }
        }
        ColorBand::Orange | ColorBand::Red => Verdict::Hold(DecisionReason::NotEligible),
    }
}

/// Applies the policy to an already located interval (`None` = outside coverage).
///
/// Activations serialize on the device's activation lock and re-check the flag once
/// inside it, so concurrent evaluations fire the trigger at most once. The power flag
/// itself is never locked across the trigger call.
pub fn evaluate(
    series: &ColoredSeries,
    located: Option<Located<'_>>,
    device: &DeviceState,
    trigger: &dyn Trigger,
    config: &PolicyConfig,
) -> Decision {
    let Some(current) = located else {
        return Decision::new(DecisionReason::OutsideInterval, device.power(), None);
    };

    if device.power() == PowerState::On {
        return Decision::new(DecisionReason::AlreadyOn, PowerState::On, located);
    }

    let reason = match judge(series, current.index, current.interval.color, config) {
        Verdict::Hold(reason) => {
            tracing::debug!(
                index = current.index,
                color = %current.interval.color,
                reason = reason.as_str(),
                "activation held"
            );
            return Decision::new(reason, device.power(), located);
        }
        Verdict::Fire(reason) => reason,
    };

    let activation = device.begin_activation();
    if device.power() == PowerState::On {
        return Decision::new(DecisionReason::AlreadyOn, PowerState::On, located);
    }

    match trigger.power_on() {
        Ok(()) => {
            device.set_power(PowerState::On);
            drop(activation);
            tracing::info!(
                index = current.index,
                start = %current.interval.interval.start,
                color = %current.interval.color,
                reason = reason.as_str(),
                "device activated"
            );
            trigger.report_status();
            let mut decision = Decision::new(reason, PowerState::On, located);
            decision.triggered = true;
            decision
        }
        Err(err) => {
            drop(activation);
            tracing::warn!(error = %err, reason = reason.as_str(), "device trigger failed");
            let mut decision = Decision::new(DecisionReason::TriggerFailed, device.power(), located);
            decision.error = Some(format!("{err:#}"));
            decision
        }
    }
}
