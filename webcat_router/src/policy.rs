use crate::protocol::{FrontendEvent, SegmentLocation};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// What a click on the target side of a row should search for.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TargetClickSearchMode {
    /// Search the source segment instead.
    Source,
    /// Search the source segment while the target is still blank.
    #[default]
    SourceIfEmpty,
    /// Search the clicked target segment as-is.
    Target,
    /// Ignore target clicks.
    Off,
}

impl FromStr for TargetClickSearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "source" => Ok(Self::Source),
            "sourceIfEmpty" => Ok(Self::SourceIfEmpty),
            "target" => Ok(Self::Target),
            "off" => Ok(Self::Off),
            other => Err(format!(
                "unknown target click search mode {other:?} (expected source, sourceIfEmpty, target or off)"
            )),
        }
    }
}

impl fmt::Display for TargetClickSearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Source => "source",
            Self::SourceIfEmpty => "sourceIfEmpty",
            Self::Target => "target",
            Self::Off => "off",
        })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchOptions {
    pub target_click_search_mode: TargetClickSearchMode,
    pub target_select_search_enabled: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            target_click_search_mode: TargetClickSearchMode::SourceIfEmpty,
            target_select_search_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TargetClickDisabled,
    TargetSelectDisabled,
    MalformedSegmentPair,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DropReason::TargetClickDisabled => "target click search disabled",
            DropReason::TargetSelectDisabled => "target select search disabled",
            DropReason::MalformedSegmentPair => "segment pair sides share a location",
        })
    }
}

/// Applies the option table to one event.
///
/// Returns the event to forward, borrowed when it passes through untouched,
/// or the reason it was dropped. The input is never modified.
pub fn apply<'a>(
    options: &SearchOptions,
    event: &'a FrontendEvent,
) -> Result<Cow<'a, FrontendEvent>, DropReason> {
    if event.segment_pair().is_some_and(|p| !p.is_well_formed()) {
        return Err(DropReason::MalformedSegmentPair);
    }

    match event {
        FrontendEvent::SelectMonolingualText { .. } => Ok(Cow::Borrowed(event)),
        FrontendEvent::SelectSegmentText { segment_pair, .. } => {
            if segment_pair.active.location == SegmentLocation::Target
                && !options.target_select_search_enabled
            {
                return Err(DropReason::TargetSelectDisabled);
            }
            Ok(Cow::Borrowed(event))
        }
        FrontendEvent::ClickSegment { segment_pair } => {
            if segment_pair.active.location != SegmentLocation::Target {
                return Ok(Cow::Borrowed(event));
            }
            let force_source = match options.target_click_search_mode {
                TargetClickSearchMode::Off => return Err(DropReason::TargetClickDisabled),
                TargetClickSearchMode::Target => false,
                TargetClickSearchMode::Source => true,
                TargetClickSearchMode::SourceIfEmpty => segment_pair.active.is_blank(),
            };
            if force_source {
                Ok(Cow::Owned(FrontendEvent::ClickSegment {
                    segment_pair: segment_pair.swapped(),
                }))
            } else {
                Ok(Cow::Borrowed(event))
            }
        }
    }
}
