use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SegmentLocation {
    Source,
    Target,
}

impl SegmentLocation {
    pub fn opposite(self) -> Self {
        match self {
            SegmentLocation::Source => SegmentLocation::Target,
            SegmentLocation::Target => SegmentLocation::Source,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentInfo {
    pub text: String,
    pub lang_code: String,
    pub location: SegmentLocation,
}

impl SegmentInfo {
    /// True when the segment holds nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Both sides of a translation row at the moment of interaction.
/// `active` is the side the user touched, `other` its sibling.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SegmentPair {
    pub active: SegmentInfo,
    pub other: SegmentInfo,
}

impl SegmentPair {
    pub fn is_well_formed(&self) -> bool {
        self.active.location != self.other.location
    }

    /// Same two segments with the active side flipped.
    pub fn swapped(&self) -> SegmentPair {
        SegmentPair {
            active: self.other.clone(),
            other: self.active.clone(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum FrontendEvent {
    SelectMonolingualText {
        selected_text: String,
    },
    SelectSegmentText {
        selected_text: String,
        segment_pair: SegmentPair,
    },
    ClickSegment {
        segment_pair: SegmentPair,
    },
}

impl FrontendEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FrontendEvent::SelectMonolingualText { .. } => "selectMonolingualText",
            FrontendEvent::SelectSegmentText { .. } => "selectSegmentText",
            FrontendEvent::ClickSegment { .. } => "clickSegment",
        }
    }

    pub fn segment_pair(&self) -> Option<&SegmentPair> {
        match self {
            FrontendEvent::SelectMonolingualText { .. } => None,
            FrontendEvent::SelectSegmentText { segment_pair, .. } => Some(segment_pair),
            FrontendEvent::ClickSegment { segment_pair } => Some(segment_pair),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FrontendInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct FrontendInfo {
    pub name: String,
}

/// Text picked from the browser context menu; sent on the `contextMenu` channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContextMenuSelection {
    pub selection_text: String,
}

/// A single message on a connection channel.
///
/// On the wire this is a flat object with exactly one of `frontendInit`,
/// `backendInit` or `frontendEvent` present; see [`WireEnvelope`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(try_from = "WireEnvelope", into = "WireEnvelope")]
pub enum Envelope {
    FrontendInit(FrontendInit),
    BackendInit(BackendInit),
    FrontendEvent {
        event: FrontendEvent,
        frontend: Option<FrontendInfo>,
    },
}

impl Envelope {
    pub fn frontend_init(name: impl Into<String>) -> Self {
        Envelope::FrontendInit(FrontendInit {
            frontend_name: Some(name.into()),
        })
    }

    pub fn backend_init(name: impl Into<String>) -> Self {
        Envelope::BackendInit(BackendInit {
            backend_name: Some(name.into()),
        })
    }

    pub fn event(event: FrontendEvent) -> Self {
        Envelope::FrontendEvent {
            event,
            frontend: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::FrontendInit(_) => "frontendInit",
            Envelope::BackendInit(_) => "backendInit",
            Envelope::FrontendEvent { .. } => "frontendEvent",
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope carries no payload")]
    Empty,
    #[error("envelope carries more than one payload")]
    Ambiguous,
}

/// Flat field-presence form of [`Envelope`], as exchanged with pages.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct WireEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_init: Option<FrontendInit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend_init: Option<BackendInit>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend_event: Option<FrontendEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frontend: Option<FrontendInfo>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(raw: WireEnvelope) -> Result<Self, Self::Error> {
        match (raw.frontend_init, raw.backend_init, raw.frontend_event) {
            (Some(init), None, None) => Ok(Envelope::FrontendInit(init)),
            (None, Some(init), None) => Ok(Envelope::BackendInit(init)),
            (None, None, Some(event)) => Ok(Envelope::FrontendEvent {
                event,
                frontend: raw.frontend,
            }),
            (None, None, None) => Err(EnvelopeError::Empty),
            _ => Err(EnvelopeError::Ambiguous),
        }
    }
}

impl From<Envelope> for WireEnvelope {
    fn from(env: Envelope) -> Self {
        match env {
            Envelope::FrontendInit(init) => WireEnvelope {
                frontend_init: Some(init),
                ..WireEnvelope::default()
            },
            Envelope::BackendInit(init) => WireEnvelope {
                backend_init: Some(init),
                ..WireEnvelope::default()
            },
            Envelope::FrontendEvent { event, frontend } => WireEnvelope {
                frontend_event: Some(event),
                frontend,
                ..WireEnvelope::default()
            },
        }
    }
}
