use std::fmt;

use crate::{CardOperation, FrameError};

/// Server-side signals sent as bare string payloads on the subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlSignal {
    Reload,
    OldCardsLoadingEnd,
    BusinessConfigChange,
    UserConfigChange,
    MonitoringConfigChange,
    BusinessDataChange,
    DisconnectUserDueToNewConnection,
}

impl ControlSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlSignal::Reload => "RELOAD",
            ControlSignal::OldCardsLoadingEnd => "OLD_CARDS_LOADING_END",
            ControlSignal::BusinessConfigChange => "BUSINESS_CONFIG_CHANGE",
            ControlSignal::UserConfigChange => "USER_CONFIG_CHANGE",
            ControlSignal::MonitoringConfigChange => "MONITORING_CONFIG_CHANGE",
            ControlSignal::BusinessDataChange => "BUSINESS_DATA_CHANGE",
            ControlSignal::DisconnectUserDueToNewConnection => "DISCONNECT_USER_DUE_TO_NEW_CONNECTION",
        }
    }

    fn from_payload(payload: &str) -> Option<Self> {
        Some(match payload {
            "RELOAD" => ControlSignal::Reload,
            "OLD_CARDS_LOADING_END" => ControlSignal::OldCardsLoadingEnd,
            "BUSINESS_CONFIG_CHANGE" => ControlSignal::BusinessConfigChange,
            "USER_CONFIG_CHANGE" => ControlSignal::UserConfigChange,
            "MONITORING_CONFIG_CHANGE" => ControlSignal::MonitoringConfigChange,
            "BUSINESS_DATA_CHANGE" => ControlSignal::BusinessDataChange,
            "DISCONNECT_USER_DUE_TO_NEW_CONNECTION" => ControlSignal::DisconnectUserDueToNewConnection,
            _ => return None,
        })
    }
}

impl fmt::Display for ControlSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// One text payload received on the card subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Heartbeat,
    Init,
    Control(ControlSignal),
    Operation(Box<CardOperation>),
}

impl StreamFrame {
    pub const HEARTBEAT: &'static str = "HEARTBEAT";
    pub const INIT: &'static str = "INIT";

    /// Classify a payload. Sentinels are matched exactly, everything else must be a JSON operation.
    pub fn parse(payload: &str) -> Result<Self, FrameError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(FrameError::Empty);
        }
        match payload {
            Self::HEARTBEAT => return Ok(StreamFrame::Heartbeat),
            Self::INIT => return Ok(StreamFrame::Init),
            _ => {}
        }
        if let Some(signal) = ControlSignal::from_payload(payload) {
            return Ok(StreamFrame::Control(signal));
        }
        serde_json::from_str::<CardOperation>(payload)
            .map(|op| StreamFrame::Operation(Box::new(op)))
            .map_err(|source| FrameError::Malformed { excerpt: FrameError::excerpt(payload), source })
    }
}
