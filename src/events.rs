//! Event types for Hydrogen

use crate::web::RequestId;

#[derive(Debug, Clone, PartialEq)]
pub enum HydrogenEvent {
    RequestCompleted {
        request_id: RequestId,
        status: u16,
    },
    RequestFailed {
        request_id: RequestId,
        error: String,
    },
    CallbackPanicked {
        request_id: RequestId,
    },
    ItemStarted {
        key: String,
    },
    ItemRemoved {
        key: String,
    },
}

impl HydrogenEvent {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::RequestCompleted { request_id, .. }
            | Self::RequestFailed { request_id, .. }
            | Self::CallbackPanicked { request_id } => Some(*request_id),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&str> {
        match self {
            Self::ItemStarted { key } | Self::ItemRemoved { key } => Some(key.as_str()),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed { .. } | Self::CallbackPanicked { .. }
        )
    }

    pub fn is_audio_event(&self) -> bool {
        matches!(self, Self::ItemStarted { .. } | Self::ItemRemoved { .. })
    }
}
