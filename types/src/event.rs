//! Votable events: externally observed facts that may become resolutions.

use serde::{Deserialize, Serialize};

use crate::ResolutionId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VotableEvent {
    /// Registered resolution type name.
    pub event_type: String,
    /// Opaque payload interpreted by the type's resolve function.
    pub body: Vec<u8>,
}

impl VotableEvent {
    pub fn new(event_type: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: event_type.into(),
            body: body.into(),
        }
    }

    pub fn id(&self) -> ResolutionId {
        ResolutionId::derive(&self.event_type, &self.body)
    }
}
