//! Coordinator Errors
//!
//! Faults that end the session surface here, along with outgoing
//! messages too large to frame. Malformed inbound packets and buffer
//! exhaustion are handled where they occur.

use crate::network::descriptor::DescriptorError;
use crate::network::header::HeaderError;
use crate::network::transport::{EventKind, TransportError};

/// Fatal session faults.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// A transport call failed with something other than "nothing waiting".
    #[error("{op} failed: {source}")]
    Transport {
        /// Name of the failing operation.
        op: &'static str,
        /// Transport's report.
        #[source]
        source: TransportError,
    },

    /// A majority of peers stopped responding, or the tie-break could not
    /// pick an authority.
    #[error("session destroyed: quorum lost")]
    SessionDestroyed,

    /// Turns stalled for longer than the give-up threshold.
    #[error("session timed out waiting for peers")]
    TimedOut,

    /// A peer announced an incompatible game descriptor.
    #[error("invalid game descriptor: {0}")]
    InvalidDescriptor(#[from] DescriptorError),

    /// The transport refused an event subscription.
    #[error("registering {kind:?} handler failed: {source}")]
    EventRegistration {
        /// Event kind being registered.
        kind: EventKind,
        /// Transport's report.
        #[source]
        source: TransportError,
    },

    /// An outgoing message does not fit in one packet. Rejected before
    /// anything is sent; the session keeps running.
    #[error("message rejected: {0}")]
    OversizedMessage(#[from] HeaderError),

    /// The session was already terminated.
    #[error("session terminated")]
    Terminated,
}

impl CoordinatorError {
    /// Wrap a transport failure with the operation that produced it.
    pub fn transport(op: &'static str, source: TransportError) -> Self {
        CoordinatorError::Transport { op, source }
    }
}

/// Result alias for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
