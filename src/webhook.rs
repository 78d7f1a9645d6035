use axum::http::StatusCode;
use std::fmt;
use tracing::{debug, info, warn};

use crate::challenge::{classify, respond_to_challenge, ChallengeResponse, RequestKind};
use crate::config::Credentials;
use crate::event::{decode_event, DecodeError};
use crate::signature::{unix_now, HeaderSource, SignatureVerifier, VerificationError};
use crate::types::EventEnvelope;

/// What an authenticated request turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Challenge(ChallengeResponse),
    Event(Box<EventEnvelope>),
}

#[derive(Debug)]
pub enum WebhookError {
    Unauthorized(VerificationError),
    Decode(DecodeError),
}

impl WebhookError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            WebhookError::Decode(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebhookError::Unauthorized(e) => write!(f, "Unauthorized request: {}", e),
            WebhookError::Decode(e) => write!(f, "Undecodable request: {}", e),
        }
    }
}

impl std::error::Error for WebhookError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebhookError::Unauthorized(e) => Some(e),
            WebhookError::Decode(e) => Some(e),
        }
    }
}

impl From<VerificationError> for WebhookError {
    fn from(e: VerificationError) -> Self {
        WebhookError::Unauthorized(e)
    }
}

impl From<DecodeError> for WebhookError {
    fn from(e: DecodeError) -> Self {
        WebhookError::Decode(e)
    }
}

/// Verify, classify and decode one inbound delivery.
///
/// Holds no mutable state, so a single receiver can be shared by any number
/// of concurrent requests.
#[derive(Clone)]
pub struct WebhookReceiver {
    verifier: SignatureVerifier,
}

impl WebhookReceiver {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            verifier: SignatureVerifier::new(credentials),
        }
    }

    pub fn receive<H>(&self, headers: &H, raw_body: &[u8]) -> Result<Delivery, WebhookError>
    where
        H: HeaderSource + ?Sized,
    {
        self.receive_at(headers, raw_body, unix_now())
    }

    pub fn receive_at<H>(
        &self,
        headers: &H,
        raw_body: &[u8],
        now_secs: u64,
    ) -> Result<Delivery, WebhookError>
    where
        H: HeaderSource + ?Sized,
    {
        // Nothing in the body is looked at before the signature checks out
        if let Err(e) = self.verifier.check_at(headers, raw_body, now_secs) {
            warn!("Rejecting Slack request: {}", e);
            return Err(e.into());
        }

        match classify(raw_body)? {
            RequestKind::Challenge(token) => {
                info!("Received URL verification challenge");
                Ok(Delivery::Challenge(respond_to_challenge(token)))
            }
            RequestKind::Event => {
                let envelope = decode_event(raw_body)?;
                debug!(
                    "Decoded {} delivery {} ({})",
                    envelope.envelope_type, envelope.event_id, envelope.event.event_type
                );
                Ok(Delivery::Event(Box::new(envelope)))
            }
        }
    }
}
