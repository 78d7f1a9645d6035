//! Authenticates and decodes Slack Events API deliveries.
//!
//! The flow for one inbound request, independent of the HTTP stack in use:
//!
//! 1. [`SignatureVerifier`] checks `X-Slack-Signature` against the raw body
//!    and rejects anything outside a five minute window.
//! 2. [`classify`] separates the `url_verification` handshake from event
//!    deliveries; [`respond_to_challenge`] builds the echo reply.
//! 3. [`decode_event`] turns the body into an [`EventEnvelope`].
//!
//! [`WebhookReceiver`] runs all three. Replies go back out through a
//! [`Dispatcher`], normally the [`SlackWebClient`].

mod challenge;
mod config;
mod event;
mod signature;
mod slack;
mod types;
mod webhook;

pub use challenge::{
    classify, is_challenge_request, respond_to_challenge, ChallengeResponse, RequestKind,
};
pub use config::{ConfigError, Credentials, ServerConfig};
pub use event::{decode_event, DecodeError, Span, EVENT_CALLBACK};
pub use signature::{
    compute_signature, HeaderSource, SignatureVerifier, VerificationError, MAX_CLOCK_SKEW_SECS,
    SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
pub use slack::{Dispatcher, SlackError, SlackWebClient, UserProfile, DEFAULT_API_BASE};
pub use types::{Authorization, Block, Element, EventEnvelope, SubElement, SubEvent};
pub use webhook::{Delivery, WebhookError, WebhookReceiver};
