use axum::http::StatusCode;
use serde_json::Value;

use crate::event::{parse_object, DecodeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// One-time endpoint ownership handshake carrying the token to echo.
    Challenge(String),
    Event,
}

/// Tells a `url_verification` handshake apart from a normal event delivery.
///
/// A top-level `challenge` string wins over everything else in the body. A
/// `challenge` that is present but not a string is reported as malformed.
pub fn classify(raw_body: &[u8]) -> Result<RequestKind, DecodeError> {
    let object = parse_object(raw_body)?;
    match object.get("challenge") {
        Some(Value::String(token)) => Ok(RequestKind::Challenge(token.clone())),
        Some(_) => Err(DecodeError::InvalidChallenge),
        None => Ok(RequestKind::Event),
    }
}

/// `(is_challenge, token)` view of [`classify`].
pub fn is_challenge_request(raw_body: &[u8]) -> Result<(bool, Option<String>), DecodeError> {
    Ok(match classify(raw_body)? {
        RequestKind::Challenge(token) => (true, Some(token)),
        RequestKind::Event => (false, None),
    })
}

/// Reply to a challenge: the bare token as `text/plain` with a 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
}

pub fn respond_to_challenge(token: impl Into<String>) -> ChallengeResponse {
    ChallengeResponse {
        status: StatusCode::OK,
        content_type: "text/plain",
        body: token.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_challenge() {
        assert_eq!(
            is_challenge_request(br#"{"challenge":"abc123"}"#).unwrap(),
            (true, Some("abc123".to_string()))
        );
        assert_eq!(
            classify(br#"{"token":"t","challenge":"xyz","type":"url_verification"}"#).unwrap(),
            RequestKind::Challenge("xyz".to_string())
        );
    }

    #[test]
    fn event_delivery_is_not_a_challenge() {
        let body = br#"{"type":"event_callback","event":{"type":"app_mention","text":"hi"}}"#;
        assert_eq!(is_challenge_request(body).unwrap(), (false, None));
    }

    #[test]
    fn challenge_takes_precedence_over_event_fields() {
        let body = br#"{"type":"event_callback","event":{"type":"message"},"challenge":"c"}"#;
        assert_eq!(classify(body).unwrap(), RequestKind::Challenge("c".to_string()));
    }

    #[test]
    fn nested_challenge_field_is_ignored() {
        let body = br#"{"type":"event_callback","event":{"challenge":"nope"}}"#;
        assert_eq!(classify(body).unwrap(), RequestKind::Event);
    }

    #[test]
    fn non_string_challenge_is_malformed() {
        let bodies: [&[u8]; 3] = [
            br#"{"challenge":42}"#,
            br#"{"challenge":null}"#,
            br#"{"challenge":{"token":"x"}}"#,
        ];
        for body in bodies {
            assert!(matches!(classify(body), Err(DecodeError::InvalidChallenge)));
        }
    }

    #[test]
    fn malformed_json_is_an_error_not_an_event() {
        assert!(matches!(classify(b"{challenge"), Err(DecodeError::Json(_))));
        assert!(matches!(
            classify(br#"["challenge"]"#),
            Err(DecodeError::NotAnObject)
        ));
    }

    #[test]
    fn response_echoes_token_verbatim() {
        let response = respond_to_challenge("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P");
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.content_type, "text/plain");
        assert_eq!(
            response.body,
            "3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"
        );
    }
}
