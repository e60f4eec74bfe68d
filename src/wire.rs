use serde::Deserialize;

/// Error body recognized on non-success responses: `{"message": .., "code": ..}`.
///
/// Both fields must be strings when present; a body of any other shape is
/// not an envelope.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorEnvelope {
    /// Parses `body`, returning `None` unless it carries a non-empty message.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str::<Self>(body)
            .ok()
            .filter(|envelope| envelope.message.as_deref().is_some_and(|m| !m.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorEnvelope;

    #[test]
    fn parses_message_and_code() {
        let envelope = ErrorEnvelope::parse(r#"{"message":"not found","code":"404"}"#)
            .expect("envelope must parse");
        assert_eq!(envelope.message.as_deref(), Some("not found"));
        assert_eq!(envelope.code.as_deref(), Some("404"));
    }

    #[test]
    fn code_is_optional() {
        let envelope =
            ErrorEnvelope::parse(r#"{"message":"bad","extra":[1]}"#).expect("envelope must parse");
        assert_eq!(envelope.code, None);
    }

    #[test]
    fn non_string_code_is_not_an_envelope() {
        assert!(ErrorEnvelope::parse(r#"{"message":"bad","code":17}"#).is_none());
    }

    #[test]
    fn missing_or_empty_message_is_rejected() {
        assert!(ErrorEnvelope::parse(r#"{"code":"E1"}"#).is_none());
        assert!(ErrorEnvelope::parse(r#"{"message":""}"#).is_none());
        assert!(ErrorEnvelope::parse("upstream exploded").is_none());
        assert!(ErrorEnvelope::parse("").is_none());
    }
}
