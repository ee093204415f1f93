use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;

/// Correlation token matching an asynchronous response to its request.
///
/// Ids are process-local, monotonically increasing, and never reused while a
/// call is still pending.
pub type RequestId = u64;

/// Methods understood by the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Transcribe a PCM file with the Parakeet model
    Transcribe,
    /// Semantically correct a transcription with the mlx-lm model
    Correct,
    /// Preload a model ahead of first use
    Warmup,
    /// Liveness probe
    Ping,
}

impl Method {
    /// Wire name of the method
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcribe => "transcribe",
            Self::Correct => "correct",
            Self::Warmup => "warmup",
            Self::Ping => "ping",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request envelope, a single JSON object per line on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct DaemonRequest {
    /// Correlation id, unique per in-flight call
    pub id: RequestId,
    /// Operation to perform
    pub method: Method,
    /// Method parameters (primitive values keyed by name)
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// One response envelope decoded from worker output
#[derive(Debug, Clone)]
pub struct DaemonResponse {
    /// Correlation id echoed from the request
    pub id: RequestId,
    /// Whether the worker completed the call
    pub success: bool,
    /// Payload on success (text, or an object carrying a `text` field)
    pub result: Option<Value>,
    /// Failure message on error, verbatim from the worker
    pub error: Option<String>,
}

/// Why a worker output line failed to decode
#[derive(Debug)]
pub struct DecodeError {
    /// Correlation id, when one could still be extracted from the payload
    pub id: Option<RequestId>,
    /// The offending line, verbatim
    pub raw: String,
}

/// Encode a request as a single wire line (no trailing newline)
#[must_use]
pub fn encode_request(request: &DaemonRequest) -> String {
    let mut envelope = Map::new();
    envelope.insert("id".to_owned(), Value::from(request.id));
    envelope.insert("method".to_owned(), Value::from(request.method.as_str()));
    envelope.insert("params".to_owned(), Value::Object(request.params.clone()));
    Value::Object(envelope).to_string()
}

/// Decode one worker output line into a response envelope
///
/// Requires a numeric `id` and a boolean `success`; anything else is a
/// [`DecodeError`], surfaced upward as an invalid-response failure. The
/// `error` field may be a bare string or an object with a `message` key.
///
/// # Errors
/// Returns [`DecodeError`] when the line is not JSON or a required field is
/// absent or mistyped. The error carries the id when one was extractable so
/// the matching pending call can still be failed.
pub fn decode_response(line: &str) -> Result<DaemonResponse, DecodeError> {
    let Ok(value) = serde_json::from_str::<Value>(line) else {
        return Err(DecodeError {
            id: None,
            raw: line.to_owned(),
        });
    };

    let Some(id) = value.get("id").and_then(Value::as_u64) else {
        return Err(DecodeError {
            id: None,
            raw: line.to_owned(),
        });
    };

    let Some(success) = value.get("success").and_then(Value::as_bool) else {
        return Err(DecodeError {
            id: Some(id),
            raw: line.to_owned(),
        });
    };

    let result = value.get("result").filter(|v| !v.is_null()).cloned();
    let error = value.get("error").and_then(error_text);

    Ok(DaemonResponse {
        id,
        success,
        result,
        error,
    })
}

/// The worker reports errors as a bare string or `{"message": ...}`.
fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Object(fields) => fields
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: RequestId, method: Method) -> DaemonRequest {
        let mut params = Map::new();
        params.insert("repo".to_owned(), Value::from("some/model"));
        DaemonRequest { id, method, params }
    }

    #[test]
    fn test_encode_produces_single_line_envelope() {
        let line = encode_request(&request(7, Method::Transcribe));
        assert!(!line.contains('\n'));

        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "transcribe");
        assert_eq!(value["params"]["repo"], "some/model");
    }

    #[test]
    fn test_encode_ping_has_empty_params() {
        let line = encode_request(&DaemonRequest {
            id: 1,
            method: Method::Ping,
            params: Map::new(),
        });
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "ping");
        assert!(value["params"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_encoded_request_round_trips_through_serde() {
        let line = encode_request(&request(42, Method::Correct));
        let decoded: DaemonRequest = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded.id, 42);
        assert_eq!(decoded.method, Method::Correct);
        assert_eq!(decoded.params["repo"], "some/model");
    }

    #[test]
    fn test_decode_success_envelope() {
        let response =
            decode_response(r#"{"id": 3, "success": true, "result": "hello", "error": null}"#)
                .unwrap();
        assert_eq!(response.id, 3);
        assert!(response.success);
        assert_eq!(response.result, Some(Value::from("hello")));
        assert_eq!(response.error, None);
    }

    #[test]
    fn test_decode_failure_envelope_with_string_error() {
        let response =
            decode_response(r#"{"id": 4, "success": false, "error": "model exploded"}"#).unwrap();
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("model exploded"));
    }

    #[test]
    fn test_decode_failure_envelope_with_object_error() {
        let response =
            decode_response(r#"{"id": 4, "success": false, "error": {"message": "boom"}}"#)
                .unwrap();
        assert_eq!(response.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_decode_missing_id_fails_without_id() {
        let failure = decode_response(r#"{"success": true, "result": "x"}"#).unwrap_err();
        assert_eq!(failure.id, None);
    }

    #[test]
    fn test_decode_missing_success_fails_with_id() {
        let failure = decode_response(r#"{"id": 9, "result": "x"}"#).unwrap_err();
        assert_eq!(failure.id, Some(9));
    }

    #[test]
    fn test_decode_non_boolean_success_fails_with_id() {
        let failure = decode_response(r#"{"id": 9, "success": "ok"}"#).unwrap_err();
        assert_eq!(failure.id, Some(9));
        assert!(failure.raw.contains("\"ok\""));
    }

    #[test]
    fn test_decode_non_json_fails() {
        let failure = decode_response("Loading model checkpoint 3/5...").unwrap_err();
        assert_eq!(failure.id, None);
        assert_eq!(failure.raw, "Loading model checkpoint 3/5...");
    }

    #[test]
    fn test_decode_null_result_becomes_none() {
        let response = decode_response(r#"{"id": 1, "success": true, "result": null}"#).unwrap();
        assert_eq!(response.result, None);
    }

    #[test]
    fn test_decode_object_result_is_preserved() {
        let response =
            decode_response(r#"{"id": 1, "success": true, "result": {"text": "hi", "lang": "en"}}"#)
                .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["text"], "hi");
    }
}
