//! Identity extraction from signed tokens and JSON bodies
//!
//! Tokens are decoded, never verified. Replayed traffic carries tokens that
//! have long expired, and the origin server validated them when the traffic
//! was captured.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use serde_json::{Map, Value};

use crate::{Result, TokenSwapError};

/// Claims holding the numeric subject, in priority order
pub const SUBJECT_CLAIMS: [&str; 2] = ["userID", "user_id"];

const LENIENT: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT);
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT);

/// Decode the claims segment of a `header.claims.signature` token.
///
/// # Errors
///
/// Returns `IdentityNotFound` if the token is not three segments or the
/// middle segment is not base64-encoded JSON object
pub fn claims_from_token(token: &str) -> Result<Map<String, Value>> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    if segments.len() != 3 {
        return Err(TokenSwapError::IdentityNotFound);
    }

    let decoded = URL_SAFE_LENIENT
        .decode(segments[1])
        .or_else(|_| STANDARD_LENIENT.decode(segments[1]))
        .map_err(|_| TokenSwapError::IdentityNotFound)?;

    match serde_json::from_slice(&decoded) {
        Ok(Value::Object(claims)) => Ok(claims),
        _ => Err(TokenSwapError::IdentityNotFound),
    }
}

/// Subject identity of a token as a decimal string.
///
/// # Errors
///
/// Returns `IdentityNotFound` if the token cannot be decoded or has none of
/// the [`SUBJECT_CLAIMS`]
pub fn identity_from_token(token: &str) -> Result<String> {
    let claims = claims_from_token(token)?;
    identity_from_claims(&claims).ok_or(TokenSwapError::IdentityNotFound)
}

/// Subject identity from already decoded claims
#[must_use]
pub fn identity_from_claims(claims: &Map<String, Value>) -> Option<String> {
    SUBJECT_CLAIMS
        .iter()
        .find_map(|claim| claims.get(*claim).and_then(render_identity))
}

/// Fractional subjects are truncated toward zero, never rounded.
#[allow(clippy::cast_possible_truncation)]
fn render_identity(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else if let Some(u) = n.as_u64() {
                Some(u.to_string())
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .map(|f| (f.trunc() as i64).to_string())
            }
        }
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// A single claim of a token, e.g. the lesson context of a session token.
///
/// # Errors
///
/// Returns `IdentityNotFound` if the token cannot be decoded, `PathNotFound`
/// if the claim is absent or null
pub fn claim_from_token(token: &str, claim: &str) -> Result<Value> {
    let mut claims = claims_from_token(token)?;
    match claims.remove(claim) {
        Some(Value::Null) | None => Err(TokenSwapError::PathNotFound(claim.to_string())),
        Some(value) => Ok(value),
    }
}

fn path_label<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(".")
}

fn parse_body<S: AsRef<str>>(body: &[u8], path: &[S]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|_| TokenSwapError::PathNotFound(path_label(path)))
}

/// String at `path` inside a JSON document.
///
/// # Errors
///
/// Returns `PathNotFound` if the body is not JSON or the path does not end
/// at a string
pub fn json_path_str<S: AsRef<str>>(body: &[u8], path: &[S]) -> Result<String> {
    let doc = parse_body(body, path)?;

    path.iter()
        .try_fold(&doc, |value, key| value.get(key.as_ref()))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TokenSwapError::PathNotFound(path_label(path)))
}

/// Integers at `path`, fanning out over every array met along the way.
///
/// `data → problems → prob` over `{"data":{"problems":[{"prob":1},{"prob":2}]}}`
/// yields `[1, 2]`. Array elements lacking the remaining path are skipped.
///
/// # Errors
///
/// Returns `PathNotFound` if the body is not JSON or a key outside any array
/// is missing
pub fn json_path_ints<S: AsRef<str>>(body: &[u8], path: &[S]) -> Result<Vec<i64>> {
    let doc = parse_body(body, path)?;
    let mut found = Vec::new();

    if collect_ints(&doc, path, false, &mut found) {
        Ok(found)
    } else {
        Err(TokenSwapError::PathNotFound(path_label(path)))
    }
}

#[allow(clippy::cast_possible_truncation)]
fn collect_ints<S: AsRef<str>>(
    value: &Value,
    path: &[S],
    in_array: bool,
    out: &mut Vec<i64>,
) -> bool {
    if let Value::Array(items) = value {
        for item in items {
            collect_ints(item, path, true, out);
        }
        return true;
    }

    match path.split_first() {
        None => {
            let int = value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f.trunc() as i64));
            match int {
                Some(i) => {
                    out.push(i);
                    true
                }
                None => in_array,
            }
        }
        Some((key, rest)) => match value.get(key.as_ref()) {
            Some(child) => collect_ints(child, rest, in_array, out),
            None => in_array,
        },
    }
}

/// Bearer token found in a response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    /// Raw token text
    pub token: String,
    /// Identity decoded from the token, if decodable
    pub identity: Option<String>,
}

/// Find the bearer token at `path` and decode its identity.
///
/// # Errors
///
/// Returns `PathNotFound` if no string exists at `path`
pub fn access_token_from_body<S: AsRef<str>>(body: &[u8], path: &[S]) -> Result<AccessToken> {
    let token = json_path_str(body, path)?;
    let identity = identity_from_token(&token).ok();
    Ok(AccessToken { token, identity })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Session token from captured traffic; subject `userID` 447455
    pub(crate) const SESSION_TOKEN: &str = "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJfdG9rZW5FeHBpcmVUaW1lIjo1NDAwLCJjb25uZWN0ZWRBdCI6IjIwMjEtMDktMDFUMDQ6MTI6MTcuODQyWiIsInVzZXJJRCI6NDQ3NDU1LCJ1c2VyTmFtZSI6IiIsImV4dGVybmFsQWNjb3VudCI6bnVsbCwiY3VycmljdWx1bV9pZCI6OCwiY3VycmljdWx1bV90eXBlIjoiVkFDQVRJT04iLCJkaWZmaWN1bHR5IjoyNSwicGF5bWVudENoZWNrIjpmYWxzZSwidG9rZW5fYWNjb3VudCI6ImVsZTQydjkwIiwicHJvZHVjdFR5cGUiOiJFTEVNIiwic3RhbXAiOiJzaGExJGE2OTRjZGUxJDEkYjIzZGM2MTZkZjY3M2IwYmVkZTRmMWRlYjNhNmNhNjM5MDkyYjAzMCIsImNsaWVudFZlcnNpb24iOjEwMjAwMDMsImFwaV92ZXJzaW9uIjoidjIiLCJ1c2VyVHlwZSI6IktOT1dSRV9URVNUIiwidGljayI6MSwiaWF0IjoxNjMwNDY5NTM3LCJleHAiOjE2MzA0NzQ5Mzd9.dbakyQrw-TdXZK_C2WHoIGIiWfye0YE4P61iCZgAX7g";

    /// Build an unsigned token around arbitrary claims
    pub(crate) fn token_with_claims(claims: &Value) -> String {
        let header = URL_SAFE_LENIENT.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_LENIENT.encode(claims.to_string());
        format!("{header}.{payload}.c2lnbmF0dXJl")
    }

    #[test]
    fn test_identity_from_captured_token() {
        assert_eq!(identity_from_token(SESSION_TOKEN).unwrap(), "447455");
    }

    #[test]
    fn test_identity_user_id_claim() {
        let token = token_with_claims(&serde_json::json!({"user_id": 12, "account": "x"}));
        assert_eq!(identity_from_token(&token).unwrap(), "12");
    }

    #[test]
    fn test_identity_claim_priority() {
        let token = token_with_claims(&serde_json::json!({"user_id": 2, "userID": 1}));
        assert_eq!(identity_from_token(&token).unwrap(), "1");

        let token = token_with_claims(&serde_json::json!({"user_id": 2, "userID": null}));
        assert_eq!(identity_from_token(&token).unwrap(), "2");
    }

    #[test]
    fn test_identity_truncates_floats() {
        let token = token_with_claims(&serde_json::json!({"userID": 447_455.9}));
        assert_eq!(identity_from_token(&token).unwrap(), "447455");
    }

    #[test]
    fn test_identity_not_found() {
        let token = token_with_claims(&serde_json::json!({"account": "ele42v90"}));
        assert!(matches!(
            identity_from_token(&token),
            Err(TokenSwapError::IdentityNotFound)
        ));
        assert!(identity_from_token("").is_err());
        assert!(identity_from_token("not-a-token").is_err());
        assert!(identity_from_token("a.!!!.c").is_err());
        assert!(identity_from_token("s%3AOLD").is_err());
    }

    #[test]
    fn test_padded_and_standard_alphabet() {
        let claims = br#"{"userID":447455}"#;
        let padded = base64::engine::general_purpose::STANDARD.encode(claims);
        let token = format!("h.{padded}.s");
        assert_eq!(identity_from_token(&token).unwrap(), "447455");
    }

    #[test]
    fn test_claim_from_token() {
        let token = token_with_claims(&serde_json::json!({
            "userID": 1,
            "lessonInfo": {"lessonId": 66832, "chapterSeq": 1},
            "retry": null
        }));

        let lesson = claim_from_token(&token, "lessonInfo").unwrap();
        assert_eq!(lesson["lessonId"], 66832);
        assert!(matches!(
            claim_from_token(&token, "retry"),
            Err(TokenSwapError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_json_path_str() {
        let body = br#"{"success":true,"data":{"accessToken":"a.b.c","version":5}}"#;
        assert_eq!(json_path_str(body, &["data", "accessToken"]).unwrap(), "a.b.c");
        assert!(json_path_str(body, &["data", "version"]).is_err());
        assert!(json_path_str(body, &["data", "missing"]).is_err());
        assert!(json_path_str(b"<html>", &["data"]).is_err());
    }

    #[test]
    fn test_json_path_ints() {
        let body = br#"{"data":{"problems":[{"prob":437901},{"prob":437904}]}}"#;
        assert_eq!(
            json_path_ints(body, &["data", "problems", "prob"]).unwrap(),
            vec![437_901, 437_904]
        );
    }

    #[test]
    fn test_json_path_ints_skips_incomplete_elements() {
        let body = br#"{"data":{"problems":[{"prob":1},{"other":2},{"prob":3.0}]}}"#;
        assert_eq!(
            json_path_ints(body, &["data", "problems", "prob"]).unwrap(),
            vec![1, 3]
        );

        let empty = br#"{"data":{"problems":[]}}"#;
        assert!(json_path_ints(empty, &["data", "problems", "prob"])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_json_path_ints_missing_prefix() {
        let body = br#"{"data":{"lessons":[]}}"#;
        assert!(matches!(
            json_path_ints(body, &["data", "problems", "prob"]),
            Err(TokenSwapError::PathNotFound(_))
        ));
    }

    #[test]
    fn test_access_token_from_body() {
        let token = token_with_claims(&serde_json::json!({"user_id": 447_455}));
        let body = serde_json::json!({"data": {"accessToken": token}}).to_string();

        let found = access_token_from_body(body.as_bytes(), &["data", "accessToken"]).unwrap();
        assert_eq!(found.token, token);
        assert_eq!(found.identity.as_deref(), Some("447455"));

        let opaque = br#"{"data":{"accessToken":"opaque"}}"#;
        let found = access_token_from_body(opaque, &["data", "accessToken"]).unwrap();
        assert_eq!(found.identity, None);
    }

    proptest! {
        #[test]
        fn prop_identity_is_idempotent(user_id in 0i64..i64::from(u32::MAX)) {
            let token = token_with_claims(&serde_json::json!({"userID": user_id}));
            let first = identity_from_token(&token).unwrap();
            let second = identity_from_token(&token).unwrap();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first, user_id.to_string());
        }
    }
}
