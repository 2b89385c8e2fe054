//! Problem-id splice for stateful lesson requests

use serde_json::{Map, Value};

use crate::identity::claim_from_token;
use crate::{Result, TokenSwapError};

/// Key carrying the problem id next to the lesson context
const PROBLEM_ID_KEY: &str = "problemId";

/// Form field the lesson endpoint reads its JSON input from
const INPUT_FIELD: &str = "input";

/// Build the `input=<json>` form body for a lesson request.
///
/// The JSON object holds the session token's lesson claim under its own name
/// plus the last problem id seen for the user.
///
/// # Errors
///
/// Returns `PathNotFound` if the problem id is not an integer or the token
/// carries no lesson claim, `IdentityNotFound` if the token cannot be decoded
pub fn problem_form_body(session_token: &str, lesson_claim: &str, problem_id: &str) -> Result<String> {
    let problem_id: i64 = problem_id
        .trim()
        .parse()
        .map_err(|_| TokenSwapError::PathNotFound(PROBLEM_ID_KEY.to_string()))?;

    let lesson = claim_from_token(session_token, lesson_claim)?;
    if !lesson.is_object() {
        return Err(TokenSwapError::PathNotFound(lesson_claim.to_string()));
    }

    let mut input = Map::new();
    input.insert(lesson_claim.to_string(), lesson);
    input.insert(PROBLEM_ID_KEY.to_string(), Value::from(problem_id));

    let json = Value::Object(input).to_string();
    Ok(format!("{INPUT_FIELD}={}", urlencoding::encode(&json)))
}
