//! Correlation and rewrite engine

use tracing::{debug, warn};

use crate::cache::CacheSet;
use crate::config::RewriteConfig;
use crate::cookie::CookieMap;
use crate::frame::{EventType, Frame, HttpPayload};
use crate::identity::{access_token_from_body, identity_from_token, json_path_ints};
use crate::{Result, TokenSwapError};

use super::lesson::problem_form_body;

const COOKIE_HEADER: &str = "Cookie";
const SET_COOKIE_HEADER: &str = "Set-Cookie";
const CONTENT_LENGTH_HEADER: &str = "Content-Length";

/// Rewrites requests with the freshest credentials learned from replayed
/// responses.
///
/// Every sub-step is best effort: a token without identity or a body without
/// the expected field skips that step only. Cache failures are returned.
pub struct RewriteEngine {
    caches: CacheSet,
    config: RewriteConfig,
}

impl RewriteEngine {
    /// Create an engine over `caches`
    #[must_use]
    pub fn new(caches: CacheSet, config: RewriteConfig) -> Self {
        Self { caches, config }
    }

    /// Caches the engine reads and updates
    #[must_use]
    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    /// Decode and process one hex input line.
    ///
    /// Malformed lines produce no output.
    ///
    /// # Errors
    ///
    /// Returns error if a cache backend fails
    pub async fn process_line(&self, line: &[u8]) -> Result<Option<Vec<u8>>> {
        match Frame::decode_hex_line(line) {
            Ok(frame) => self.process(frame).await,
            Err(TokenSwapError::MalformedFrame(reason)) => {
                debug!("Skipping malformed frame: {}", reason);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Process one frame, returning the hex line to emit for requests.
    ///
    /// # Errors
    ///
    /// Returns error if a cache backend fails
    pub async fn process(&self, mut frame: Frame) -> Result<Option<Vec<u8>>> {
        match frame.event_type() {
            EventType::Request => {
                let outcome = self.rewrite_request(&mut frame).await;
                recover(frame.correlation_id(), outcome)?;
                Ok(Some(frame.encode_hex_line()))
            }
            EventType::OriginalResponse => Ok(None),
            EventType::ReplayedResponse => {
                let outcome = self.learn_from_response(&frame).await;
                recover(frame.correlation_id(), outcome)?;
                Ok(None)
            }
        }
    }

    async fn rewrite_request(&self, frame: &mut Frame) -> Result<()> {
        let id = frame.correlation_id().to_string();
        let payload = frame.payload_mut();

        let token_identity = self.refresh_access_token(&id, payload).await?;
        let (cookie_identity, session_token) = self.refresh_session_cookie(&id, payload).await?;

        let Some(identity) = cookie_identity.or(token_identity) else {
            return Ok(());
        };

        let targets_lesson = payload
            .path()
            .is_some_and(|path| path.starts_with(self.config.problem_endpoint.as_bytes()));
        if !targets_lesson {
            return Ok(());
        }

        let Some(problem) = self.caches.last_problem.get(&identity).await? else {
            return Ok(());
        };
        let Some(session_token) = session_token else {
            debug!("[{}] no session token to read lesson context from", id);
            return Ok(());
        };

        match problem_form_body(&session_token, &self.config.lesson_claim, &problem) {
            Ok(body) => {
                payload.set_body(body.as_bytes());
                payload.set_header(CONTENT_LENGTH_HEADER, body.len().to_string().as_bytes());
                debug!("[{}] spliced problem {} for {}", id, problem, identity);
            }
            Err(e) => debug!("[{}] skipping problem splice: {}", id, e),
        }

        Ok(())
    }

    /// Swap the bearer header for the cached one. Returns the token identity.
    async fn refresh_access_token(&self, id: &str, payload: &mut HttpPayload) -> Result<Option<String>> {
        let header = &self.config.access_token_header;
        let Some(current) = payload.header_str(header).map(str::to_string) else {
            return Ok(None);
        };

        let identity = match identity_from_token(&current) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("[{}] {} not decodable: {}", id, header, e);
                return Ok(None);
            }
        };

        if let Some(fresh) = self.caches.x_access_tokens.get(&identity).await? {
            payload.set_header(header, fresh.as_bytes());
            debug!("[{}] refreshed {} for {}", id, header, identity);
        }

        Ok(Some(identity))
    }

    /// Replace the cookie header with the cached one. Returns the session
    /// identity and the session token now carried by the request.
    async fn refresh_session_cookie(
        &self,
        id: &str,
        payload: &mut HttpPayload,
    ) -> Result<(Option<String>, Option<String>)> {
        let Some(raw) = payload.header_str(COOKIE_HEADER) else {
            return Ok((None, None));
        };
        let cookies = CookieMap::parsed(raw);
        let Some(session) = cookies.get(&self.config.session_cookie).map(str::to_string) else {
            return Ok((None, None));
        };

        let identity = match identity_from_token(&session) {
            Ok(identity) => identity,
            Err(e) => {
                debug!("[{}] session cookie not decodable: {}", id, e);
                return Ok((None, Some(session)));
            }
        };

        let Some(cached) = self.caches.original_tokens.get(&identity).await? else {
            return Ok((Some(identity), Some(session)));
        };

        let replacement = CookieMap::parsed(&cached);
        if replacement.is_empty() {
            payload.set_header(COOKIE_HEADER, cached.as_bytes());
        } else {
            payload.set_header(COOKIE_HEADER, replacement.to_string().as_bytes());
        }
        debug!("[{}] refreshed cookie for {}", id, identity);

        let session = replacement
            .get(&self.config.session_cookie)
            .map_or(session, str::to_string);
        Ok((Some(identity), Some(session)))
    }

    async fn learn_from_response(&self, frame: &Frame) -> Result<()> {
        let id = frame.correlation_id();
        let payload = frame.payload();

        if let Some(status) = payload.status().filter(|&status| status >= 400) {
            warn!("[{}] replayed response returned {}", id, status);
        }

        let mut identity = self.learn_session_cookie(id, payload).await?;

        match access_token_from_body(payload.body(), &self.config.access_token_path) {
            Ok(found) => {
                if found.identity.is_none() {
                    debug!("[{}] access token not decodable", id);
                }
                match found.identity.or_else(|| identity.clone()) {
                    Some(key) => {
                        self.caches.x_access_tokens.set(&key, &found.token).await?;
                        if identity.is_none() {
                            identity = Some(key);
                        }
                    }
                    None => debug!("[{}] no identity for access token", id),
                }
            }
            Err(e) => debug!("[{}] no access token: {}", id, e),
        }

        let Some(identity) = identity else {
            return Ok(());
        };

        match json_path_ints(payload.body(), &self.config.problems_path) {
            Ok(problems) => {
                if let Some(first) = problems.first() {
                    self.caches
                        .last_problem
                        .set(&identity, &first.to_string())
                        .await?;
                }
            }
            Err(e) => debug!("[{}] no problems: {}", id, e),
        }

        Ok(())
    }

    /// Remember the whole `Set-Cookie` header under the session identity
    async fn learn_session_cookie(&self, id: &str, payload: &HttpPayload) -> Result<Option<String>> {
        let Some(set_cookie) = payload.header_str(SET_COOKIE_HEADER) else {
            return Ok(None);
        };
        let cookies = CookieMap::parsed(set_cookie);
        let Some(session) = cookies.get(&self.config.session_cookie) else {
            return Ok(None);
        };

        match identity_from_token(session) {
            Ok(identity) => {
                self.caches.original_tokens.set(&identity, set_cookie).await?;
                debug!("[{}] stored session cookie for {}", id, identity);
                Ok(Some(identity))
            }
            Err(e) => {
                debug!("[{}] Set-Cookie session not decodable: {}", id, e);
                Ok(None)
            }
        }
    }
}

/// Transient backend failures only cost the current event its cache work.
fn recover(id: &str, outcome: Result<()>) -> Result<()> {
    match outcome {
        Err(e) if !e.is_fatal() => {
            warn!("[{}] Cache update skipped: {}", id, e);
            Ok(())
        }
        other => other,
    }
}
