/*!
Server-side login sessions.

A successful login mints an opaque random token, which the browser holds
in a cookie; the token keys a map to the identity and role established at
login. The map lives inside the shared `Glob`, so the surrounding RwLock
is the only synchronization needed.
*/
use std::collections::HashMap;
use std::time::{Duration, Instant};

use rand::{distributions, Rng};

use crate::user::Role;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "sprout_session";

/// A login left idle this long is dead even without an explicit logout.
const SESSION_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

const TOKEN_LENGTH: usize = 32;
const TOKEN_CHARS: &str =
"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// What a live session remembers about the login that created it.
#[derive(Clone, Debug)]
pub struct Session {
    pub email: String,
    pub username: String,
    pub role: Role,
}

fn generate_token(length: usize) -> String {
    let chars: Vec<char> = TOKEN_CHARS.chars().collect();
    // TOKEN_CHARS is a nonempty literal, so the distribution is valid.
    let dist = distributions::Slice::new(&chars).unwrap();
    let rng = rand::thread_rng();
    rng.sample_iter(&dist).take(length).collect()
}

/// A single-use secret for the password-reset flow: 64 hex characters,
/// matching a 32-byte random value.
pub fn generate_reset_token() -> String {
    let chars: Vec<char> = "0123456789abcdef".chars().collect();
    let dist = distributions::Slice::new(&chars).unwrap();
    let rng = rand::thread_rng();
    rng.sample_iter(&dist).take(64).collect()
}

#[derive(Debug)]
struct Live {
    session: Session,
    issued: Instant,
}

fn stale(live: &Live, max_age: Duration) -> bool {
    live.issued.elapsed() >= max_age
}

/// The live session table, token -> session.
///
/// Sessions die on logout or after `SESSION_MAX_AGE`; stale entries are
/// also swept out of the map on each fresh login, so abandoned sessions
/// can't accumulate until the next restart.
#[derive(Debug, Default)]
pub struct Sessions {
    live: HashMap<String, Live>,
}

impl Sessions {
    pub fn new() -> Self {
        Self { live: HashMap::new() }
    }

    /// Mint a token for a fresh login.
    pub fn issue(&mut self, session: Session) -> String {
        self.expire_older_than(SESSION_MAX_AGE);

        loop {
            let token = generate_token(TOKEN_LENGTH);
            if !self.live.contains_key(&token) {
                log::trace!(
                    "Sessions::issue() minted session for {:?} ({}).",
                    &session.email, &session.role
                );
                self.live.insert(token.clone(), Live {
                    session,
                    issued: Instant::now(),
                });
                return token;
            }
            // 62^32 tokens; a collision is astronomically unlikely, but
            // looping costs nothing.
        }
    }

    pub fn get(&self, token: &str) -> Option<&Session> {
        let live = self.live.get(token)?;
        if stale(live, SESSION_MAX_AGE) {
            return None;
        }
        Some(&live.session)
    }

    /// Drop every session issued longer ago than `max_age`.
    pub fn expire_older_than(&mut self, max_age: Duration) {
        let before = self.live.len();
        self.live.retain(|_, live| !stale(live, max_age));
        let swept = before - self.live.len();
        if swept > 0 {
            log::trace!("Sessions::expire_older_than() swept {} sessions.", swept);
        }
    }

    /// Drop a session. Unconditional and idempotent: destroying a token
    /// that was never issued (or already destroyed) is fine.
    pub fn destroy(&mut self, token: &str) {
        if self.live.remove(token).is_some() {
            log::trace!("Sessions::destroy() removed a live session.");
        }
    }

    pub fn len(&self) -> usize { self.live.len() }

    pub fn is_empty(&self) -> bool { self.live.is_empty() }
}

/// Dig the session token out of a `Cookie:` header value.
pub fn token_from_cookie_header(header_value: &str) -> Option<&str> {
    for chunk in header_value.split(';') {
        let chunk = chunk.trim();
        if let Some((name, value)) = chunk.split_once('=') {
            if name == SESSION_COOKIE {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some_session() -> Session {
        Session {
            email: "jan@example.com".to_owned(),
            username: "jan".to_owned(),
            role: Role::Teacher,
        }
    }

    #[test]
    fn issue_get_destroy() {
        let mut sessions = Sessions::new();
        let token = sessions.issue(some_session());
        assert_eq!(token.len(), TOKEN_LENGTH);

        let s = sessions.get(&token).unwrap();
        assert_eq!(s.email, "jan@example.com");
        assert_eq!(s.role, Role::Teacher);

        sessions.destroy(&token);
        assert!(sessions.get(&token).is_none());
        // Destroying again (or destroying nonsense) is a quiet no-op.
        sessions.destroy(&token);
        sessions.destroy("no-such-token");
        assert!(sessions.is_empty());
    }

    #[test]
    fn tokens_are_unique_per_login() {
        let mut sessions = Sessions::new();
        let a = sessions.issue(some_session());
        let b = sessions.issue(some_session());
        assert_ne!(a, b);
        assert_eq!(sessions.len(), 2);
    }

    #[test]
    fn stale_sessions_are_swept() {
        let mut sessions = Sessions::new();
        let a = sessions.issue(some_session());
        assert!(sessions.get(&a).is_some());

        // With a zero max age, every session counts as stale.
        sessions.expire_older_than(Duration::ZERO);
        assert!(sessions.get(&a).is_none());
        assert!(sessions.is_empty());

        // Issuing a new session sweeps with the real max age, which a
        // just-minted login survives.
        let b = sessions.issue(some_session());
        assert!(sessions.get(&b).is_some());
        assert_eq!(sessions.len(), 1);
    }

    #[test]
    fn cookie_header_parsing() {
        assert_eq!(
            token_from_cookie_header("sprout_session=abc123"),
            Some("abc123")
        );
        assert_eq!(
            token_from_cookie_header("theme=dark; sprout_session=abc123; lang=en"),
            Some("abc123")
        );
        assert_eq!(token_from_cookie_header("theme=dark"), None);
        assert_eq!(token_from_cookie_header(""), None);
    }
}
