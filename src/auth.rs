/*!
Credential checking and the per-request access gate.

Password storage uses bcrypt; `bcrypt::verify` does the constant-time
comparison against the stored hash. The two login failure modes
(`NoSuchUser` vs `BadPassword`) stay distinct in here for logging, but
handlers collapse them into one "Incorrect Email or Password" page so a
visitor can't probe which addresses have accounts.
*/
use crate::session::Session;
use crate::user::{Role, User};

/// Outcome of checking a login credential against the `users` table.
#[derive(Debug)]
pub enum AuthResult {
    /// Credential matched; here's the account.
    User(User),
    NoSuchUser,
    BadPassword,
}

/// Hash a clear password for storage. The clear text is never logged.
pub fn hash_password(password: &str) -> Result<String, String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| format!("Error hashing password: {}", &e))
}

/// Check a clear password against a stored bcrypt hash.
///
/// A malformed stored hash counts as a failed check (and gets logged);
/// it should never turn into a successful login.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match bcrypt::verify(password, hash) {
        Ok(matched) => matched,
        Err(e) => {
            log::error!("Error verifying password against stored hash: {}", &e);
            false
        },
    }
}

/// Why the gate turned a request away. The three variants produce three
/// different user-facing messages, so they must stay distinguishable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Deny {
    NotLoggedIn,
    WrongRole,
    Deactivated,
}

impl Deny {
    pub fn message(&self) -> &'static str {
        match self {
            Deny::NotLoggedIn => "Please login to view this page!",
            Deny::WrongRole => "You do not have permission to view this page.",
            Deny::Deactivated =>
                "Your account is deactivated or not recognized. Please contact the administrator.",
        }
    }
}

/// The access-control gate evaluated at the top of every protected handler.
///
/// No session means not logged in; a `Deactivated` role (which is also
/// where unrecognized role strings land) is denied even when logged in;
/// otherwise a required role must match exactly.
pub fn authorize(session: Option<&Session>, required: Option<Role>) -> Result<(), Deny> {
    let session = match session {
        Some(s) => s,
        None => { return Err(Deny::NotLoggedIn); },
    };

    if session.role == Role::Deactivated {
        return Err(Deny::Deactivated);
    }

    match required {
        Some(role) if role != session.role => Err(Deny::WrongRole),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    fn session_with_role(role: Role) -> Session {
        Session {
            email: "someone@example.com".to_owned(),
            username: "someone".to_owned(),
            role,
        }
    }

    #[test]
    fn hash_and_verify_round_trip() {
        ensure_logging();
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("", &hash));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        ensure_logging();
        assert!(!verify_password("hunter2", "not-a-bcrypt-hash"));
    }

    #[test]
    fn gate_requires_login() {
        assert_eq!(authorize(None, None), Err(Deny::NotLoggedIn));
        assert_eq!(authorize(None, Some(Role::Admin)), Err(Deny::NotLoggedIn));
    }

    #[test]
    fn gate_denies_deactivated_even_when_logged_in() {
        let s = session_with_role(Role::Deactivated);
        assert_eq!(authorize(Some(&s), None), Err(Deny::Deactivated));
        assert_eq!(authorize(Some(&s), Some(Role::Admin)), Err(Deny::Deactivated));
        // An unknown role string in the database lands on Deactivated too.
        let s = session_with_role(Role::from_db("superuser"));
        assert_eq!(authorize(Some(&s), None), Err(Deny::Deactivated));
    }

    #[test]
    fn gate_checks_required_role() {
        let teacher = session_with_role(Role::Teacher);
        assert_eq!(authorize(Some(&teacher), Some(Role::Admin)), Err(Deny::WrongRole));
        assert_eq!(authorize(Some(&teacher), Some(Role::Teacher)), Ok(()));
        assert_eq!(authorize(Some(&teacher), None), Ok(()));

        let admin = session_with_role(Role::Admin);
        assert_eq!(authorize(Some(&admin), Some(Role::Admin)), Ok(()));
        assert_eq!(authorize(Some(&admin), Some(Role::Parent)), Err(Deny::WrongRole));
    }
}
