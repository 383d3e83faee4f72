/*!
User records and roles.
*/
use serde::Serialize;

/// Permission class attached to a user account.
///
/// Anything in the `users` table that isn't one of the three working roles
/// is treated as `Deactivated`; the access gate denies `Deactivated`
/// unconditionally, so an unrecognized role string in the database can
/// never slip through a handler's role check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
    Deactivated,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            Role::Admin       => "admin",
            Role::Teacher     => "teacher",
            Role::Parent      => "parent",
            Role::Deactivated => "deactivated",
        };

        write!(f, "{}", token)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin"       => Ok(Role::Admin),
            "teacher"     => Ok(Role::Teacher),
            "parent"      => Ok(Role::Parent),
            "deactivated" => Ok(Role::Deactivated),
            _ => Err(format!("{:?} is not a valid Role.", s)),
        }
    }
}

impl Role {
    /// Lenient parse for values coming out of the database.
    ///
    /// Form input goes through the strict `FromStr`; rows we merely read
    /// must never fail a whole page over a bad role string.
    pub fn from_db(s: &str) -> Role {
        match s.parse() {
            Ok(role) => role,
            Err(_) => {
                log::warn!("Unrecognized role {:?} in users table; treating as deactivated.", s);
                Role::Deactivated
            },
        }
    }
}

/// A row from the `users` table.
///
/// `password` holds the bcrypt hash, never a clear password. It is skipped
/// on serialization so it can't leak into template data or JSON.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trip() {
        for role in [Role::Admin, Role::Teacher, Role::Parent, Role::Deactivated] {
            let s = role.to_string();
            assert_eq!(s.parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn strict_parse_rejects_junk() {
        assert!("Admin".parse::<Role>().is_err());
        assert!("superuser".parse::<Role>().is_err());
        assert!("".parse::<Role>().is_err());
    }

    #[test]
    fn db_parse_falls_back_to_deactivated() {
        assert_eq!(Role::from_db("teacher"), Role::Teacher);
        assert_eq!(Role::from_db("superuser"), Role::Deactivated);
        assert_eq!(Role::from_db(""), Role::Deactivated);
    }
}
