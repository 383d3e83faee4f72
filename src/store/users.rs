/*
`Store` methods for the `users` table: credential checks, admin-side user
management, and the password-reset token lifecycle.
*/
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::auth::{self, AuthResult};
use crate::user::{Role, User};

/// Failure modes of `Store::insert_user` that handlers tell apart: a
/// duplicate email gets a flash-style notice, everything else is a 500.
#[derive(Debug)]
pub enum InsertUserError {
    Conflict,
    Db(DbError),
}

impl From<DbError> for InsertUserError {
    fn from(e: DbError) -> Self { InsertUserError::Db(e) }
}

impl From<tokio_postgres::error::Error> for InsertUserError {
    fn from(e: tokio_postgres::error::Error) -> Self {
        InsertUserError::Db(e.into())
    }
}

fn user_from_row(row: &Row) -> Result<User, DbError> {
    let role_str: &str = row.try_get("role")?;
    Ok(User {
        email: row.try_get("email")?,
        username: row.try_get("username")?,
        password: row.try_get("password")?,
        role: Role::from_db(role_str),
    })
}

impl Store {
    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::get_user_by_email( {:?} ) called.", email);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT email, username, password, role FROM users WHERE email = $1",
            &[&email]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    /// Check a login credential. The bcrypt comparison is skipped when the
    /// lookup finds nothing; the two failure modes stay distinct here for
    /// logging, and the handler collapses them into one response.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthResult, DbError> {
        log::trace!("Store::authenticate( {:?}, [ password ] ) called.", email);

        let user = match self.get_user_by_email(email).await? {
            None => { return Ok(AuthResult::NoSuchUser); },
            Some(u) => u,
        };

        if auth::verify_password(password, &user.password) {
            Ok(AuthResult::User(user))
        } else {
            Ok(AuthResult::BadPassword)
        }
    }

    /// Everyone in the `users` table, for the admin's management page.
    /// Small enough at a single-center scale not to need a window.
    pub async fn get_users(&self) -> Result<Vec<User>, DbError> {
        log::trace!("Store::get_users() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT email, username, password, role FROM users ORDER BY email ASC",
            &[]
        ).await?;

        let mut users: Vec<User> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            users.push(user_from_row(row)?);
        }
        Ok(users)
    }

    /// Insert a new user. `password_hash` must already be hashed; clear
    /// passwords never reach the store.
    pub async fn insert_user(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), InsertUserError> {
        log::trace!(
            "Store::insert_user( {:?}, {:?}, [ hash ], {} ) called.",
            email, username, role
        );

        let mut client = self.connect().await?;
        let t = client.transaction().await.map_err(DbError::from)?;

        if t.query_opt(
            "SELECT email FROM users WHERE email = $1",
            &[&email]
        ).await.map_err(DbError::from)?.is_some() {
            return Err(InsertUserError::Conflict);
        }

        t.execute(
            "INSERT INTO users (email, username, password, role)
                VALUES ($1, $2, $3, $4)",
            &[&email, &username, &password_hash, &role.to_string()]
        ).await.map_err(DbError::from)?;

        t.commit().await.map_err(DbError::from)?;
        log::trace!("Inserted {} {:?}.", role, email);
        Ok(())
    }

    /// Update username and role; overwrite the stored hash only when
    /// `new_password_hash` is supplied. A single statement either way, so
    /// the update can't half-apply.
    pub async fn update_user(
        &self,
        email: &str,
        username: &str,
        role: Role,
        new_password_hash: Option<&str>,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::update_user( {:?}, {:?}, {}, [ new hash: {} ] ) called.",
            email, username, role, new_password_hash.is_some()
        );

        let client = self.connect().await?;

        let n = match new_password_hash {
            Some(hash) => client.execute(
                "UPDATE users SET username = $1, role = $2, password = $3
                    WHERE email = $4",
                &[&username, &role.to_string(), &hash, &email]
            ).await?,
            None => client.execute(
                "UPDATE users SET username = $1, role = $2 WHERE email = $3",
                &[&username, &role.to_string(), &email]
            ).await?,
        };

        if n == 0 {
            Err(DbError(format!("There is no user with email {:?}.", email)))
        } else {
            Ok(())
        }
    }

    /// Unconditional, irreversible delete.
    pub async fn delete_user(&self, email: &str) -> Result<(), DbError> {
        log::trace!("Store::delete_user( {:?} ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "DELETE FROM users WHERE email = $1",
            &[&email]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no user with email {:?}.", email)))
        } else {
            log::trace!("Deleted user {:?}.", email);
            Ok(())
        }
    }

    /// The three headline numbers on the admin dashboard: enrolled
    /// children, parent accounts, teacher accounts. Issued together over
    /// one connection.
    pub async fn dashboard_counts(&self) -> Result<(i64, i64, i64), DbError> {
        log::trace!("Store::dashboard_counts() called.");

        let client = self.connect().await?;

        let (enrolled, parents, teachers) = tokio::join!(
            client.query_one(
                "SELECT COUNT(*) FROM child WHERE status = 'Enrolled'", &[]
            ),
            client.query_one(
                "SELECT COUNT(*) FROM users WHERE role = 'parent'", &[]
            ),
            client.query_one(
                "SELECT COUNT(*) FROM users WHERE role = 'teacher'", &[]
            ),
        );

        Ok((
            enrolled?.try_get(0)?,
            parents?.try_get(0)?,
            teachers?.try_get(0)?,
        ))
    }

    /// Attach a fresh reset token (expiring an hour out) to the matching
    /// user. Returns whether any user matched; the *handler* reports
    /// success either way so the form can't be used to probe for accounts.
    pub async fn issue_reset_token(
        &self,
        email: &str,
        token: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::issue_reset_token( {:?}, [ token ] ) called.", email);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE users
                SET reset_token = $1, token_expiry = now() + interval '1 hour'
                WHERE email = $2",
            &[&token, &email]
        ).await?;

        Ok(n > 0)
    }

    /// Resolve a reset token: valid only while the stored token matches
    /// and its expiry is strictly in the future.
    pub async fn user_by_reset_token(&self, token: &str) -> Result<Option<User>, DbError> {
        log::trace!("Store::user_by_reset_token( [ token ] ) called.");

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT email, username, password, role FROM users
                WHERE reset_token = $1 AND token_expiry > now()",
            &[&token]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(user_from_row(&row)?)),
        }
    }

    /// Spend a reset token: store the new hash and clear token + expiry in
    /// one conditional UPDATE. The condition re-validates the token, so two
    /// racing consumptions can't both succeed, and a consumed token is
    /// terminal. Returns false when the token was invalid or expired.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
    ) -> Result<bool, DbError> {
        log::trace!("Store::consume_reset_token( [ token ], [ hash ] ) called.");

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE users
                SET password = $1, reset_token = NULL, token_expiry = NULL
                WHERE reset_token = $2 AND token_expiry > now()",
            &[&new_password_hash, &token]
        ).await?;

        Ok(n > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::auth::hash_password;
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    async fn fresh_store() -> Store {
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_authenticate_conflict() {
        ensure_logging();
        let db = fresh_store().await;

        let hash = hash_password("correct horse").unwrap();
        db.insert_user("amy@example.com", "amy", &hash, Role::Teacher)
            .await.unwrap();

        match db.authenticate("amy@example.com", "correct horse").await.unwrap() {
            AuthResult::User(u) => {
                assert_eq!(u.username, "amy");
                assert_eq!(u.role, Role::Teacher);
            },
            x => panic!("expected User, got {:?}", x),
        }
        assert!(matches!(
            db.authenticate("amy@example.com", "wrong").await.unwrap(),
            AuthResult::BadPassword
        ));
        assert!(matches!(
            db.authenticate("nobody@example.com", "whatever").await.unwrap(),
            AuthResult::NoSuchUser
        ));

        // Same email again is a Conflict, not a DbError.
        let hash2 = hash_password("other").unwrap();
        assert!(matches!(
            db.insert_user("amy@example.com", "amy2", &hash2, Role::Parent).await,
            Err(InsertUserError::Conflict)
        ));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn update_without_password_keeps_hash() {
        ensure_logging();
        let db = fresh_store().await;

        let hash = hash_password("original pw").unwrap();
        db.insert_user("bea@example.com", "bea", &hash, Role::Parent)
            .await.unwrap();

        db.update_user("bea@example.com", "beatrice", Role::Teacher, None)
            .await.unwrap();

        // Role and username changed, old password still works.
        match db.authenticate("bea@example.com", "original pw").await.unwrap() {
            AuthResult::User(u) => {
                assert_eq!(u.username, "beatrice");
                assert_eq!(u.role, Role::Teacher);
            },
            x => panic!("expected User, got {:?}", x),
        }

        // Supplying a new hash replaces the credential.
        let new_hash = hash_password("new pw").unwrap();
        db.update_user("bea@example.com", "beatrice", Role::Teacher, Some(&new_hash))
            .await.unwrap();
        assert!(matches!(
            db.authenticate("bea@example.com", "original pw").await.unwrap(),
            AuthResult::BadPassword
        ));
        assert!(matches!(
            db.authenticate("bea@example.com", "new pw").await.unwrap(),
            AuthResult::User(_)
        ));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_token_lifecycle() {
        ensure_logging();
        let db = fresh_store().await;

        let hash = hash_password("forgotten").unwrap();
        db.insert_user("cal@example.com", "cal", &hash, Role::Parent)
            .await.unwrap();

        // No matching account: no token, but no error either.
        assert!(!db.issue_reset_token("ghost@example.com", "feedface").await.unwrap());

        assert!(db.issue_reset_token("cal@example.com", "deadbeef").await.unwrap());
        let u = db.user_by_reset_token("deadbeef").await.unwrap().unwrap();
        assert_eq!(u.email, "cal@example.com");
        assert!(db.user_by_reset_token("wrongtoken").await.unwrap().is_none());

        let new_hash = hash_password("remembered").unwrap();
        assert!(db.consume_reset_token("deadbeef", &new_hash).await.unwrap());

        // Consumed is terminal: the token resolves to nothing and a second
        // consumption attempt affects no rows.
        assert!(db.user_by_reset_token("deadbeef").await.unwrap().is_none());
        assert!(!db.consume_reset_token("deadbeef", &new_hash).await.unwrap());

        assert!(matches!(
            db.authenticate("cal@example.com", "remembered").await.unwrap(),
            AuthResult::User(_)
        ));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn expired_token_is_invalid() {
        ensure_logging();
        let db = fresh_store().await;

        let hash = hash_password("forgetful").unwrap();
        db.insert_user("eli@example.com", "eli", &hash, Role::Parent)
            .await.unwrap();
        assert!(db.issue_reset_token("eli@example.com", "cafebabe").await.unwrap());
        assert!(db.user_by_reset_token("cafebabe").await.unwrap().is_some());

        // Push the expiry into the past; the token is still stored but dead.
        let client = db.connect().await.unwrap();
        client.execute(
            "UPDATE users SET token_expiry = now() - interval '1 minute'
                WHERE email = $1",
            &[&"eli@example.com"]
        ).await.unwrap();

        assert!(db.user_by_reset_token("cafebabe").await.unwrap().is_none());
        let new_hash = hash_password("too late").unwrap();
        assert!(!db.consume_reset_token("cafebabe", &new_hash).await.unwrap());

        // Nothing was overwritten; the old credential still works.
        assert!(matches!(
            db.authenticate("eli@example.com", "forgetful").await.unwrap(),
            AuthResult::User(_)
        ));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn delete_user_is_unconditional() {
        ensure_logging();
        let db = fresh_store().await;

        let hash = hash_password("x").unwrap();
        db.insert_user("dot@example.com", "dot", &hash, Role::Admin)
            .await.unwrap();
        db.delete_user("dot@example.com").await.unwrap();
        assert!(db.get_user_by_email("dot@example.com").await.unwrap().is_none());
        assert!(db.delete_user("dot@example.com").await.is_err());

        db.nuke_database().await.unwrap();
    }
}
