/*!
Database interaction module.

The Postgres database to which this connects holds four tables:

```sql
CREATE TABLE users (
    email        TEXT PRIMARY KEY,
    username     TEXT NOT NULL,
    password     TEXT NOT NULL,   /* bcrypt hash, never clear text */
    role         TEXT NOT NULL,   /* 'admin' | 'teacher' | 'parent' | 'deactivated' */
    reset_token  TEXT,            /* live password-reset token, if any */
    token_expiry TIMESTAMPTZ
);

CREATE TABLE child (
    id                BIGSERIAL PRIMARY KEY,
    first_name        TEXT NOT NULL,
    last_name         TEXT NOT NULL,
    gender            TEXT,
    dob               DATE,
    picture           TEXT,    /* filename under the upload directory */
    food_allergy      TEXT,
    parent_first_name TEXT,
    parent_last_name  TEXT,
    parent_email      TEXT,
    parent_phone      TEXT,
    date              TIMESTAMPTZ NOT NULL DEFAULT now(),  /* registered */
    status            TEXT NOT NULL  /* 'Active' on creation; 'Enrolled' shows in dashboards */
);

CREATE TABLE attendance_log (
    id          BIGSERIAL PRIMARY KEY,
    child_id    BIGINT NOT NULL REFERENCES child(id),
    date        DATE NOT NULL,
    in_time     TEXT,    /* "HH:MM" as submitted */
    out_time    TEXT,
    activities  TEXT,
    teacher     TEXT,    /* display name of the educator who logged it */
    date_logged TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE messages (
    id           BIGSERIAL PRIMARY KEY,
    fname        TEXT,
    lname        TEXT,
    email        TEXT,
    phone        TEXT,
    message      TEXT,
    submitted_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
```
*/
use std::fmt::Write;

use tokio_postgres::{Client, NoTls};

pub mod children;
pub mod logs;
pub mod messages;
pub mod users;

pub use children::{Child, NewChild};
pub use logs::{EducatorLogRow, LogEntry};
pub use messages::Message;
pub use users::InsertUserError;

static SCHEMA: &[(&str, &str, &str)] = &[
    (
        "SELECT FROM information_schema.tables WHERE table_name = 'users'",
        "CREATE TABLE users (
            email        TEXT PRIMARY KEY,
            username     TEXT NOT NULL,
            password     TEXT NOT NULL,
            role         TEXT NOT NULL,
            reset_token  TEXT,
            token_expiry TIMESTAMPTZ
        )",
        "DROP TABLE users",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'child'",
        "CREATE TABLE child (
            id                BIGSERIAL PRIMARY KEY,
            first_name        TEXT NOT NULL,
            last_name         TEXT NOT NULL,
            gender            TEXT,
            dob               DATE,
            picture           TEXT,
            food_allergy      TEXT,
            parent_first_name TEXT,
            parent_last_name  TEXT,
            parent_email      TEXT,
            parent_phone      TEXT,
            date              TIMESTAMPTZ NOT NULL DEFAULT now(),
            status            TEXT NOT NULL
        )",
        "DROP TABLE child",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'attendance_log'",
        "CREATE TABLE attendance_log (
            id          BIGSERIAL PRIMARY KEY,
            child_id    BIGINT NOT NULL REFERENCES child(id),
            date        DATE NOT NULL,
            in_time     TEXT,
            out_time    TEXT,
            activities  TEXT,
            teacher     TEXT,
            date_logged TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE attendance_log",
    ),

    (
        "SELECT FROM information_schema.tables WHERE table_name = 'messages'",
        "CREATE TABLE messages (
            id           BIGSERIAL PRIMARY KEY,
            fname        TEXT,
            lname        TEXT,
            email        TEXT,
            phone        TEXT,
            message      TEXT,
            submitted_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
        "DROP TABLE messages",
    ),
];

#[derive(Debug, PartialEq)]
pub struct DbError(pub(crate) String);

impl DbError {
    /// Prepend some contextual `annotation` for the error.
    pub(crate) fn annotate(self, annotation: &str) -> Self {
        let s = format!("{}: {}", annotation, &self.0);
        Self(s)
    }

    pub fn display(&self) -> &str { &self.0 }
}

impl std::fmt::Display for DbError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", &self.0)
    }
}

impl From<tokio_postgres::error::Error> for DbError {
    fn from(e: tokio_postgres::error::Error) -> DbError {
        let mut s = format!("DB: {}", &e);
        if let Some(dbe) = e.as_db_error() {
            write!(&mut s, "; {}", dbe).unwrap();
        }
        DbError(s)
    }
}

impl From<String> for DbError {
    fn from(s: String) -> DbError { DbError(s) }
}

pub struct Store {
    connection_string: String,
}

impl Store {
    pub fn new(connection_string: String) -> Self {
        log::trace!("Store::new( ... ) called.");
        Self { connection_string }
    }

    pub(crate) async fn connect(&self) -> Result<Client, DbError> {
        log::trace!("Store::connect() called.");

        match tokio_postgres::connect(&self.connection_string, NoTls).await {
            Ok((client, connection)) => {
                log::trace!("    ...connection successful.");
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::error!("DB connection error: {}", &e);
                    } else {
                        log::trace!("tokio connection runtime drops.");
                    }
                });
                Ok(client)
            },
            Err(e) => {
                let dberr = DbError::from(e);
                log::trace!("    ...connection failed: {:?}", &dberr);
                Err(dberr.annotate("Unable to connect"))
            }
        }
    }

    pub async fn ensure_db_schema(&self) -> Result<(), DbError> {
        log::trace!("Store::ensure_db_schema() called.");

        let mut client = self.connect().await?;
        let t = client.transaction().await
            .map_err(|e| DbError::from(e)
                .annotate("DB unable to begin transaction"))?;

        for (test_stmt, create_stmt, _) in SCHEMA.iter() {
            if t.query_opt(test_stmt.to_owned(), &[]).await?.is_none() {
                log::info!(
                    "{:?} returned no results; attempting to insert table.",
                    test_stmt
                );
                t.execute(create_stmt.to_owned(), &[]).await?;
            }
        }

        t.commit().await
            .map_err(|e| DbError::from(e)
                .annotate("Error committing transaction"))
    }

    /**
    Drop all database tables to fully reset database state.

    This is only meant for cleanup after testing. It is advisable to look at
    the ERROR level log output when testing to ensure this method did its job.
    */
    #[cfg(test)]
    pub async fn nuke_database(&self) -> Result<(), DbError> {
        log::trace!("Store::nuke_database() called.");

        let client = self.connect().await?;

        for (_, _, drop_stmt) in SCHEMA.iter().rev() {
            if let Err(e) = client.execute(drop_stmt.to_owned(), &[]).await {
                let err = DbError::from(e);
                log::error!("Error dropping: {:?}: {}", &drop_stmt, &err.display());
            }
        }

        log::trace!("    ...nuking complete.");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    /*!
    These tests assume you have a Postgres instance running on your local
    machine with resources named according to what you see in the
    `static TEST_CONNECTION &str`:

    ```text
    user: sprout_test
    password: sprout_test

    with write access to:

    database: sprout_test
    ```

    They are `#[ignore]`d so the default `cargo test` run stays green on
    machines without that database:

    ```bash
    cargo test -- --ignored
    ```
    */
    use super::*;
    use crate::tests::ensure_logging;

    use serial_test::serial;

    pub(crate) static TEST_CONNECTION: &str =
        "host=localhost user=sprout_test password='sprout_test' dbname=sprout_test";

    /**
    This function is for getting the database back in a blank slate state if
    a test panics partway through and leaves it munged.

    ```bash
    cargo test reset_store -- --ignored
    ```
    */
    #[tokio::test]
    #[ignore]
    #[serial]
    async fn reset_store() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn create_store() {
        ensure_logging();

        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();
        db.nuke_database().await.unwrap();
    }
}
