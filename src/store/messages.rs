/*
`Store` methods for the `messages` table: public contact-form submissions,
read-only once written.
*/
use serde::Serialize;
use time::OffsetDateTime;
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::page::{self, Page};

/// A row from the `messages` table.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    pub id: i64,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub message: Option<String>,
    #[serde(serialize_with = "crate::export::ser_datetime")]
    pub submitted_at: OffsetDateTime,
}

fn message_from_row(row: &Row) -> Result<Message, DbError> {
    Ok(Message {
        id: row.try_get("id")?,
        fname: row.try_get("fname")?,
        lname: row.try_get("lname")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        message: row.try_get("message")?,
        submitted_at: row.try_get("submitted_at")?,
    })
}

impl Store {
    pub async fn insert_message(
        &self,
        fname: &str,
        lname: &str,
        email: &str,
        phone: &str,
        message: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_message( {:?} {:?}, {:?}, ... ) called.",
            fname, lname, email
        );

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO messages (fname, lname, email, phone, message)
                VALUES ($1, $2, $3, $4, $5)",
            &[&fname, &lname, &email, &phone, &message]
        ).await?;

        Ok(())
    }

    /// One window of contact messages, newest submission first.
    pub async fn messages_page(&self, pg: u32) -> Result<Page<Message>, DbError> {
        log::trace!("Store::messages_page( {} ) called.", pg);

        let client = self.connect().await?;
        let limit = i64::from(page::MESSAGE_PAGE_SIZE);
        let off = page::offset(pg, page::MESSAGE_PAGE_SIZE);

        let params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&limit, &off];
        let (count_res, data_res) = tokio::join!(
            client.query_one("SELECT COUNT(*) FROM messages", &[]),
            client.query(
                "SELECT * FROM messages
                    ORDER BY submitted_at DESC, id DESC
                    LIMIT $1 OFFSET $2",
                params
            ),
        );

        let total: i64 = count_res?.try_get(0)?;
        let rows = data_res?;
        let mut items: Vec<Message> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            items.push(message_from_row(row)?);
        }

        Ok(Page {
            items,
            current_page: pg,
            total_pages: page::total_pages(total, page::MESSAGE_PAGE_SIZE),
        })
    }

    /// Every message, newest first, for CSV export.
    pub async fn all_messages(&self) -> Result<Vec<Message>, DbError> {
        log::trace!("Store::all_messages() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM messages ORDER BY submitted_at DESC, id DESC",
            &[]
        ).await?;

        let mut messages: Vec<Message> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            messages.push(message_from_row(row)?);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn insert_and_page_messages() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        for n in 0..12 {
            db.insert_message(
                "Pat", "Caller",
                "pat@example.com", "021 555 0000",
                &format!("message number {}", n)
            ).await.unwrap();
        }

        let pg = db.messages_page(1).await.unwrap();
        assert_eq!(pg.items.len(), 10);
        assert_eq!(pg.total_pages, 2);
        // Newest first.
        assert_eq!(pg.items[0].message.as_deref(), Some("message number 11"));

        let pg = db.messages_page(2).await.unwrap();
        assert_eq!(pg.items.len(), 2);

        db.nuke_database().await.unwrap();
    }
}
