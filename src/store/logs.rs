/*
`Store` methods for the `attendance_log` table. Logs are written once by a
teacher and never updated or deleted individually; they only disappear
when their child is deleted (see `children::delete_child`).
*/
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::page::{self, Page};

/// A row from the `attendance_log` table.
#[derive(Clone, Debug, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub child_id: i64,
    #[serde(serialize_with = "crate::export::ser_date")]
    pub date: Date,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
    pub activities: Option<String>,
    pub teacher: Option<String>,
    #[serde(serialize_with = "crate::export::ser_datetime")]
    pub logged: OffsetDateTime,
}

/// A log row joined with its child, for the admin's educator-log view and
/// the log export. The child columns are optional because the view uses a
/// left join.
#[derive(Clone, Debug, Serialize)]
pub struct EducatorLogRow {
    #[serde(flatten)]
    pub log: LogEntry,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub status: Option<String>,
}

fn log_from_row(row: &Row) -> Result<LogEntry, DbError> {
    Ok(LogEntry {
        id: row.try_get("id")?,
        child_id: row.try_get("child_id")?,
        date: row.try_get("date")?,
        in_time: row.try_get("in_time")?,
        out_time: row.try_get("out_time")?,
        activities: row.try_get("activities")?,
        teacher: row.try_get("teacher")?,
        logged: row.try_get("date_logged")?,
    })
}

fn joined_from_row(row: &Row) -> Result<EducatorLogRow, DbError> {
    Ok(EducatorLogRow {
        log: log_from_row(row)?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        status: row.try_get("status")?,
    })
}

impl Store {
    /// Record one day's attendance and activities for a child.
    pub async fn insert_log(
        &self,
        child_id: i64,
        date: Date,
        in_time: Option<&str>,
        out_time: Option<&str>,
        activities: Option<&str>,
        teacher: &str,
    ) -> Result<(), DbError> {
        log::trace!(
            "Store::insert_log( {}, {}, ... , {:?} ) called.",
            child_id, &date, teacher
        );

        let client = self.connect().await?;
        client.execute(
            "INSERT INTO attendance_log
                (child_id, date, in_time, out_time, activities, teacher)
                VALUES ($1, $2, $3, $4, $5, $6)",
            &[&child_id, &date, &in_time, &out_time, &activities, &teacher]
        ).await?;

        Ok(())
    }

    /// One window of a child's logs, newest day first. The id tiebreak
    /// keeps the order stable when two logs share a date.
    pub async fn logs_for_child_page(
        &self,
        child_id: i64,
        pg: u32,
    ) -> Result<Page<LogEntry>, DbError> {
        log::trace!("Store::logs_for_child_page( {}, {} ) called.", child_id, pg);

        let client = self.connect().await?;
        let limit = i64::from(page::LOG_PAGE_SIZE);
        let off = page::offset(pg, page::LOG_PAGE_SIZE);

        let count_params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&child_id];
        let data_params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&child_id, &limit, &off];
        let (count_res, data_res) = tokio::join!(
            client.query_one(
                "SELECT COUNT(*) FROM attendance_log WHERE child_id = $1",
                count_params
            ),
            client.query(
                "SELECT * FROM attendance_log WHERE child_id = $1
                    ORDER BY date DESC, id DESC LIMIT $2 OFFSET $3",
                data_params
            ),
        );

        let total: i64 = count_res?.try_get(0)?;
        let rows = data_res?;
        let mut items: Vec<LogEntry> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            items.push(log_from_row(row)?);
        }

        Ok(Page {
            items,
            current_page: pg,
            total_pages: page::total_pages(total, page::LOG_PAGE_SIZE),
        })
    }

    /// One window of every educator log, joined with the child register.
    pub async fn educator_logs_page(&self, pg: u32) -> Result<Page<EducatorLogRow>, DbError> {
        log::trace!("Store::educator_logs_page( {} ) called.", pg);

        let client = self.connect().await?;
        let limit = i64::from(page::LOG_PAGE_SIZE);
        let off = page::offset(pg, page::LOG_PAGE_SIZE);

        let params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&limit, &off];
        let (count_res, data_res) = tokio::join!(
            client.query_one("SELECT COUNT(*) FROM attendance_log", &[]),
            client.query(
                "SELECT attendance_log.*,
                        child.first_name, child.last_name, child.status
                    FROM attendance_log
                    LEFT JOIN child ON attendance_log.child_id = child.id
                    ORDER BY attendance_log.date DESC,
                             attendance_log.in_time DESC,
                             attendance_log.id DESC
                    LIMIT $1 OFFSET $2",
                params
            ),
        );

        let total: i64 = count_res?.try_get(0)?;
        let rows = data_res?;
        let mut items: Vec<EducatorLogRow> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            items.push(joined_from_row(row)?);
        }

        Ok(Page {
            items,
            current_page: pg,
            total_pages: page::total_pages(total, page::LOG_PAGE_SIZE),
        })
    }

    /// Every log joined with its child, for CSV export.
    pub async fn all_logs_joined(&self) -> Result<Vec<EducatorLogRow>, DbError> {
        log::trace!("Store::all_logs_joined() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT attendance_log.*,
                    child.first_name, child.last_name, child.status
                FROM attendance_log
                JOIN child ON attendance_log.child_id = child.id
                ORDER BY attendance_log.date DESC, attendance_log.id DESC",
            &[]
        ).await?;

        let mut items: Vec<EducatorLogRow> = Vec::with_capacity(rows.len());
        for row in rows.iter() {
            items.push(joined_from_row(row)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::NewChild;
    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    fn a_child() -> NewChild {
        NewChild {
            first_name: "Evie".to_owned(),
            last_name: "Tan".to_owned(),
            gender: None,
            dob: None,
            picture: "pic.jpg".to_owned(),
            food_allergy: Some("dairy".to_owned()),
            parent_first_name: None,
            parent_last_name: None,
            parent_email: Some("tan@example.com".to_owned()),
            parent_phone: None,
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn logs_page_newest_first() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_child(&a_child()).await.unwrap();
        db.insert_log(
            id, date!(2025 - 07 - 01),
            Some("08:30"), Some("15:00"), Some("sandpit"), "Ms Jenny"
        ).await.unwrap();
        db.insert_log(
            id, date!(2025 - 07 - 03),
            Some("09:00"), Some("14:30"), Some("painting"), "Ms Jenny"
        ).await.unwrap();

        let pg = db.logs_for_child_page(id, 1).await.unwrap();
        assert_eq!(pg.total_pages, 1);
        assert_eq!(pg.items.len(), 2);
        assert_eq!(pg.items[0].date, date!(2025 - 07 - 03));
        assert_eq!(pg.items[1].date, date!(2025 - 07 - 01));

        let joined = db.educator_logs_page(1).await.unwrap();
        assert_eq!(joined.items.len(), 2);
        assert_eq!(joined.items[0].first_name.as_deref(), Some("Evie"));

        db.nuke_database().await.unwrap();
    }
}
