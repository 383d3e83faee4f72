/*
`Store` methods for the `child` table: enrollment, the paged registers,
per-parent lookups, edits, and (cascading) deletion.
*/
use serde::Serialize;
use time::{Date, OffsetDateTime};
use tokio_postgres::Row;

use super::{DbError, Store};
use crate::page::{self, Page};

/// A row from the `child` table. Dates serialize pre-formatted for
/// template display.
#[derive(Clone, Debug, Serialize)]
pub struct Child {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    #[serde(serialize_with = "crate::export::ser_opt_date")]
    pub dob: Option<Date>,
    pub picture: Option<String>,
    pub food_allergy: Option<String>,
    pub parent_first_name: Option<String>,
    pub parent_last_name: Option<String>,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
    #[serde(serialize_with = "crate::export::ser_datetime")]
    pub registered: OffsetDateTime,
    pub status: String,
}

impl Child {
    /// The child's date of birth as an HTML `<input type="date">` value.
    pub fn dob_form_value(&self) -> String {
        match &self.dob {
            Some(d) => d.format(crate::FORM_DATE_FMT).unwrap_or_default(),
            None => String::new(),
        }
    }
}

/// Fields an enrollment form supplies. Status is not among them: every
/// new enrollment starts 'Active' and an admin flips it to 'Enrolled'.
#[derive(Debug)]
pub struct NewChild {
    pub first_name: String,
    pub last_name: String,
    pub gender: Option<String>,
    pub dob: Option<Date>,
    pub picture: String,
    pub food_allergy: Option<String>,
    pub parent_first_name: Option<String>,
    pub parent_last_name: Option<String>,
    pub parent_email: Option<String>,
    pub parent_phone: Option<String>,
}

fn child_from_row(row: &Row) -> Result<Child, DbError> {
    Ok(Child {
        id: row.try_get("id")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        gender: row.try_get("gender")?,
        dob: row.try_get("dob")?,
        picture: row.try_get("picture")?,
        food_allergy: row.try_get("food_allergy")?,
        parent_first_name: row.try_get("parent_first_name")?,
        parent_last_name: row.try_get("parent_last_name")?,
        parent_email: row.try_get("parent_email")?,
        parent_phone: row.try_get("parent_phone")?,
        registered: row.try_get("date")?,
        status: row.try_get("status")?,
    })
}

fn children_from_rows(rows: &[Row]) -> Result<Vec<Child>, DbError> {
    let mut children: Vec<Child> = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        children.push(child_from_row(row)?);
    }
    Ok(children)
}

impl Store {
    /// Enroll a new child; returns the generated id.
    pub async fn insert_child(&self, new: &NewChild) -> Result<i64, DbError> {
        log::trace!(
            "Store::insert_child( {:?} {:?} ) called.",
            &new.first_name, &new.last_name
        );

        let client = self.connect().await?;
        let row = client.query_one(
            "INSERT INTO child
                (first_name, last_name, gender, dob, picture, food_allergy,
                 parent_first_name, parent_last_name, parent_email, parent_phone,
                 status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'Active')
                RETURNING id",
            &[
                &new.first_name, &new.last_name, &new.gender, &new.dob,
                &new.picture, &new.food_allergy, &new.parent_first_name,
                &new.parent_last_name, &new.parent_email, &new.parent_phone,
            ]
        ).await?;

        let id: i64 = row.try_get("id")?;
        log::trace!("Enrolled child {} ({} {}).", id, &new.first_name, &new.last_name);
        Ok(id)
    }

    pub async fn child_by_id(&self, id: i64) -> Result<Option<Child>, DbError> {
        log::trace!("Store::child_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM child WHERE id = $1",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(child_from_row(&row)?)),
        }
    }

    /// A child visible to teacher/parent views: must be 'Enrolled'.
    pub async fn enrolled_child_by_id(&self, id: i64) -> Result<Option<Child>, DbError> {
        log::trace!("Store::enrolled_child_by_id( {} ) called.", id);

        let client = self.connect().await?;
        match client.query_opt(
            "SELECT * FROM child WHERE id = $1 AND status = 'Enrolled'",
            &[&id]
        ).await? {
            None => Ok(None),
            Some(row) => Ok(Some(child_from_row(&row)?)),
        }
    }

    /// One window of the full register (admin view), ordered by id.
    /// Count and fetch are issued together over the one connection.
    pub async fn child_register_page(&self, pg: u32) -> Result<Page<Child>, DbError> {
        log::trace!("Store::child_register_page( {} ) called.", pg);

        let client = self.connect().await?;
        let limit = i64::from(page::REGISTER_PAGE_SIZE);
        let off = page::offset(pg, page::REGISTER_PAGE_SIZE);

        let params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&limit, &off];
        let (count_res, data_res) = tokio::join!(
            client.query_one("SELECT COUNT(*) FROM child", &[]),
            client.query(
                "SELECT * FROM child ORDER BY id ASC LIMIT $1 OFFSET $2",
                params
            ),
        );

        let total: i64 = count_res?.try_get(0)?;
        Ok(Page {
            items: children_from_rows(&data_res?)?,
            current_page: pg,
            total_pages: page::total_pages(total, page::REGISTER_PAGE_SIZE),
        })
    }

    /// One window of the enrolled-only register (teacher dashboards).
    pub async fn enrolled_page(
        &self,
        pg: u32,
        page_size: u32,
    ) -> Result<Page<Child>, DbError> {
        log::trace!("Store::enrolled_page( {}, {} ) called.", pg, page_size);

        let client = self.connect().await?;
        let limit = i64::from(page_size);
        let off = page::offset(pg, page_size);

        let params: &[&(dyn tokio_postgres::types::ToSql + Sync)] = &[&limit, &off];
        let (count_res, data_res) = tokio::join!(
            client.query_one(
                "SELECT COUNT(*) FROM child WHERE status = 'Enrolled'", &[]
            ),
            client.query(
                "SELECT * FROM child WHERE status = 'Enrolled'
                    ORDER BY id ASC LIMIT $1 OFFSET $2",
                params
            ),
        );

        let total: i64 = count_res?.try_get(0)?;
        Ok(Page {
            items: children_from_rows(&data_res?)?,
            current_page: pg,
            total_pages: page::total_pages(total, page_size),
        })
    }

    /// Every child registered to a parent's email, for the parent
    /// dashboard's child selector.
    pub async fn children_of_parent(&self, parent_email: &str) -> Result<Vec<Child>, DbError> {
        log::trace!("Store::children_of_parent( {:?} ) called.", parent_email);

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM child WHERE parent_email = $1 ORDER BY id ASC",
            &[&parent_email]
        ).await?;
        children_from_rows(&rows)
    }

    /// The whole register, for CSV export.
    pub async fn all_children(&self) -> Result<Vec<Child>, DbError> {
        log::trace!("Store::all_children() called.");

        let client = self.connect().await?;
        let rows = client.query(
            "SELECT * FROM child ORDER BY id ASC",
            &[]
        ).await?;
        children_from_rows(&rows)
    }

    /// Rewrite a child record. `picture` of `None` keeps whatever picture
    /// reference is already stored (the edit form doesn't force a
    /// re-upload); the COALESCE keeps that a single-statement update.
    pub async fn update_child(
        &self,
        id: i64,
        new: &NewChild,
        picture: Option<&str>,
        status: &str,
    ) -> Result<(), DbError> {
        log::trace!("Store::update_child( {}, ... , {:?} ) called.", id, status);

        let client = self.connect().await?;
        let n = client.execute(
            "UPDATE child SET
                first_name = $1, last_name = $2, gender = $3, dob = $4,
                food_allergy = $5, parent_first_name = $6, parent_last_name = $7,
                parent_email = $8, parent_phone = $9,
                picture = COALESCE($10, picture), status = $11
                WHERE id = $12",
            &[
                &new.first_name, &new.last_name, &new.gender, &new.dob,
                &new.food_allergy, &new.parent_first_name, &new.parent_last_name,
                &new.parent_email, &new.parent_phone,
                &picture, &status, &id,
            ]
        ).await?;

        if n == 0 {
            Err(DbError(format!("There is no child with id {}.", id)))
        } else {
            Ok(())
        }
    }

    /// Remove a child and, in the same transaction, every attendance log
    /// that references it. Logs are only reachable through their child,
    /// so orphaning them would just strand rows.
    pub async fn delete_child(&self, id: i64) -> Result<(), DbError> {
        log::trace!("Store::delete_child( {} ) called.", id);

        let mut client = self.connect().await?;
        let t = client.transaction().await?;

        let n_logs = t.execute(
            "DELETE FROM attendance_log WHERE child_id = $1",
            &[&id]
        ).await?;

        let n = t.execute(
            "DELETE FROM child WHERE id = $1",
            &[&id]
        ).await?;

        if n == 0 {
            return Err(DbError(format!("There is no child with id {}.", id)));
        }

        t.commit().await?;
        log::trace!("Deleted child {} and {} attendance logs.", id, n_logs);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serial_test::serial;
    use time::macros::date;

    use crate::store::tests::TEST_CONNECTION;
    use crate::tests::ensure_logging;

    fn new_child(first: &str, last: &str) -> NewChild {
        NewChild {
            first_name: first.to_owned(),
            last_name: last.to_owned(),
            gender: Some("F".to_owned()),
            dob: Some(date!(2021 - 03 - 14)),
            picture: "1751234567-photo.jpg".to_owned(),
            food_allergy: None,
            parent_first_name: Some("Pat".to_owned()),
            parent_last_name: Some(last.to_owned()),
            parent_email: Some(format!("pat.{}@example.com", last.to_lowercase())),
            parent_phone: Some("021 555 0123".to_owned()),
        }
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn enrollment_defaults_and_visibility() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let alice = db.insert_child(&new_child("Alice", "Smith")).await.unwrap();
        let bob = db.insert_child(&new_child("Bob", "Jones")).await.unwrap();

        // New enrollments start 'Active' and stay off the teacher dashboard.
        let a = db.child_by_id(alice).await.unwrap().unwrap();
        assert_eq!(a.status, "Active");
        let pg = db.enrolled_page(1, 7).await.unwrap();
        assert!(pg.items.is_empty());
        assert_eq!(pg.total_pages, 1);

        // Flip Alice to Enrolled; only she appears.
        let edit = new_child("Alice", "Smith");
        db.update_child(alice, &edit, None, "Enrolled").await.unwrap();
        let pg = db.enrolled_page(1, 7).await.unwrap();
        assert_eq!(pg.items.len(), 1);
        assert_eq!(pg.items[0].first_name, "Alice");
        assert!(db.enrolled_child_by_id(bob).await.unwrap().is_none());
        assert!(db.enrolled_child_by_id(alice).await.unwrap().is_some());

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn edit_preserves_picture_when_no_upload() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_child(&new_child("Cleo", "Park")).await.unwrap();
        let edit = new_child("Cleo", "Parker");

        db.update_child(id, &edit, None, "Active").await.unwrap();
        let c = db.child_by_id(id).await.unwrap().unwrap();
        assert_eq!(c.last_name, "Parker");
        assert_eq!(c.picture.as_deref(), Some("1751234567-photo.jpg"));

        db.update_child(id, &edit, Some("999-new.jpg"), "Active").await.unwrap();
        let c = db.child_by_id(id).await.unwrap().unwrap();
        assert_eq!(c.picture.as_deref(), Some("999-new.jpg"));

        db.nuke_database().await.unwrap();
    }

    #[tokio::test]
    #[ignore]
    #[serial]
    async fn delete_cascades_to_logs() {
        ensure_logging();
        let db = Store::new(TEST_CONNECTION.to_owned());
        db.ensure_db_schema().await.unwrap();

        let id = db.insert_child(&new_child("Dev", "Rao")).await.unwrap();
        db.insert_log(
            id, date!(2025 - 07 - 01),
            Some("08:30"), Some("15:00"),
            Some("blocks"), "Ms Jenny"
        ).await.unwrap();

        db.delete_child(id).await.unwrap();
        assert!(db.child_by_id(id).await.unwrap().is_none());
        let logs = db.logs_for_child_page(id, 1).await.unwrap();
        assert!(logs.items.is_empty());

        assert!(db.delete_child(id).await.is_err());

        db.nuke_database().await.unwrap();
    }
}
