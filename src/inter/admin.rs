/*!
Handlers for the admin's side of the portal: the dashboard, enrollment and
the child register, user management, the contact-message and educator-log
views, and the three CSV exports.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Multipart, Path, Query},
    http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE},
    response::IntoResponse,
    Form,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;
use tokio::sync::RwLock;

use crate::{
    auth,
    config::Glob,
    export::{self, Column},
    session::Session,
    store::{Child, EducatorLogRow, InsertUserError, Message, NewChild},
    user::Role,
    FORM_DATE_FMT,
};
use super::*;

/// Render the admin dashboard for an established admin session. Called
/// from the members-only dispatch as well as its own route.
pub async fn dashboard(session: &Session, glob: &Arc<RwLock<Glob>>) -> Response {
    log::trace!("admin::dashboard( {:?}, ... ) called.", &session.email);

    let counts = {
        glob.read().await.store.dashboard_counts().await
    };
    let (enrolled, parents, teachers) = match counts {
        Ok(tup) => tup,
        Err(e) => {
            log::error!("Error fetching dashboard counts: {}", &e);
            return html_500();
        },
    };

    let data = json!({
        "admin_name": &session.username,
        "admin_email": &session.email,
        "enrolled_children_count": enrolled,
        "parent_count": parents,
        "teacher_count": teachers,
    });

    serve_template(StatusCode::OK, "admin_dashboard", &data, vec![])
}

pub async fn dashboard_page(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    let session = match require_role(&headers, &glob, Some(Role::Admin)).await {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    dashboard(&session, &glob).await
}

pub async fn new_enrollments_page(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::new_enrollments_page( ... ) called.");

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }
    serve_template(StatusCode::OK, "new_enrollments", &json!({}), vec![])
}

/// The enrollment (and edit) form fields, accumulated from multipart
/// parts. Everything starts empty and gets filled as parts arrive.
#[derive(Debug, Default)]
struct ChildForm {
    first_name: String,
    last_name: String,
    gender: Option<String>,
    dob: Option<Date>,
    food_allergy: Option<String>,
    parent_first_name: Option<String>,
    parent_last_name: Option<String>,
    parent_email: Option<String>,
    parent_phone: Option<String>,
    status: Option<String>,
    picture: Option<String>,
}

fn optional(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Strip any path the browser smuggled into the uploaded filename.
fn bare_filename(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Walk the multipart body, storing any uploaded picture into
/// `upload_dir` under a timestamped name and collecting the text fields.
async fn read_child_form(
    mut multipart: Multipart,
    upload_dir: &std::path::Path,
) -> Result<ChildForm, String> {
    let mut form = ChildForm::default();

    while let Some(field) = multipart.next_field().await
        .map_err(|e| format!("Error reading multipart field: {}", &e))?
    {
        let name = match field.name() {
            Some(n) => n.to_owned(),
            None => { continue; },
        };

        if name == "picture" {
            let original = match field.file_name() {
                Some(f) if !f.is_empty() => bare_filename(f).to_owned(),
                _ => { continue; },
            };
            let bytes = field.bytes().await
                .map_err(|e| format!("Error reading uploaded picture: {}", &e))?;
            if bytes.is_empty() { continue; }

            let millis = time::OffsetDateTime::now_utc().unix_timestamp_nanos()
                / 1_000_000;
            let stored_name = format!("{}-{}", millis, &original);
            let path = upload_dir.join(&stored_name);
            tokio::fs::write(&path, &bytes).await
                .map_err(|e| format!(
                    "Error writing upload {}: {}", path.display(), &e
                ))?;
            form.picture = Some(stored_name);
            continue;
        }

        let text = field.text().await
            .map_err(|e| format!("Error reading field {:?}: {}", &name, &e))?;

        match name.as_str() {
            "first_name" => { form.first_name = text; },
            "last_name" => { form.last_name = text; },
            "gender" => { form.gender = optional(text); },
            "dob" => {
                if !text.is_empty() {
                    let d = Date::parse(&text, FORM_DATE_FMT)
                        .map_err(|e| format!(
                            "Error parsing date of birth {:?}: {}", &text, &e
                        ))?;
                    form.dob = Some(d);
                }
            },
            "food_allergy" => { form.food_allergy = optional(text); },
            "parent_first_name" => { form.parent_first_name = optional(text); },
            "parent_last_name" => { form.parent_last_name = optional(text); },
            "parent_email" => { form.parent_email = optional(text); },
            "parent_phone" => { form.parent_phone = optional(text); },
            "status" => { form.status = optional(text); },
            x => { log::warn!("Unexpected form field {:?}; ignoring.", x); },
        }
    }

    Ok(form)
}

/// `POST /admin/newEnrollments`: a new child, picture required.
pub async fn new_enrollments(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    multipart: Multipart,
) -> Response {
    log::trace!("admin::new_enrollments( ... ) called.");

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let upload_dir = glob.read().await.upload_dir.clone();
    let form = match read_child_form(multipart, &upload_dir).await {
        Ok(f) => f,
        Err(e) => {
            log::error!("Error reading enrollment form: {}", &e);
            return respond_bad_request(
                "Could not read the enrollment form.".to_owned()
            );
        },
    };

    if form.first_name.is_empty() || form.last_name.is_empty() {
        return respond_bad_request(
            "First and last name are required.".to_owned()
        );
    }
    if form.dob.is_none() {
        return respond_bad_request("Date of birth is required.".to_owned());
    }
    let picture = match form.picture {
        Some(p) => p,
        None => {
            return respond_bad_request("Picture is required".to_owned());
        },
    };

    let new = NewChild {
        first_name: form.first_name,
        last_name: form.last_name,
        gender: form.gender,
        dob: form.dob,
        picture,
        food_allergy: form.food_allergy,
        parent_first_name: form.parent_first_name,
        parent_last_name: form.parent_last_name,
        parent_email: form.parent_email,
        parent_phone: form.parent_phone,
    };

    match glob.read().await.store.insert_child(&new).await {
        Ok(id) => {
            log::info!("Enrolled new child with id {}.", id);
            serve_template(
                StatusCode::OK,
                "new_enrollments",
                &json!({ "success": "New child enrolled successfully!" }),
                vec![]
            )
        },
        Err(e) => {
            log::error!("Error inserting child record: {}", &e);
            html_500()
        },
    }
}

/// `GET /admin/childDetails`: the paged register of every child.
pub async fn child_details(
    headers: HeaderMap,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::child_details( {:?} ) called.", &params);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let pg = {
        glob.read().await.store.child_register_page(params.page()).await
    };
    match pg {
        Ok(pg) => serve_template(
            StatusCode::OK,
            "child_register",
            &json!({
                "children": &pg.items,
                "current_page": pg.current_page,
                "total_pages": pg.total_pages,
            }),
            vec![]
        ),
        Err(e) => {
            log::error!("Error fetching child register: {}", &e);
            html_500()
        },
    }
}

fn parse_child_id(id: &str) -> Option<i64> {
    id.parse::<i64>().ok()
}

pub async fn edit_child_page(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::edit_child_page( {:?} ) called.", &id);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }
    let id = match parse_child_id(&id) {
        Some(n) => n,
        None => { return respond_bad_request(format!("Bad child id: {:?}", &id)); },
    };

    let child = {
        glob.read().await.store.child_by_id(id).await
    };
    match child {
        Err(e) => {
            log::error!("Error fetching child {}: {}", id, &e);
            html_500()
        },
        Ok(None) => respond_not_found("Child not found."),
        Ok(Some(c)) => {
            let data = json!({
                "child": &c,
                "dob_form_value": c.dob_form_value(),
            });
            serve_template(StatusCode::OK, "edit_child", &data, vec![])
        },
    }
}

/// `POST /admin/edit-child/:id`: rewrite the record; an omitted picture
/// upload keeps the stored one.
pub async fn edit_child(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    multipart: Multipart,
) -> Response {
    log::trace!("admin::edit_child( {:?} ) called.", &id);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }
    let id = match parse_child_id(&id) {
        Some(n) => n,
        None => { return respond_bad_request(format!("Bad child id: {:?}", &id)); },
    };

    let upload_dir = glob.read().await.upload_dir.clone();
    let form = match read_child_form(multipart, &upload_dir).await {
        Ok(f) => f,
        Err(e) => {
            log::error!("Error reading edit-child form: {}", &e);
            return respond_bad_request(
                "Could not read the child form.".to_owned()
            );
        },
    };

    if form.first_name.is_empty() || form.last_name.is_empty() {
        return respond_bad_request(
            "First and last name are required.".to_owned()
        );
    }
    let status = form.status.as_deref().unwrap_or("Active").to_owned();
    let picture = form.picture.clone();

    let new = NewChild {
        first_name: form.first_name,
        last_name: form.last_name,
        gender: form.gender,
        dob: form.dob,
        // Placeholder; update_child takes the picture separately and
        // keeps the stored one when none was uploaded.
        picture: String::new(),
        food_allergy: form.food_allergy,
        parent_first_name: form.parent_first_name,
        parent_last_name: form.parent_last_name,
        parent_email: form.parent_email,
        parent_phone: form.parent_phone,
    };

    let res = {
        glob.read().await.store
            .update_child(id, &new, picture.as_deref(), &status).await
    };
    match res {
        Ok(()) => redirect(&format!("/admin/edit-child/{}", id)),
        Err(e) => {
            log::error!("Error updating child {}: {}", id, &e);
            html_500()
        },
    }
}

/// `GET /admin/delete-child/:id`: remove a child and all its logs.
pub async fn delete_child(
    headers: HeaderMap,
    Path(id): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::delete_child( {:?} ) called.", &id);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }
    let id = match parse_child_id(&id) {
        Some(n) => n,
        None => { return respond_bad_request(format!("Bad child id: {:?}", &id)); },
    };

    match glob.read().await.store.delete_child(id).await {
        Ok(()) => redirect("/admin/childDetails"),
        Err(e) => {
            log::error!("Error deleting child {}: {}", id, &e);
            respond_not_found("Child not found.")
        },
    }
}

#[derive(Deserialize, Debug)]
pub struct UserMgmtParams {
    pub error: Option<String>,
}

/// `GET /admin/user-management`: every account plus the role list the
/// form's selector offers.
pub async fn user_management(
    headers: HeaderMap,
    Query(params): Query<UserMgmtParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::user_management( {:?} ) called.", &params);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let users = match glob.read().await.store.get_users().await {
        Ok(u) => u,
        Err(e) => {
            log::error!("Error fetching users: {}", &e);
            return html_500();
        },
    };

    let duplicate = params.error.as_deref() == Some("duplicate");
    let data = json!({
        "users": &users,
        "roles": ["admin", "teacher", "parent", "deactivated"],
        "error": if duplicate {
            Some("A user with this email already exists.")
        } else {
            None
        },
    });

    serve_template(StatusCode::OK, "user_management", &data, vec![])
}

#[derive(Deserialize, Debug)]
pub struct AddUserData {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

pub async fn add_user(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<AddUserData>,
) -> Response {
    log::trace!(
        "admin::add_user( {:?}, {:?}, {:?} ) called.",
        &form.username, &form.email, &form.role
    );

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    if form.username.is_empty() || form.email.is_empty()
        || form.password.is_empty() || form.role.is_empty()
    {
        return respond_bad_request("All fields are required!".to_owned());
    }
    let role: Role = match form.role.parse() {
        Ok(r) => r,
        Err(_) => {
            return respond_bad_request(format!("Bad role: {:?}", &form.role));
        },
    };
    let hash = match auth::hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("{}", &e);
            return html_500();
        },
    };

    let res = {
        glob.read().await.store
            .insert_user(&form.email, &form.username, &hash, role).await
    };
    match res {
        Ok(()) => redirect("/admin/user-management"),
        Err(InsertUserError::Conflict) => {
            redirect("/admin/user-management?error=duplicate")
        },
        Err(InsertUserError::Db(e)) => {
            log::error!("Error inserting user {:?}: {}", &form.email, &e);
            html_500()
        },
    }
}

#[derive(Deserialize, Debug)]
pub struct EditUserData {
    pub username: String,
    pub role: String,
    pub password: Option<String>,
}

/// `POST /admin/edit-user/:email`: a blank password field leaves the
/// stored credential alone.
pub async fn edit_user(
    headers: HeaderMap,
    Path(email): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<EditUserData>,
) -> Response {
    log::trace!("admin::edit_user( {:?}, {:?} ) called.", &email, &form.username);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    if form.username.is_empty() || form.role.is_empty() {
        return respond_bad_request("Username and role are required!".to_owned());
    }
    let role: Role = match form.role.parse() {
        Ok(r) => r,
        Err(_) => {
            return respond_bad_request(format!("Bad role: {:?}", &form.role));
        },
    };

    let new_hash = match form.password.as_deref() {
        Some(pw) if !pw.is_empty() => match auth::hash_password(pw) {
            Ok(h) => Some(h),
            Err(e) => {
                log::error!("{}", &e);
                return html_500();
            },
        },
        _ => None,
    };

    let res = {
        glob.read().await.store
            .update_user(&email, &form.username, role, new_hash.as_deref()).await
    };
    match res {
        Ok(()) => redirect("/admin/user-management"),
        Err(e) => {
            log::error!("Error updating user {:?}: {}", &email, &e);
            html_500()
        },
    }
}

pub async fn delete_user(
    headers: HeaderMap,
    Path(email): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::delete_user( {:?} ) called.", &email);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    match glob.read().await.store.delete_user(&email).await {
        Ok(()) => redirect("/admin/user-management"),
        Err(e) => {
            log::error!("Error deleting user {:?}: {}", &email, &e);
            respond_not_found("No such user.")
        },
    }
}

/// `GET /admin/view-messages`: paged contact-form submissions.
pub async fn view_messages(
    headers: HeaderMap,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::view_messages( {:?} ) called.", &params);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let pg = {
        glob.read().await.store.messages_page(params.page()).await
    };
    match pg {
        Ok(pg) => serve_template(
            StatusCode::OK,
            "view_messages",
            &json!({
                "messages": &pg.items,
                "current_page": pg.current_page,
                "total_pages": pg.total_pages,
            }),
            vec![]
        ),
        Err(e) => {
            log::error!("Error fetching messages: {}", &e);
            html_500()
        },
    }
}

/// `GET /admin/educatorLogs`: every teacher's logs, joined with the
/// register, paged.
pub async fn educator_logs(
    headers: HeaderMap,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::educator_logs( {:?} ) called.", &params);

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let pg = {
        glob.read().await.store.educator_logs_page(params.page()).await
    };
    match pg {
        Ok(pg) => serve_template(
            StatusCode::OK,
            "educator_logs",
            &json!({
                "logs": &pg.items,
                "current_page": pg.current_page,
                "total_pages": pg.total_pages,
            }),
            vec![]
        ),
        Err(e) => {
            log::error!("Error fetching educator logs: {}", &e);
            html_500()
        },
    }
}

fn csv_download(bytes: Vec<u8>, filename: &'static str) -> Response {
    let disposition = format!("attachment; filename=\"{}\"", filename);
    match HeaderValue::from_str(&disposition) {
        Ok(v) => (
            StatusCode::OK,
            bytes
        ).into_response().add_headers(vec![
            (CONTENT_TYPE, HeaderValue::from_static("text/csv")),
            (CONTENT_DISPOSITION, v),
        ]),
        Err(e) => {
            log::error!("Error building disposition header: {}", &e);
            html_500()
        },
    }
}

fn opt(s: &Option<String>) -> String {
    s.clone().unwrap_or_default()
}

static MESSAGE_COLUMNS: &[Column<Message>] = &[
    ("Firstname", |m| opt(&m.fname)),
    ("Lastname", |m| opt(&m.lname)),
    ("Email", |m| opt(&m.email)),
    ("Phone", |m| opt(&m.phone)),
    ("Message", |m| opt(&m.message)),
    ("Submitted_at", |m| export::fmt_datetime(&m.submitted_at)),
];

static LOG_COLUMNS: &[Column<EducatorLogRow>] = &[
    ("Date", |r| export::fmt_date(&r.log.date)),
    ("Educator", |r| opt(&r.log.teacher)),
    ("Child Name", |r| format!(
        "{} {}",
        r.first_name.as_deref().unwrap_or(""),
        r.last_name.as_deref().unwrap_or("")
    )),
    ("In Time", |r| opt(&r.log.in_time)),
    ("Out Time", |r| opt(&r.log.out_time)),
    // Free-text activities get their newlines flattened so a cell stays
    // one spreadsheet row.
    ("Activities", |r| match &r.log.activities {
        Some(a) => a.replace(['\r', '\n'], " "),
        None => String::new(),
    }),
    ("Enrolled Status", |r| opt(&r.status)),
];

static REGISTER_COLUMNS: &[Column<Child>] = &[
    ("Child ID", |c| c.id.to_string()),
    ("Child Name", |c| format!("{} {}", &c.first_name, &c.last_name)),
    ("Gender", |c| opt(&c.gender)),
    ("Date of Birth", |c| export::fmt_opt_date(&c.dob)),
    ("Food Allergy", |c| opt(&c.food_allergy)),
    ("Parent Name", |c| format!(
        "{} {}",
        c.parent_first_name.as_deref().unwrap_or(""),
        c.parent_last_name.as_deref().unwrap_or("")
    )),
    ("Parent Email", |c| opt(&c.parent_email)),
    ("Parent Phone", |c| opt(&c.parent_phone)),
    ("Date Registered", |c| export::fmt_datetime(&c.registered)),
    ("Enrolled Status", |c| c.status.clone()),
];

pub async fn export_messages(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::export_messages( ... ) called.");

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let messages = match glob.read().await.store.all_messages().await {
        Ok(m) => m,
        Err(e) => {
            log::error!("Error exporting messages: {}", &e);
            return text_500(Some("Error exporting messages".to_owned()));
        },
    };
    match export::to_csv(&messages, MESSAGE_COLUMNS) {
        Ok(bytes) => csv_download(bytes, "messages.csv"),
        Err(e) => {
            log::error!("Error generating message CSV: {}", &e);
            text_500(Some("Error generating CSV".to_owned()))
        },
    }
}

pub async fn export_logs(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::export_logs( ... ) called.");

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let logs = match glob.read().await.store.all_logs_joined().await {
        Ok(l) => l,
        Err(e) => {
            log::error!("Error exporting logs: {}", &e);
            return text_500(Some("Error exporting logs".to_owned()));
        },
    };
    match export::to_csv(&logs, LOG_COLUMNS) {
        Ok(bytes) => csv_download(bytes, "educator_logs.csv"),
        Err(e) => {
            log::error!("Error generating log CSV: {}", &e);
            text_500(Some("Error generating CSV".to_owned()))
        },
    }
}

pub async fn export_register(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("admin::export_register( ... ) called.");

    if let Err(r) = require_role(&headers, &glob, Some(Role::Admin)).await {
        return r;
    }

    let children = match glob.read().await.store.all_children().await {
        Ok(c) => c,
        Err(e) => {
            log::error!("Error exporting register: {}", &e);
            return text_500(Some("Error exporting register".to_owned()));
        },
    };
    match export::to_csv(&children, REGISTER_COLUMNS) {
        Ok(bytes) => csv_download(bytes, "child_register.csv"),
        Err(e) => {
            log::error!("Error generating register CSV: {}", &e);
            text_500(Some("Error generating CSV".to_owned()))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_lose_their_paths() {
        assert_eq!(bare_filename("photo.jpg"), "photo.jpg");
        assert_eq!(bare_filename("/etc/passwd"), "passwd");
        assert_eq!(bare_filename("C:\\Users\\kid\\photo.jpg"), "photo.jpg");
    }

    #[test]
    fn log_columns_flatten_newlines() {
        use time::macros::{date, datetime};
        use crate::store::LogEntry;

        let row = EducatorLogRow {
            log: LogEntry {
                id: 1,
                child_id: 2,
                date: date!(2025 - 07 - 01),
                in_time: Some("08:30".to_owned()),
                out_time: None,
                activities: Some("blocks\r\nthen a nap".to_owned()),
                teacher: Some("Ms Jenny".to_owned()),
                logged: datetime!(2025-07-01 15:10 UTC),
            },
            first_name: Some("Evie".to_owned()),
            last_name: Some("Tan".to_owned()),
            status: Some("Enrolled".to_owned()),
        };

        let activities = LOG_COLUMNS.iter()
            .find(|(label, _)| *label == "Activities")
            .map(|(_, get)| get(&row))
            .unwrap();
        assert_eq!(activities, "blocks  then a nap");

        let name = LOG_COLUMNS.iter()
            .find(|(label, _)| *label == "Child Name")
            .map(|(_, get)| get(&row))
            .unwrap();
        assert_eq!(name, "Evie Tan");
    }
}
