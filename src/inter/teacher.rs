/*!
Handlers for the teacher's side of the portal: the enrolled-children
dashboard, the daily activity log form, and the per-child attendance view.

Teachers only ever see children whose status is 'Enrolled'; every lookup
here goes through `Store::enrolled_child_by_id` or `Store::enrolled_page`.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::header::HeaderMap,
    Form,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;
use tokio::sync::RwLock;

use crate::{
    config::Glob,
    page,
    session::Session,
    store::Child,
    user::Role,
    FORM_DATE_FMT,
};
use super::*;

/// Render the paged enrolled-children dashboard for an established
/// teacher session. The members-only dispatch and the direct dashboard
/// route both land here, with different page sizes.
pub async fn enrolled_dashboard(
    session: &Session,
    glob: &Arc<RwLock<Glob>>,
    pg: u32,
    page_size: u32,
) -> Response {
    log::trace!(
        "teacher::enrolled_dashboard( {:?}, {}, {} ) called.",
        &session.email, pg, page_size
    );

    let children = {
        glob.read().await.store.enrolled_page(pg, page_size).await
    };
    match children {
        Ok(pg) => serve_template(
            StatusCode::OK,
            "teacher_dashboard",
            &json!({
                "teacher_name": &session.username,
                "teacher_email": &session.email,
                "children": &pg.items,
                "current_page": pg.current_page,
                "total_pages": pg.total_pages,
            }),
            vec![]
        ),
        Err(e) => {
            log::error!("Error fetching enrolled children: {}", &e);
            html_500()
        },
    }
}

pub async fn dashboard(
    headers: HeaderMap,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    let session = match require_role(&headers, &glob, Some(Role::Teacher)).await {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    enrolled_dashboard(
        &session, &glob, params.page(), page::REGISTER_PAGE_SIZE
    ).await
}

async fn enrolled_child(
    glob: &Arc<RwLock<Glob>>,
    id_str: &str,
) -> Result<Child, Response> {
    let id: i64 = match id_str.parse() {
        Ok(n) => n,
        Err(_) => {
            return Err(respond_bad_request(format!("Bad child id: {:?}", id_str)));
        },
    };

    let child = {
        glob.read().await.store.enrolled_child_by_id(id).await
    };
    match child {
        Err(e) => {
            log::error!("Error fetching child {}: {}", id, &e);
            Err(html_500())
        },
        Ok(None) => Err(respond_not_found("Child not found")),
        Ok(Some(c)) => Ok(c),
    }
}

#[derive(Deserialize, Debug)]
pub struct LogActivityParams {
    pub success: Option<String>,
}

/// `GET /teacher/log-activity/:childId`: the daily log form.
pub async fn log_activity_page(
    headers: HeaderMap,
    Path(child_id): Path<String>,
    Query(params): Query<LogActivityParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("teacher::log_activity_page( {:?} ) called.", &child_id);

    let session = match require_role(&headers, &glob, Some(Role::Teacher)).await {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    let child = match enrolled_child(&glob, &child_id).await {
        Ok(c) => c,
        Err(r) => { return r; },
    };

    let data = json!({
        "child": &child,
        "teacher_name": &session.username,
        "success": params.success.as_deref() == Some("1"),
    });
    serve_template(StatusCode::OK, "log_activity", &data, vec![])
}

#[derive(Deserialize, Debug)]
pub struct LogActivityData {
    pub date: String,
    pub in_time: Option<String>,
    pub out_time: Option<String>,
    pub activities: Option<String>,
}

/// `POST /teacher/log-activity/:childId`: record the day. The educator
/// name written into the log is the logged-in teacher's, not a form field.
pub async fn log_activity(
    headers: HeaderMap,
    Path(child_id): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LogActivityData>,
) -> Response {
    log::trace!(
        "teacher::log_activity( {:?}, {:?} ) called.", &child_id, &form.date
    );

    let session = match require_role(&headers, &glob, Some(Role::Teacher)).await {
        Ok(s) => s,
        Err(r) => { return r; },
    };
    let child = match enrolled_child(&glob, &child_id).await {
        Ok(c) => c,
        Err(r) => { return r; },
    };

    let date = match Date::parse(&form.date, FORM_DATE_FMT) {
        Ok(d) => d,
        Err(e) => {
            log::warn!("Unparseable log date {:?}: {}", &form.date, &e);
            return respond_bad_request(format!("Bad date: {:?}", &form.date));
        },
    };

    let res = {
        glob.read().await.store.insert_log(
            child.id,
            date,
            form.in_time.as_deref().filter(|s| !s.is_empty()),
            form.out_time.as_deref().filter(|s| !s.is_empty()),
            form.activities.as_deref().filter(|s| !s.is_empty()),
            &session.username,
        ).await
    };
    match res {
        Ok(()) => redirect(&format!("/teacher/log-activity/{}?success=1", child.id)),
        Err(e) => {
            log::error!("Error saving activity log: {}", &e);
            html_500()
        },
    }
}

/// `GET /teacher/view-attendance/:childId`: a child's logs, newest first,
/// one window at a time.
pub async fn view_attendance(
    headers: HeaderMap,
    Path(child_id): Path<String>,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!(
        "teacher::view_attendance( {:?}, {:?} ) called.", &child_id, &params
    );

    if let Err(r) = require_role(&headers, &glob, Some(Role::Teacher)).await {
        return r;
    }
    let child = match enrolled_child(&glob, &child_id).await {
        Ok(c) => c,
        Err(r) => { return r; },
    };

    let logs = {
        glob.read().await.store
            .logs_for_child_page(child.id, params.page()).await
    };
    match logs {
        Ok(pg) => serve_template(
            StatusCode::OK,
            "view_attendance",
            &json!({
                "child": &child,
                "logs": &pg.items,
                "current_page": pg.current_page,
                "total_pages": pg.total_pages,
            }),
            vec![]
        ),
        Err(e) => {
            log::error!("Error fetching attendance logs: {}", &e);
            html_500()
        },
    }
}
