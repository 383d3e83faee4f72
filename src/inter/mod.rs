/*!
Interoperation between the client (browser) and server.

(Not the application and the database; that's covered by `store`.)

Holds the template registry, the shared response helpers, and the glue
between incoming cookies and the session table; the actual route handlers
live in the per-audience submodules.
*/
use std::path::Path;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    http::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL, COOKIE, SET_COOKIE},
    response::{Html, IntoResponse, Redirect, Response},
};
use handlebars::{handlebars_helper, Handlebars};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    auth::{self, Deny},
    config::Glob,
    session::{self, Session},
    user::Role,
};

pub mod admin;
pub mod parent;
pub mod public;
pub mod teacher;

static TEMPLATES: OnceCell<Handlebars> = OnceCell::new();

static HTML_500: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>sprout | Error</title>
<link rel="stylesheet" href="/static/sprout.css">
</head>
<body>
<h1>Internal Server Error</h1>
<p>(Error 500)</p>
<p>Something went wrong on our end. No further or more
helpful information is available about the problem.</p>
</body>
</html>"#;

static TEXT_500: &str = "An internal error occurred; an appropriate response was inconstructable.";

trait AddHeaders: IntoResponse + Sized {
    fn add_headers(self, mut new_headers: Vec<(HeaderName, HeaderValue)>) -> Response {
        let mut r = self.into_response();
        let r_headers = r.headers_mut();
        for (name, value) in new_headers.drain(..) {
            r_headers.insert(name, value);
        }

        r
    }
}

impl<T: IntoResponse + Sized> AddHeaders for T {}

/// Data type to read the form data from a front-page login request.
#[derive(serde::Deserialize, Debug)]
pub struct LoginData {
    pub email: String,
    pub password: String,
}

/// Query parameters the paged views share. `page` stays a string here so
/// `?page=banana` falls back to page 1 instead of failing extraction.
#[derive(serde::Deserialize, Debug, Default)]
pub struct PageParams {
    pub page: Option<String>,
    #[serde(rename = "childId")]
    pub child_id: Option<String>,
}

impl PageParams {
    pub fn page(&self) -> u32 {
        crate::page::parse_page(self.page.as_deref())
    }
}

/**
Initializes the resources used in this module. This function should be called
before any functionality of this module or any of its submodules is used.

Currently the only thing that happens here is loading the templates used by
`serve_template()`, which will panic unless `init()` has been called first.

The argument is the path to the directory where the templates used by
`serve_template()` can be found.
*/
pub fn init<P: AsRef<Path>>(template_dir: P) -> Result<(), String> {
    if TEMPLATES.get().is_some() {
        log::warn!("Templates directory already initialized; ignoring.");
        return Ok(())
    }

    let template_dir = template_dir.as_ref();

    let mut h = Handlebars::new();
    #[cfg(debug_assertions)]
    h.set_dev_mode(true);
    // For prev/next pagination links.
    handlebars_helper!(add: |a: i64, b: i64| a + b);
    h.register_helper("add", Box::new(add));
    h.register_templates_directory(".html", template_dir)
        .map_err(|e| format!(
            "Error registering templates directory {}: {}",
            template_dir.display(), &e
        ))?;

    TEMPLATES.set(h)
        .map_err(|old_h| {
            let mut estr = String::from("Templates directory already registered w/templates:");
            for template_name in old_h.get_templates().keys() {
                estr.push('\n');
                estr.push_str(template_name.as_str());
            }
            estr
        })?;

    Ok(())
}

/**
Return an HTML response in the case of an unrecoverable* error.

(*"Unrecoverable" from the perspective of fielding the current request,
not from the perspective of the program crashing.)
*/
pub fn html_500() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(HTML_500)
    ).into_response()
}

pub fn text_500(text: Option<String>) -> Response {
    match text {
        Some(text) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            text
        ).into_response(),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            TEXT_500.to_owned()
        ).into_response()
    }
}

pub fn serve_template<S>(
    code: StatusCode,
    template_name: &str,
    data: &S,
    addl_headers: Vec<(HeaderName, HeaderValue)>
) -> Response
where
    S: Serialize + std::fmt::Debug
{
    log::trace!("serve_template( {}, {:?}, ... ) called.", &code, template_name);

    match TEMPLATES.get().unwrap().render(template_name, data) {
        Ok(response_body) => {
            // Authenticated pages must never come out of a cache.
            let mut headers = vec![(
                CACHE_CONTROL, HeaderValue::from_static("no-store")
            )];
            headers.extend(addl_headers);
            (code, Html(response_body)).add_headers(headers)
        },
        Err(e) => {
            log::error!(
                "Error rendering template {:?} with data {:?}:\n{}",
                template_name, data, &e
            );
            html_500()
        },
    }
}

/// The styled notice-plus-button page the portal uses for login prompts,
/// denials, and one-line outcomes.
pub fn serve_notice(
    code: StatusCode,
    message: &str,
    link_text: &str,
    link_href: &str,
) -> Response {
    let data = json!({
        "message": message,
        "link_text": link_text,
        "link_href": link_href,
    });

    serve_template(code, "notice", &data, vec![])
}

pub fn respond_bad_password() -> Response {
    log::trace!("respond_bad_password() called.");

    // One message for both bad-email and bad-password, so the login form
    // can't be used to find out which addresses have accounts.
    serve_notice(
        StatusCode::UNAUTHORIZED,
        "Incorrect Email or Password",
        "Back to Login",
        "/login",
    )
}

pub fn respond_bad_request(msg: String) -> Response {
    log::trace!("respond_bad_request( {:?} ) called.", &msg);

    (
        StatusCode::BAD_REQUEST,
        msg
    ).into_response()
}

pub fn respond_not_found(msg: &str) -> Response {
    log::trace!("respond_not_found( {:?} ) called.", msg);

    serve_notice(StatusCode::NOT_FOUND, msg, "Back", "/membersOnly")
}

/// Each denial reason gets its own page; the three must stay
/// distinguishable to the person staring at them.
pub fn respond_denied(deny: Deny) -> Response {
    log::trace!("respond_denied( {:?} ) called.", &deny);

    match deny {
        Deny::NotLoggedIn => serve_notice(
            StatusCode::UNAUTHORIZED,
            deny.message(),
            "Back to Login",
            "/login",
        ),
        Deny::WrongRole => serve_notice(
            StatusCode::FORBIDDEN,
            deny.message(),
            "Back to Login",
            "/login",
        ),
        Deny::Deactivated => {
            let data = json!({ "message": deny.message() });
            serve_template(StatusCode::FORBIDDEN, "access_denied", &data, vec![])
        },
    }
}

pub fn redirect(to: &str) -> Response {
    Redirect::to(to).into_response()
}

/// Redirect with a `Set-Cookie` header, for login/logout.
pub fn redirect_with_cookie(to: &str, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(v) => Redirect::to(to).add_headers(vec![(SET_COOKIE, v)]),
        Err(e) => {
            log::error!("Error converting {:?} into header value: {}", cookie, &e);
            html_500()
        },
    }
}

/// Pull the session token, if any, out of the request's cookies.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let cookie_header = headers.get(COOKIE)?;
    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Unreadable Cookie header: {}", &e);
            return None;
        },
    };
    session::token_from_cookie_header(cookie_str).map(str::to_owned)
}

/// The live session for this request, if its cookie names one.
pub async fn current_session(
    headers: &HeaderMap,
    glob: &Arc<RwLock<Glob>>,
) -> Option<Session> {
    let token = session_token(headers)?;
    glob.read().await.sessions.get(&token).cloned()
}

/// The access gate as handlers invoke it: evaluate the session against a
/// required role and hand back either the session or the response that
/// turns the request away.
pub async fn require_role(
    headers: &HeaderMap,
    glob: &Arc<RwLock<Glob>>,
    required: Option<Role>,
) -> Result<Session, Response> {
    let session = current_session(headers, glob).await;
    match auth::authorize(session.as_ref(), required) {
        // The gate only passes requests that have a session.
        Ok(()) => Ok(session.unwrap()),
        Err(deny) => {
            log::trace!("Gate denied request: {:?}", &deny);
            Err(respond_denied(deny))
        },
    }
}
