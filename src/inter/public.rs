/*!
Handlers for the public-facing routes: the brochure pages, the contact
form, login/logout, the members-only dispatch, and the password-reset
flow.
*/
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::header::HeaderMap,
    Form,
};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::RwLock;

use crate::{
    auth::{AuthResult, Deny},
    config::Glob,
    session::{self, Session, SESSION_COOKIE},
    user::Role,
};
use super::*;

pub async fn home() -> Response {
    serve_template(StatusCode::OK, "home", &json!({}), vec![])
}

pub async fn login_page() -> Response {
    serve_template(StatusCode::OK, "login", &json!({}), vec![])
}

pub async fn aboutus() -> Response {
    serve_template(StatusCode::OK, "aboutus", &json!({}), vec![])
}

pub async fn gallery() -> Response {
    serve_template(StatusCode::OK, "gallery", &json!({}), vec![])
}

pub async fn thankyou() -> Response {
    serve_template(StatusCode::OK, "thankyou", &json!({}), vec![])
}

/// `POST /auth`: the one place a password crosses from browser to portal.
pub async fn authenticate(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<LoginData>,
) -> Response {
    log::trace!("authenticate( {:?}, [ password ] ) called.", &form.email);

    if form.email.is_empty() || form.password.is_empty() {
        return serve_notice(
            StatusCode::BAD_REQUEST,
            "Please enter Email and Password!",
            "Back to Login",
            "/login",
        );
    }

    let auth_response = {
        glob.read().await.store.authenticate(&form.email, &form.password).await
    };

    let user = match auth_response {
        Err(e) => {
            log::error!(
                "Error: Store::authenticate( {:?}, ... ): {}", &form.email, &e
            );
            return html_500();
        },
        Ok(AuthResult::User(u)) => u,
        Ok(AuthResult::NoSuchUser) | Ok(AuthResult::BadPassword) => {
            // Same page either way; see respond_bad_password().
            return respond_bad_password();
        },
    };

    let token = {
        let mut glob = glob.write().await;
        glob.sessions.issue(Session {
            email: user.email,
            username: user.username,
            role: user.role,
        })
    };

    redirect_with_cookie(
        "/membersOnly",
        &format!("{}={}; Path=/; HttpOnly; SameSite=Lax", SESSION_COOKIE, &token),
    )
}

pub async fn logout(
    headers: HeaderMap,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("logout( ... ) called.");

    if let Some(token) = session_token(&headers) {
        glob.write().await.sessions.destroy(&token);
    }

    redirect_with_cookie(
        "/login",
        &format!("{}=; Path=/; HttpOnly; Max-Age=0", SESSION_COOKIE),
    )
}

/// `GET /membersOnly`: the role dispatch. One gate check, then each role
/// gets its own dashboard (with its own pagination parameters).
pub async fn members_only(
    headers: HeaderMap,
    Query(params): Query<PageParams>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("members_only( {:?} ) called.", &params);

    let session = match require_role(&headers, &glob, None).await {
        Ok(s) => s,
        Err(r) => { return r; },
    };

    match session.role {
        Role::Admin => admin::dashboard(&session, &glob).await,
        Role::Teacher => teacher::enrolled_dashboard(
            &session, &glob, params.page(), crate::page::ENROLLED_PAGE_SIZE
        ).await,
        Role::Parent => parent::dashboard(&session, &glob, &params).await,
        // The gate already denied this, but the fallback lives here too.
        Role::Deactivated => respond_denied(Deny::Deactivated),
    }
}

pub async fn contact_page() -> Response {
    serve_template(StatusCode::OK, "contactus", &json!({}), vec![])
}

#[derive(Deserialize, Debug)]
pub struct ContactData {
    pub fname: String,
    pub lname: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

/// `POST /contactus`: store the message, then relay it to the center's
/// inbox from a background task. The row is already committed by the time
/// the mail goes out, so a dead SMTP server loses nothing.
pub async fn contact_submit(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ContactData>,
) -> Response {
    log::trace!("contact_submit( {:?} {:?} ) called.", &form.fname, &form.lname);

    {
        let glob = glob.read().await;
        if let Err(e) = glob.store.insert_message(
            &form.fname, &form.lname, &form.email, &form.phone, &form.message
        ).await {
            log::error!("Error inserting contact message: {}", &e);
            return text_500(Some(
                "An error occurred while submitting the form.".to_owned()
            ));
        }

        let body = format!(
            "You received a new contact form message:\n\n\
             First Name: {}\nLast Name: {}\nEmail: {}\nPhone: {}\n\n\
             Message:\n{}\n",
            &form.fname, &form.lname, &form.email, &form.phone, &form.message
        );
        glob.mailer.send_detached(
            glob.contact_recipient.clone(),
            format!("New Inquiry Contact Form Submission from {} {}",
                &form.fname, &form.lname),
            body,
        );
    }

    redirect("/thankyou")
}

pub async fn forgot_password_page() -> Response {
    serve_template(StatusCode::OK, "forgot_password", &json!({}), vec![])
}

#[derive(Deserialize, Debug)]
pub struct ForgotPasswordData {
    pub email: String,
}

/// `POST /forgot-password`. The response is the same whether or not the
/// address matched an account, so the form can't be used to enumerate
/// who has one; only a matching account actually gets a token and a mail.
pub async fn forgot_password(
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ForgotPasswordData>,
) -> Response {
    log::trace!("forgot_password( {:?} ) called.", &form.email);

    if form.email.is_empty() {
        return serve_notice(
            StatusCode::BAD_REQUEST,
            "Email is required.",
            "Back",
            "/forgot-password",
        );
    }

    let token = session::generate_reset_token();

    {
        let glob = glob.read().await;
        match glob.store.issue_reset_token(&form.email, &token).await {
            Err(e) => {
                log::error!(
                    "Error issuing reset token for {:?}: {}", &form.email, &e
                );
                return html_500();
            },
            Ok(false) => {
                log::info!(
                    "Password reset requested for unknown address {:?}.",
                    &form.email
                );
            },
            Ok(true) => {
                let reset_link = format!(
                    "{}/reset-password/{}", &glob.base_url, &token
                );
                let body = format!(
                    "We received a request to reset the password for your \
                     account.\n\nFollow this link to choose a new password:\n\
                     {}\n\nIf you did not request this, you can safely ignore \
                     this email. The link will expire in 1 hour.\n",
                    &reset_link
                );
                glob.mailer.send_detached(
                    form.email.clone(),
                    "Password Reset - Sprout Childcare Portal".to_owned(),
                    body,
                );
            },
        }
    }

    serve_notice(
        StatusCode::OK,
        "If that address has an account, a reset link has been sent to it.",
        "Back to Login",
        "/login",
    )
}

pub async fn reset_password_page(
    Path(token): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
) -> Response {
    log::trace!("reset_password_page( [ token ] ) called.");

    let lookup = {
        glob.read().await.store.user_by_reset_token(&token).await
    };

    match lookup {
        Err(e) => {
            log::error!("Error verifying reset token: {}", &e);
            html_500()
        },
        Ok(None) => serve_notice(
            StatusCode::NOT_FOUND,
            "Password reset link is invalid or has expired.",
            "Back to Login",
            "/login",
        ),
        Ok(Some(_)) => serve_template(
            StatusCode::OK,
            "reset_password",
            &json!({ "token": &token }),
            vec![]
        ),
    }
}

#[derive(Deserialize, Debug)]
pub struct ResetPasswordData {
    pub password: String,
}

/// `POST /reset-password/:token`: one conditional UPDATE validates and
/// spends the token, so a token racing itself can only win once.
pub async fn reset_password(
    Path(token): Path<String>,
    Extension(glob): Extension<Arc<RwLock<Glob>>>,
    Form(form): Form<ResetPasswordData>,
) -> Response {
    log::trace!("reset_password( [ token ] ) called.");

    if form.password.is_empty() {
        return serve_notice(
            StatusCode::BAD_REQUEST,
            "Please supply a new password.",
            "Back",
            "/login",
        );
    }

    let hash = match crate::auth::hash_password(&form.password) {
        Ok(h) => h,
        Err(e) => {
            log::error!("{}", &e);
            return html_500();
        },
    };

    let consumed = {
        glob.read().await.store.consume_reset_token(&token, &hash).await
    };

    match consumed {
        Err(e) => {
            log::error!("Error consuming reset token: {}", &e);
            html_500()
        },
        Ok(false) => serve_notice(
            StatusCode::NOT_FOUND,
            "Invalid or expired reset link.",
            "Back to Login",
            "/login",
        ),
        Ok(true) => serve_notice(
            StatusCode::OK,
            "Password updated successfully.",
            "Back to Login",
            "/login",
        ),
    }
}
