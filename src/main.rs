/*!
Here we go!
*/
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, get_service, post},
    Router,
};
use simplelog::{ColorChoice, TerminalMode, TermLogger};
use tokio::sync::RwLock;
use tower_http::services::fs::ServeDir;

use sprout::config;
use sprout::inter::{self, admin, public, teacher};

const DEFAULT_CONFIG_FILE: &str = "sprout.toml";

// Child pictures come through the enrollment form; 8 MB covers a phone
// photo with room to spare.
const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

async fn catchall_error_handler(e: std::io::Error) -> impl IntoResponse {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        format!("Unhandled internal error: {}", &e)
    )
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("sprout")
        .build();
    TermLogger::init(
        sprout::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ).unwrap();
    log::info!("Logging started.");

    let config_path = std::env::var("SPROUT_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_owned());
    let glob = config::load_configuration(&config_path).await.unwrap();

    inter::init(&glob.template_dir).unwrap();

    if let Err(e) = std::fs::create_dir_all(&glob.upload_dir) {
        log::error!(
            "Unable to create upload directory {}: {}",
            glob.upload_dir.display(), &e
        );
        std::process::exit(1);
    }

    let serve_static = get_service(ServeDir::new(&glob.static_dir))
        .handle_error(catchall_error_handler);
    let serve_uploads = get_service(ServeDir::new(&glob.upload_dir))
        .handle_error(catchall_error_handler);

    let addr = glob.addr;
    let glob = Arc::new(RwLock::new(glob));

    let app = Router::new()
        .route("/", get(public::home))
        .route("/login", get(public::login_page))
        .route("/auth", post(public::authenticate))
        .route("/logout", get(public::logout))
        .route("/membersOnly", get(public::members_only))
        .route("/aboutus", get(public::aboutus))
        .route("/gallery", get(public::gallery))
        .route("/contactus",
            get(public::contact_page).post(public::contact_submit))
        .route("/thankyou", get(public::thankyou))
        .route("/forgot-password",
            get(public::forgot_password_page).post(public::forgot_password))
        .route("/reset-password/:token",
            get(public::reset_password_page).post(public::reset_password))
        .route("/admin/dashboard", get(admin::dashboard_page))
        .route("/admin/newEnrollments",
            get(admin::new_enrollments_page).post(admin::new_enrollments))
        .route("/admin/childDetails", get(admin::child_details))
        .route("/admin/edit-child/:id",
            get(admin::edit_child_page).post(admin::edit_child))
        .route("/admin/delete-child/:id", get(admin::delete_child))
        .route("/admin/user-management", get(admin::user_management))
        .route("/admin/add-user", post(admin::add_user))
        .route("/admin/edit-user/:email", post(admin::edit_user))
        .route("/admin/delete-user/:email", get(admin::delete_user))
        .route("/admin/view-messages", get(admin::view_messages))
        .route("/admin/educatorLogs", get(admin::educator_logs))
        .route("/export-messages", get(admin::export_messages))
        .route("/export-logs", get(admin::export_logs))
        .route("/export-register", get(admin::export_register))
        .route("/teacher/dashboard", get(teacher::dashboard))
        .route("/teacher/log-activity/:childId",
            get(teacher::log_activity_page).post(teacher::log_activity))
        .route("/teacher/view-attendance/:childId", get(teacher::view_attendance))
        .nest_service("/static", serve_static)
        .nest_service("/uploads", serve_uploads)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(Extension(glob));

    log::info!("Listening on {}", &addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
