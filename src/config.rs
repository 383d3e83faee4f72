/*!
Configuration and the `Glob` of shared state handed to request handlers.

Settings come from three layers, later ones winning: compiled-in defaults,
an optional TOML config file, and environment variables (which is where a
deployment is expected to put the database credentials, SMTP credentials,
and listen port).
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    auth,
    mail::Mailer,
    session::Sessions,
    store::Store,
};

#[derive(Deserialize)]
struct ConfigFile {
    db_connect_string: Option<String>,
    admin_email: Option<String>,
    admin_username: Option<String>,
    admin_password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    base_url: Option<String>,
    smtp_host: Option<String>,
    smtp_user: Option<String>,
    smtp_password: Option<String>,
    mail_from: Option<String>,
    contact_recipient: Option<String>,
    template_dir: Option<String>,
    static_dir: Option<String>,
    upload_dir: Option<String>,
}

#[derive(Debug)]
pub struct Cfg {
    pub db_connect_string: String,
    pub default_admin_email: String,
    pub default_admin_username: String,
    pub default_admin_password: String,
    pub addr: SocketAddr,
    pub base_url: String,
    pub smtp_host: Option<String>,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    pub mail_from: String,
    pub contact_recipient: String,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            db_connect_string: "host=localhost user=sprout_test password='sprout_test' dbname=sprout_test".to_owned(),
            default_admin_email: "admin@sprout.not.an.address".to_owned(),
            default_admin_username: "admin".to_owned(),
            default_admin_password: "changeme".to_owned(),
            addr: SocketAddr::new("0.0.0.0".parse().unwrap(), 8001),
            base_url: "http://localhost:8001".to_owned(),
            smtp_host: None,
            smtp_user: None,
            smtp_password: None,
            mail_from: "portal@sprout.not.an.address".to_owned(),
            contact_recipient: "admin@sprout.not.an.address".to_owned(),
            template_dir: PathBuf::from("templates"),
            static_dir: PathBuf::from("static"),
            upload_dir: PathBuf::from("public/uploads"),
        }
    }
}

impl Cfg {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file: {}", &e))?;
        let cf: ConfigFile = toml::from_str(&file_contents)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.db_connect_string { c.db_connect_string = s; }
        if let Some(s) = cf.admin_email { c.default_admin_email = s; }
        if let Some(s) = cf.admin_username { c.default_admin_username = s; }
        if let Some(s) = cf.admin_password { c.default_admin_password = s; }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}", &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port { c.addr.set_port(n); }
        if let Some(s) = cf.base_url { c.base_url = s; }
        if let Some(s) = cf.smtp_host { c.smtp_host = Some(s); }
        if let Some(s) = cf.smtp_user { c.smtp_user = Some(s); }
        if let Some(s) = cf.smtp_password { c.smtp_password = Some(s); }
        if let Some(s) = cf.mail_from { c.mail_from = s; }
        if let Some(s) = cf.contact_recipient { c.contact_recipient = s; }
        if let Some(s) = cf.template_dir { c.template_dir = PathBuf::from(s); }
        if let Some(s) = cf.static_dir { c.static_dir = PathBuf::from(s); }
        if let Some(s) = cf.upload_dir { c.upload_dir = PathBuf::from(s); }

        Ok(c)
    }

    /// Fold environment variables over whatever the defaults and config
    /// file produced. Deployment secrets belong here, not in the file.
    pub fn apply_env(&mut self) -> Result<(), String> {
        if let Ok(s) = std::env::var("SPROUT_DB") { self.db_connect_string = s; }
        if let Ok(s) = std::env::var("SPROUT_HOST") {
            self.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing SPROUT_HOST {:?} as IP address: {}", &s, &e
                ))?
            );
        }
        if let Ok(s) = std::env::var("SPROUT_PORT") {
            let n: u16 = s.parse().map_err(|e| format!(
                "Error parsing SPROUT_PORT {:?}: {}", &s, &e
            ))?;
            self.addr.set_port(n);
        }
        if let Ok(s) = std::env::var("SPROUT_BASE_URL") { self.base_url = s; }
        if let Ok(s) = std::env::var("SMTP_HOST") { self.smtp_host = Some(s); }
        if let Ok(s) = std::env::var("SMTP_USER") { self.smtp_user = Some(s); }
        if let Ok(s) = std::env::var("SMTP_PASSWORD") { self.smtp_password = Some(s); }
        if let Ok(s) = std::env::var("MAIL_FROM") { self.mail_from = s; }
        if let Ok(s) = std::env::var("CONTACT_RECIPIENT") { self.contact_recipient = s; }
        if let Ok(s) = std::env::var("ADMIN_EMAIL") { self.default_admin_email = s; }
        if let Ok(s) = std::env::var("ADMIN_PASSWORD") { self.default_admin_password = s; }

        Ok(())
    }

    /// Defaults, then the config file (if it exists), then the environment.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let mut cfg = if path.exists() {
            Cfg::from_file(path)?
        } else {
            log::info!(
                "No config file at {}; starting from defaults.", path.display()
            );
            Cfg::default()
        };
        cfg.apply_env()?;
        Ok(cfg)
    }
}

/**
This guy hauls around the shared state and gets passed in an
`axum::Extension` to the handlers who need him.
*/
pub struct Glob {
    pub store: Store,
    pub sessions: Sessions,
    pub mailer: Mailer,
    pub addr: SocketAddr,
    pub base_url: String,
    pub contact_recipient: String,
    pub template_dir: PathBuf,
    pub static_dir: PathBuf,
    pub upload_dir: PathBuf,
}

/// Loads system configuration and ensures all appropriate database tables
/// exist.
///
/// Also assures existence of the default admin account, so a fresh install
/// has someone who can log in.
pub async fn load_configuration<P: AsRef<Path>>(path: P) -> Result<Glob, String> {
    let cfg = Cfg::load(path)?;
    log::info!("Configuration loaded:\n{:#?}", &cfg);

    log::trace!("Checking state of DB...");
    let store = Store::new(cfg.db_connect_string.clone());
    if let Err(e) = store.ensure_db_schema().await {
        let estr = format!("Unable to ensure state of DB: {}", &e);
        return Err(estr);
    }
    log::trace!("...DB okay.");

    log::trace!("Checking existence of default admin...");
    match store.get_user_by_email(&cfg.default_admin_email).await {
        Err(e) => {
            let estr = format!(
                "Error attempting to check existence of default admin ({}): {}",
                &cfg.default_admin_email, &e
            );
            return Err(estr);
        },
        Ok(Some(_)) => {
            log::trace!("Default admin exists.");
        },
        Ok(None) => {
            log::info!(
                "Default admin ({}) doesn't exist; inserting.",
                &cfg.default_admin_email
            );
            let hash = auth::hash_password(&cfg.default_admin_password)?;
            if let Err(e) = store.insert_user(
                &cfg.default_admin_email,
                &cfg.default_admin_username,
                &hash,
                crate::user::Role::Admin,
            ).await {
                let estr = format!(
                    "Error inserting default admin: {:?}", &e
                );
                return Err(estr);
            }
            log::warn!(
                "Default admin inserted with the configured default password; change it."
            );
        },
    }

    let mailer = Mailer::new(
        cfg.smtp_host.as_deref(),
        cfg.smtp_user.as_deref(),
        cfg.smtp_password.as_deref(),
        &cfg.mail_from,
    )?;

    let glob = Glob {
        store,
        sessions: Sessions::new(),
        mailer,
        addr: cfg.addr,
        base_url: cfg.base_url,
        contact_recipient: cfg.contact_recipient,
        template_dir: cfg.template_dir,
        static_dir: cfg.static_dir,
        upload_dir: cfg.upload_dir,
    };

    Ok(glob)
}
