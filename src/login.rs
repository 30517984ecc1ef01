use crate::app::{self, AppState};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use axum::{
    Extension, Form,
    extract::{Path as AxumPath, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, create_dir_all};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

const SESSION_DURATION: u64 = 24 * 60 * 60; // 24 hours in seconds
const CONFIRM_TOKEN_DURATION: u64 = 60 * 60; // 1 hour in seconds

/// Per-user dashboard preferences
///
/// Field names and defaults mirror the settings form; HTML checkboxes are
/// absent when unchecked, which the settings handler maps to `false`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserSettings {
    #[serde(default)]
    pub dark_mode: bool,
    #[serde(default = "default_primary_color")]
    pub primary_color: String,
    #[serde(default = "default_card_layout")]
    pub card_layout: String,
    #[serde(default = "default_date_range")]
    pub date_range: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_true")]
    pub email_alerts: bool,
    #[serde(default)]
    pub daily_summary: bool,
    #[serde(default = "default_true")]
    pub weekly_summary: bool,
    #[serde(default = "default_true")]
    pub show_earnings: bool,
    #[serde(default = "default_true")]
    pub show_ratings: bool,
    #[serde(default = "default_true")]
    pub show_orders: bool,
    #[serde(default = "default_true")]
    pub show_messages: bool,
    #[serde(default = "default_page")]
    pub default_page: String,
    #[serde(default = "default_export_format")]
    pub export_format: String,
}

fn default_primary_color() -> String {
    "#1dbf73".to_string()
}
fn default_card_layout() -> String {
    "grid".to_string()
}
fn default_date_range() -> String {
    "month".to_string()
}
fn default_currency() -> String {
    "₹".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_page() -> String {
    "home".to_string()
}
fn default_export_format() -> String {
    "excel".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for UserSettings {
    fn default() -> Self {
        UserSettings {
            dark_mode: false,
            primary_color: default_primary_color(),
            card_layout: default_card_layout(),
            date_range: default_date_range(),
            currency: default_currency(),
            language: default_language(),
            email_alerts: true,
            daily_summary: false,
            weekly_summary: true,
            show_earnings: true,
            show_ratings: true,
            show_orders: true,
            show_messages: true,
            default_page: default_page(),
            export_format: default_export_format(),
        }
    }
}

/// A registered application user
///
/// Accounts start unverified; the confirmation token is cleared once the
/// emailed link is followed.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    /// Username (unique key in the store)
    pub username: String,

    /// Email address (also unique)
    pub email: String,

    /// Argon2 hash of the user's password
    pub password_hash: String,

    /// Filename of the profile picture
    #[serde(default = "default_profile_picture")]
    pub profile_picture: String,

    /// Account creation timestamp
    pub created_at: DateTime<Utc>,

    /// Whether the email address has been confirmed
    #[serde(default)]
    pub is_verified: bool,

    /// Pending email-confirmation token, if one is outstanding
    #[serde(default)]
    pub confirm_token: Option<String>,

    /// Expiration time for the confirmation token
    #[serde(default)]
    pub confirm_token_expires: Option<SystemTime>,

    /// Dashboard preferences
    #[serde(default)]
    pub settings: UserSettings,
}

fn default_profile_picture() -> String {
    "default.jpg".to_string()
}

/// An authenticated user session
#[derive(Debug, Clone)]
pub struct Session {
    /// Username of the authenticated user
    pub user_id: String,

    /// Time when the session expires
    pub expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref COLOR_RE: Regex = Regex::new(r"^#[0-9a-fA-F]{6}$").unwrap();
}

/// JSON-file backed store of registered users
///
/// The whole users map is read, modified and rewritten per operation; at the
/// scale of this application that beats carrying a database around.
pub struct UserStore {
    users_file: PathBuf,
    database_dir: PathBuf,
}

impl UserStore {
    pub fn new(database_dir: impl Into<PathBuf>) -> Self {
        let database_dir = database_dir.into();
        UserStore {
            users_file: database_dir.join("users.json"),
            database_dir,
        }
    }

    /// Create the database directory and users file if they don't exist
    ///
    /// Called once at startup, before any other store operation.
    pub fn init(&self) -> std::io::Result<()> {
        if !self.database_dir.exists() {
            create_dir_all(&self.database_dir)?;
        }
        if !self.users_file.exists() {
            let mut file = File::create(&self.users_file)?;
            file.write_all(b"{}")?;
        }
        Ok(())
    }

    /// Read all registered users
    ///
    /// # Returns
    /// * `Result<HashMap<String, User>, String>` - Map of usernames to users, or an error
    pub fn load(&self) -> Result<HashMap<String, User>, String> {
        let contents = match fs::read_to_string(&self.users_file) {
            Ok(contents) => contents,
            Err(_) => return Err("Failed to read users file".to_string()),
        };

        match serde_json::from_str(&contents) {
            Ok(users) => Ok(users),
            Err(_) => Err("Failed to parse users data".to_string()),
        }
    }

    /// Write the users map back to disk
    pub fn save(&self, users: &HashMap<String, User>) -> Result<(), String> {
        let json = match serde_json::to_string_pretty(users) {
            Ok(json) => json,
            Err(_) => return Err("Failed to serialize users data".to_string()),
        };

        match fs::write(&self.users_file, json) {
            Ok(()) => Ok(()),
            Err(_) => Err("Failed to write users file".to_string()),
        }
    }

    /// Register a new, unverified user
    ///
    /// Validates the fields, hashes the password and issues a confirmation
    /// token with a one-hour expiry.
    ///
    /// # Errors
    /// * Empty fields, malformed email, duplicate username or duplicate email
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<User, String> {
        if username.is_empty() || password.is_empty() || email.is_empty() {
            return Err("Username, email and password cannot be empty".to_string());
        }

        if !EMAIL_RE.is_match(email) {
            return Err("Please enter a valid email address".to_string());
        }

        let mut users = self.load()?;
        if users.contains_key(username) {
            return Err("Username already exists".to_string());
        }
        if users.values().any(|user| user.email == email) {
            return Err("Email already exists".to_string());
        }

        let password_hash = hash_password(password)?;

        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            profile_picture: default_profile_picture(),
            created_at: Utc::now(),
            is_verified: false,
            confirm_token: Some(Uuid::new_v4().to_string()),
            confirm_token_expires: Some(
                SystemTime::now() + Duration::from_secs(CONFIRM_TOKEN_DURATION),
            ),
            settings: UserSettings::default(),
        };

        users.insert(username.to_string(), user.clone());
        self.save(&users)?;

        Ok(user)
    }
}

/// Hash a password with Argon2id and a fresh salt
fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Check a plaintext password against a stored Argon2 hash
fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(_) => Ok(true),
        Err(_) => Ok(false), // Password didn't match
    }
}

/// Create a new session for an authenticated user
///
/// # Returns
/// * `String` - A unique session ID to put in the cookie
pub fn create_session(username: &str) -> String {
    let session_id = Uuid::new_v4().to_string();
    let session = Session {
        user_id: username.to_string(),
        expires_at: SystemTime::now() + Duration::from_secs(SESSION_DURATION),
    };

    let mut sessions = SESSIONS.write().unwrap();
    sessions.insert(session_id.clone(), session);

    session_id
}

/// Resolve a session ID to its username, if valid and unexpired
pub fn validate_session(session_id: &str) -> Option<String> {
    let sessions = SESSIONS.read().unwrap();

    if let Some(session) = sessions.get(session_id) {
        if session.expires_at > SystemTime::now() {
            return Some(session.user_id.clone());
        }
    }

    None
}

/// Remove a session
pub fn destroy_session(session_id: &str) {
    let mut sessions = SESSIONS.write().unwrap();
    sessions.remove(session_id);
}

/// Point every live session of `old` at `new`
///
/// Used when a user renames themselves on the profile page so they stay
/// logged in.
pub fn rename_sessions(old: &str, new: &str) {
    let mut sessions = SESSIONS.write().unwrap();
    for session in sessions.values_mut() {
        if session.user_id == old {
            session.user_id = new.to_string();
        }
    }
}

/// The user behind the request's session cookie, if any
pub fn current_user(store: &UserStore, jar: &CookieJar) -> Option<User> {
    let cookie = jar.get("session")?;
    let username = validate_session(cookie.value())?;
    store.load().ok()?.get(&username).cloned()
}

/// Redirect carrying a flash notice as a query parameter
///
/// The page templates read `error`, `success` and `info` from the query
/// string and render them as notices.
pub fn flash_redirect(path: &str, kind: &str, message: &str) -> Redirect {
    Redirect::to(&format!("{}?{}={}", path, kind, urlencoding::encode(message)))
}

// Form payloads

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendForm {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

/// Settings form; checkboxes only appear in the payload when checked
#[derive(Debug, Deserialize)]
pub struct SettingsForm {
    pub dark_mode: Option<String>,
    pub primary_color: Option<String>,
    pub card_layout: Option<String>,
    pub date_range: Option<String>,
    pub currency: Option<String>,
    pub language: Option<String>,
    pub email_alerts: Option<String>,
    pub daily_summary: Option<String>,
    pub weekly_summary: Option<String>,
    pub show_earnings: Option<String>,
    pub show_ratings: Option<String>,
    pub show_orders: Option<String>,
    pub show_messages: Option<String>,
    pub default_page: Option<String>,
    pub export_format: Option<String>,
}

// Web handlers

/// Serve the registration form
pub async fn serve_register(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ctx = app::page_context(&state, &jar, &query);
    app::render(&state, "register", &ctx)
}

/// Handle a registration submission
///
/// On success the account is created unverified and a confirmation email is
/// sent. If the email cannot be sent the account is kept and the user is
/// pointed at the resend page.
pub async fn handle_register(
    State(state): State<Arc<AppState>>,
    Form(form): Form<RegisterForm>,
) -> Redirect {
    if form.password != form.confirm_password {
        return flash_redirect("/register", "error", "Passwords do not match");
    }

    let user = match state.users.register(&form.username, &form.email, &form.password) {
        Ok(user) => user,
        Err(e) => return flash_redirect("/register", "error", &e),
    };

    let token = user.confirm_token.as_deref().unwrap_or_default();
    let confirm_url = format!("{}/confirm/{}", state.config.base_url, token);

    match send_confirmation(&state, &user, &confirm_url) {
        Ok(()) => flash_redirect(
            "/login",
            "success",
            "Registration successful! A confirmation email has been sent. Please verify your email to log in.",
        ),
        Err(e) => {
            log::error!("confirmation mail to {} failed: {}", user.email, e);
            flash_redirect(
                "/resend-confirmation",
                "error",
                "Registration successful, but the confirmation email could not be sent. You can request a new one below.",
            )
        }
    }
}

fn send_confirmation(
    state: &AppState,
    user: &User,
    confirm_url: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match &state.mailer {
        Some(mailer) => mailer.send_confirmation(&user.email, &user.username, confirm_url),
        None => Err("mail is not configured".into()),
    }
}

/// Handle a click on the emailed confirmation link
pub async fn confirm_email(
    State(state): State<Arc<AppState>>,
    AxumPath(token): AxumPath<String>,
) -> Redirect {
    let mut users = match state.users.load() {
        Ok(users) => users,
        Err(_) => return flash_redirect("/login", "error", "Server error"),
    };

    let username = users
        .values()
        .find(|u| u.confirm_token.as_deref() == Some(token.as_str()))
        .map(|u| u.username.clone());

    let Some(username) = username else {
        return flash_redirect("/login", "error", "Invalid confirmation link.");
    };

    let user = users.get_mut(&username).expect("username from the same map");

    if let Some(expires) = user.confirm_token_expires {
        if SystemTime::now() > expires {
            return flash_redirect(
                "/resend-confirmation",
                "error",
                "The confirmation link has expired. Please request a new confirmation email.",
            );
        }
    }

    if user.is_verified {
        return flash_redirect("/login", "info", "Account already verified. Please log in.");
    }

    user.is_verified = true;
    user.confirm_token = None;
    user.confirm_token_expires = None;

    if state.users.save(&users).is_err() {
        return flash_redirect("/login", "error", "Server error");
    }

    flash_redirect("/login", "success", "Email verified successfully! You can now log in.")
}

/// Serve the resend-confirmation form
pub async fn serve_resend(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ctx = app::page_context(&state, &jar, &query);
    app::render(&state, "resend_confirmation", &ctx)
}

/// Issue a fresh confirmation token and email it
pub async fn handle_resend(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ResendForm>,
) -> Redirect {
    let mut users = match state.users.load() {
        Ok(users) => users,
        Err(_) => return flash_redirect("/resend-confirmation", "error", "Server error"),
    };

    let username = users
        .values()
        .find(|u| u.email == form.email)
        .map(|u| u.username.clone());

    let Some(username) = username else {
        return flash_redirect("/resend-confirmation", "error", "No account found with that email.");
    };

    if users[&username].is_verified {
        return flash_redirect("/login", "info", "Email already verified. Please log in.");
    }

    let token = Uuid::new_v4().to_string();
    {
        let user = users.get_mut(&username).expect("username from the same map");
        user.confirm_token = Some(token.clone());
        user.confirm_token_expires =
            Some(SystemTime::now() + Duration::from_secs(CONFIRM_TOKEN_DURATION));
    }

    if state.users.save(&users).is_err() {
        return flash_redirect("/resend-confirmation", "error", "Server error");
    }

    let confirm_url = format!("{}/confirm/{}", state.config.base_url, token);
    match send_confirmation(&state, &users[&username], &confirm_url) {
        Ok(()) => flash_redirect("/login", "success", "A new confirmation email has been sent."),
        Err(e) => {
            log::error!("confirmation mail to {} failed: {}", form.email, e);
            flash_redirect(
                "/resend-confirmation",
                "error",
                "Could not send the confirmation email. Please try again later.",
            )
        }
    }
}

/// Serve the login form
pub async fn serve_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ctx = app::page_context(&state, &jar, &query);
    app::render(&state, "login", &ctx)
}

/// Handle a login submission
///
/// Unverified accounts are refused with a reminder; a successful login gets a
/// session cookie and lands on the home page.
pub async fn handle_login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let users = match state.users.load() {
        Ok(users) => users,
        Err(_) => return flash_redirect("/login", "error", "Server error").into_response(),
    };

    let Some(user) = users.get(&form.username) else {
        return flash_redirect("/login", "error", "Invalid username or password").into_response();
    };

    match verify_password(&form.password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => {
            return flash_redirect("/login", "error", "Invalid username or password")
                .into_response();
        }
        Err(_) => {
            return flash_redirect("/login", "error", "Authentication error").into_response();
        }
    }

    if !user.is_verified {
        return flash_redirect(
            "/login",
            "error",
            "Please verify your email before logging in. Check your inbox or resend the verification.",
        )
        .into_response();
    }

    let session_id = create_session(&user.username);
    let cookie = Cookie::new("session", session_id);
    (
        jar.add(cookie),
        flash_redirect("/", "success", "Login successful!"),
    )
        .into_response()
}

/// Clear the session and its cookie
pub async fn handle_logout(jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(cookie) = jar.get("session") {
        destroy_session(cookie.value());
    }

    (
        jar.remove(Cookie::from("session")),
        flash_redirect("/", "info", "You have been logged out"),
    )
}

/// Authentication middleware for the profile and settings pages
///
/// A valid session gets its username inserted as a request extension;
/// anything else is redirected to the login page.
pub async fn require_auth(
    jar: CookieJar,
    mut request: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    if let Some(session_cookie) = jar.get("session") {
        if let Some(username) = validate_session(session_cookie.value()) {
            request.extensions_mut().insert(username);
            return next.run(request).await;
        }
    }

    flash_redirect("/login", "error", "Please log in to access this page").into_response()
}

/// Serve the profile page (auth required)
pub async fn serve_profile(
    State(state): State<Arc<AppState>>,
    Extension(username): Extension<String>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let Some(_) = state.users.load().ok().and_then(|u| u.get(&username).cloned()) else {
        return flash_redirect("/login", "error", "Please log in to access this page")
            .into_response();
    };

    let ctx = app::page_context(&state, &jar, &query);
    app::render(&state, "profile", &ctx)
}

/// Apply a profile update (auth required)
///
/// Renaming the account moves the store entry and rewrites live sessions for
/// the old name. An optional password change requires a matching
/// confirmation; on mismatch the rest of the update is still saved.
pub async fn handle_profile(
    State(state): State<Arc<AppState>>,
    Extension(username): Extension<String>,
    Form(form): Form<ProfileForm>,
) -> Redirect {
    let mut users = match state.users.load() {
        Ok(users) => users,
        Err(_) => return flash_redirect("/profile", "error", "Server error"),
    };

    let new_username = form.username.trim().to_string();
    let new_email = form.email.trim().to_string();

    if new_username.is_empty() || new_email.is_empty() {
        return flash_redirect("/profile", "error", "Username and email cannot be empty");
    }
    if !EMAIL_RE.is_match(&new_email) {
        return flash_redirect("/profile", "error", "Please enter a valid email address");
    }
    if new_username != username && users.contains_key(&new_username) {
        return flash_redirect("/profile", "error", "Username already exists");
    }
    if users
        .values()
        .any(|u| u.username != username && u.email == new_email)
    {
        return flash_redirect("/profile", "error", "Email already exists");
    }

    let Some(mut user) = users.remove(&username) else {
        return flash_redirect("/login", "error", "Please log in to access this page");
    };

    user.username = new_username.clone();
    user.email = new_email;

    let mut password_mismatch = false;
    if !form.new_password.is_empty() {
        if form.new_password == form.confirm_password {
            match hash_password(&form.new_password) {
                Ok(hash) => user.password_hash = hash,
                Err(_) => return flash_redirect("/profile", "error", "Failed to update password"),
            }
        } else {
            password_mismatch = true;
        }
    }

    users.insert(new_username.clone(), user);
    if state.users.save(&users).is_err() {
        return flash_redirect("/profile", "error", "Failed to save profile");
    }

    if new_username != username {
        rename_sessions(&username, &new_username);
    }

    if password_mismatch {
        flash_redirect("/profile", "error", "Passwords do not match")
    } else {
        flash_redirect("/profile", "success", "Profile updated successfully")
    }
}

/// Serve the settings page (auth required)
pub async fn serve_settings(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ctx = app::page_context(&state, &jar, &query);
    app::render(&state, "settings", &ctx)
}

/// Apply a settings update (auth required)
pub async fn handle_settings(
    State(state): State<Arc<AppState>>,
    Extension(username): Extension<String>,
    Form(form): Form<SettingsForm>,
) -> Redirect {
    let mut users = match state.users.load() {
        Ok(users) => users,
        Err(_) => return flash_redirect("/settings", "error", "Server error"),
    };

    let Some(user) = users.get_mut(&username) else {
        return flash_redirect("/login", "error", "Please log in to access this page");
    };

    let settings = &mut user.settings;

    // Theme & appearance
    settings.dark_mode = form.dark_mode.is_some();
    if let Some(color) = form.primary_color {
        if COLOR_RE.is_match(&color) {
            settings.primary_color = color;
        }
    }
    settings.card_layout = form.card_layout.unwrap_or_else(default_card_layout);

    // Data preferences
    settings.date_range = form.date_range.unwrap_or_else(default_date_range);
    settings.currency = form.currency.unwrap_or_else(default_currency);
    settings.language = form.language.unwrap_or_else(default_language);

    // Notifications
    settings.email_alerts = form.email_alerts.is_some();
    settings.daily_summary = form.daily_summary.is_some();
    settings.weekly_summary = form.weekly_summary.is_some();

    // Dashboard customization
    settings.show_earnings = form.show_earnings.is_some();
    settings.show_ratings = form.show_ratings.is_some();
    settings.show_orders = form.show_orders.is_some();
    settings.show_messages = form.show_messages.is_some();
    settings.default_page = form.default_page.unwrap_or_else(default_page);
    settings.export_format = form.export_format.unwrap_or_else(default_export_format);

    if state.users.save(&users).is_err() {
        return flash_redirect("/settings", "error", "Failed to save settings");
    }

    flash_redirect("/settings", "success", "Settings saved successfully")
}
