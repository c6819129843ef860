//! Admin panel
//!
//! Server-rendered management views for users, permissions and posts.
//! Only superusers can log in. Anonymous visitors are redirected to the
//! login page and other authenticated users get 403.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tera::Context as TeraContext;

use super::error::ApiError;
use super::extract::{Auth, ValidForm, ValidPath};
use super::middleware::{
    clear_session_cookie, cookie_value, require_admin_page, session_cookie, AppState,
    SESSION_COOKIE,
};
use crate::models::{
    Authentication, CreatePostInput, CreateUserInput, FieldError, Permission, PermissionInput,
    PostStatus, UpdatePostInput, UpdateUserInput, User,
};
use crate::services::{AuthError, PermissionServiceError, PostServiceError, UserServiceError};

pub fn router() -> Router<AppState> {
    let protected = Router::new()
        .route("/admin/", get(dashboard))
        .route("/admin/users/", get(list_users))
        .route("/admin/users/new", get(new_user).post(create_user))
        .route("/admin/users/{id}/edit", get(edit_user).post(update_user))
        .route("/admin/users/{id}/delete", post(delete_user))
        .route("/admin/permissions/", get(list_permissions))
        .route("/admin/permissions/new", get(new_permission).post(create_permission))
        .route(
            "/admin/permissions/{id}/edit",
            get(edit_permission).post(update_permission),
        )
        .route("/admin/permissions/{id}/delete", post(delete_permission))
        .route("/admin/posts/", get(list_posts))
        .route("/admin/posts/new", get(new_post).post(create_post))
        .route("/admin/posts/{id}/edit", get(edit_post).post(update_post))
        .route("/admin/posts/{id}/delete", post(delete_post))
        .route("/admin/posts/{id}/publish", post(publish_post))
        .route_layer(middleware::from_fn(require_admin_page));

    Router::new()
        .route("/admin", get(|| async { Redirect::permanent("/admin/") }))
        .route("/admin/login", get(login_page).post(login))
        .route("/admin/logout", get(logout).post(logout))
        .merge(protected)
}

// ============================================================================
// Form and template helpers
// ============================================================================

/// Raw urlencoded fields. Repeated keys (multi-selects) are kept.
type RawForm = Vec<(String, String)>;

struct FormData(RawForm);

impl FormData {
    fn text(&self, name: &str) -> String {
        self.0
            .iter()
            .rev()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
            .unwrap_or_default()
    }

    /// Trimmed value, `None` when blank or absent
    fn optional(&self, name: &str) -> Option<String> {
        Some(self.text(name).trim().to_string()).filter(|v| !v.is_empty())
    }

    /// Checkbox state: any submitted value other than `false` counts
    fn flag(&self, name: &str) -> bool {
        self.0
            .iter()
            .any(|(key, value)| key == name && value != "false")
    }

    fn ids(&self, name: &str) -> Vec<i64> {
        self.0
            .iter()
            .filter(|(key, _)| key == name)
            .filter_map(|(_, value)| value.trim().parse().ok())
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct FormField {
    name: &'static str,
    label: &'static str,
    kind: &'static str,
    value: String,
    checked: bool,
    options: Vec<SelectOption>,
    help: Option<&'static str>,
}

impl FormField {
    fn input(name: &'static str, label: &'static str, kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            name,
            label,
            kind,
            value: value.into(),
            checked: false,
            options: Vec::new(),
            help: None,
        }
    }

    fn checkbox(name: &'static str, label: &'static str, checked: bool) -> Self {
        Self {
            checked,
            ..Self::input(name, label, "checkbox", "")
        }
    }

    fn select(name: &'static str, label: &'static str, multiple: bool, options: Vec<SelectOption>) -> Self {
        Self {
            options,
            ..Self::input(name, label, if multiple { "multiselect" } else { "select" }, "")
        }
    }

    fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

#[derive(Debug, Serialize)]
struct SelectOption {
    value: String,
    label: String,
    selected: bool,
}

#[derive(Debug, Serialize)]
struct ListRow {
    id: i64,
    cells: Vec<String>,
    can_publish: bool,
}

#[derive(Debug, Serialize)]
struct DashboardCard {
    label: &'static str,
    count: i64,
    url: &'static str,
    detail: Option<String>,
}

fn admin_context(auth: &Authentication) -> TeraContext {
    let mut ctx = TeraContext::new();
    ctx.insert("current_user", &auth.user().map(|u| u.display_name.clone()));
    ctx
}

fn render(state: &AppState, template: &str, ctx: &TeraContext) -> Result<Html<String>, ApiError> {
    Ok(Html(state.renderer.render(template, ctx)?))
}

fn render_list(
    state: &AppState,
    auth: &Authentication,
    title: &str,
    base_url: &str,
    columns: &[&str],
    rows: Vec<ListRow>,
) -> Result<Response, ApiError> {
    let mut ctx = admin_context(auth);
    ctx.insert("title", title);
    ctx.insert("base_url", base_url);
    ctx.insert("columns", columns);
    ctx.insert("colspan", &(columns.len() + 1));
    ctx.insert("rows", &rows);
    Ok(render(state, "admin/list.html", &ctx)?.into_response())
}

fn render_form(
    state: &AppState,
    auth: &Authentication,
    title: &str,
    action: &str,
    cancel_url: &str,
    fields: Vec<FormField>,
    errors: &[FieldError],
) -> Result<Response, ApiError> {
    let mut ctx = admin_context(auth);
    ctx.insert("title", title);
    ctx.insert("action", action);
    ctx.insert("cancel_url", cancel_url);
    ctx.insert("fields", &fields);
    ctx.insert("errors", errors);

    let html = render(state, "admin/form.html", &ctx)?;
    let status = if errors.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok((status, html).into_response())
}

fn fmt_time(value: Option<chrono::DateTime<chrono::Utc>>) -> String {
    value
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

fn yes_no(value: bool) -> String {
    if value { "Yes" } else { "No" }.to_string()
}

/// Errors a form can show inline. Anything else propagates.
fn user_form_errors(err: UserServiceError) -> Result<Vec<FieldError>, ApiError> {
    match err {
        UserServiceError::Validation(errors) => Ok(errors),
        UserServiceError::UsernameTaken(_) => Ok(vec![FieldError::new("username", err.to_string())]),
        UserServiceError::EmailTaken(_) => Ok(vec![FieldError::new("email", err.to_string())]),
        UserServiceError::UnknownPermission(_) => {
            Ok(vec![FieldError::new("permissions", err.to_string())])
        }
        other => Err(other.into()),
    }
}

fn permission_form_errors(err: PermissionServiceError) -> Result<Vec<FieldError>, ApiError> {
    match err {
        PermissionServiceError::Validation(errors) => Ok(errors),
        PermissionServiceError::NameTaken(_) => Ok(vec![FieldError::new("name", err.to_string())]),
        other => Err(other.into()),
    }
}

fn post_form_errors(err: PostServiceError) -> Result<Vec<FieldError>, ApiError> {
    match err {
        PostServiceError::Validation(errors) => Ok(errors),
        other => Err(other.into()),
    }
}

// ============================================================================
// Login / logout
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// GET /admin/login
pub async fn login_page(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    if auth.is_admin() {
        return Ok(Redirect::to("/admin/").into_response());
    }
    let ctx = admin_context(&Authentication::anonymous());
    Ok(render(&state, "admin/login.html", &ctx)?.into_response())
}

/// POST /admin/login
pub async fn login(
    State(state): State<AppState>,
    ValidForm(form): ValidForm<LoginForm>,
) -> Result<Response, ApiError> {
    match state.auth.login(&form.username, &form.password).await {
        Ok((session, _user)) => {
            let cookie = session_cookie(&session.id, session.max_age_seconds(), state.secure_cookies);
            Ok((
                [(header::SET_COOKIE, cookie)],
                Redirect::to("/admin/"),
            )
                .into_response())
        }
        Err(err @ (AuthError::InvalidCredentials | AuthError::NotAdmin)) => {
            tracing::warn!(username = %form.username, "Admin login failed: {}", err);
            let mut ctx = admin_context(&Authentication::anonymous());
            ctx.insert("username", &form.username);
            ctx.insert("errors", &[FieldError::new("", err.to_string())]);
            let html = render(&state, "admin/login.html", &ctx)?;
            Ok((StatusCode::BAD_REQUEST, html).into_response())
        }
        Err(err) => Err(err.into()),
    }
}

/// GET|POST /admin/logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE).filter(|t| !t.is_empty()) {
        state.auth.logout(&token).await?;
    }
    Ok((
        [(header::SET_COOKIE, clear_session_cookie(state.secure_cookies))],
        Redirect::to("/admin/login"),
    )
        .into_response())
}

// ============================================================================
// Dashboard
// ============================================================================

/// GET /admin/
pub async fn dashboard(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Html<String>, ApiError> {
    let drafts = state.posts.count_with_status(PostStatus::Draft).await?;
    let published = state.posts.count_with_status(PostStatus::Published).await?;
    let cards = vec![
        DashboardCard {
            label: "Users",
            count: state.users.count().await?,
            url: "/admin/users/",
            detail: None,
        },
        DashboardCard {
            label: "Permissions",
            count: state.permissions.count().await?,
            url: "/admin/permissions/",
            detail: None,
        },
        DashboardCard {
            label: "Posts",
            count: state.posts.count().await?,
            url: "/admin/posts/",
            detail: Some(format!("{} draft, {} published", drafts, published)),
        },
    ];

    let mut ctx = admin_context(&auth);
    ctx.insert("cards", &cards);
    render(&state, "admin/dashboard.html", &ctx)
}

// ============================================================================
// Users
// ============================================================================

const USER_COLUMNS: &[&str] = &[
    "ID",
    "Username",
    "Email",
    "Full name",
    "Active",
    "Superuser",
    "Created",
    "Last login",
];

/// GET /admin/users/
pub async fn list_users(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    let rows = state
        .users
        .list_users()
        .await?
        .into_iter()
        .map(|u| ListRow {
            id: u.id,
            cells: vec![
                u.id.to_string(),
                u.username,
                u.email.unwrap_or_default(),
                u.full_name.unwrap_or_default(),
                yes_no(u.is_active),
                yes_no(u.is_superuser),
                fmt_time(Some(u.created_at)),
                fmt_time(u.last_login),
            ],
            can_publish: false,
        })
        .collect();
    render_list(&state, &auth, "Users", "/admin/users/", USER_COLUMNS, rows)
}

/// Values shown in the user form
#[derive(Debug, Default)]
struct UserFormValues {
    username: String,
    email: String,
    full_name: String,
    is_active: bool,
    is_superuser: bool,
    granted: HashSet<i64>,
}

impl UserFormValues {
    fn from_user(user: &User, granted: HashSet<i64>) -> Self {
        Self {
            username: user.username.clone(),
            email: user.email.clone().unwrap_or_default(),
            full_name: user.full_name.clone().unwrap_or_default(),
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            granted,
        }
    }

    fn from_form(form: &FormData) -> Self {
        Self {
            username: form.text("username"),
            email: form.text("email"),
            full_name: form.text("full_name"),
            is_active: form.flag("is_active"),
            is_superuser: form.flag("is_superuser"),
            granted: form.ids("permissions").into_iter().collect(),
        }
    }
}

fn build_user_fields(permissions: &[Permission], values: &UserFormValues, editing: bool) -> Vec<FormField> {
    let mut password = FormField::input("password", "Password", "password", "");
    if editing {
        password = password.with_help("Leave blank to keep the current password.");
    }
    let options = permissions
        .iter()
        .map(|p| SelectOption {
            value: p.id.to_string(),
            label: p.name.clone(),
            selected: values.granted.contains(&p.id),
        })
        .collect();

    vec![
        FormField::input("username", "Username", "text", values.username.as_str()),
        FormField::input("email", "Email", "email", values.email.as_str()),
        FormField::input("full_name", "Full name", "text", values.full_name.as_str()),
        password,
        FormField::checkbox("is_active", "Active", values.is_active),
        FormField::checkbox("is_superuser", "Superuser", values.is_superuser),
        FormField::select("permissions", "Permissions", true, options),
    ]
}

// Unknown permission ids are rejected before any write.
async fn insert_user(
    state: &AppState,
    input: CreateUserInput,
    granted: &[i64],
) -> Result<(), UserServiceError> {
    state.users.check_permissions(granted).await?;
    let user = state.users.create_user(input).await?;
    state.users.set_permissions(user.id, granted).await
}

async fn save_user(
    state: &AppState,
    id: i64,
    input: UpdateUserInput,
    granted: &[i64],
) -> Result<(), UserServiceError> {
    state.users.check_permissions(granted).await?;
    state.users.update_user(id, input).await?;
    state.users.set_permissions(id, granted).await
}

/// GET /admin/users/new
pub async fn new_user(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    let permissions = state.permissions.list().await?;
    let values = UserFormValues {
        is_active: true,
        ..Default::default()
    };
    let fields = build_user_fields(&permissions, &values, false);
    render_form(&state, &auth, "Create user", "/admin/users/new", "/admin/users/", fields, &[])
}

/// POST /admin/users/new
pub async fn create_user(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    let input = CreateUserInput {
        username: form.text("username").trim().to_string(),
        email: form.optional("email"),
        full_name: form.optional("full_name"),
        password: form.text("password"),
        is_active: form.flag("is_active"),
        is_superuser: form.flag("is_superuser"),
    };

    let granted = form.ids("permissions");
    let result = insert_user(&state, input, &granted).await;

    match result {
        Ok(()) => Ok(Redirect::to("/admin/users/").into_response()),
        Err(err) => {
            let errors = user_form_errors(err)?;
            let permissions = state.permissions.list().await?;
            let fields = build_user_fields(&permissions, &UserFormValues::from_form(&form), false);
            render_form(&state, &auth, "Create user", "/admin/users/new", "/admin/users/", fields, &errors)
        }
    }
}

/// GET /admin/users/{id}/edit
pub async fn edit_user(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
) -> Result<Response, ApiError> {
    let user = state.users.get_user(id).await?;
    let permissions = state.permissions.list().await?;
    let granted: HashSet<i64> = state
        .users
        .permissions_for(id)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();

    let fields = build_user_fields(&permissions, &UserFormValues::from_user(&user, granted), true);
    let action = format!("/admin/users/{}/edit", id);
    render_form(&state, &auth, &format!("Edit user {}", user.username), &action, "/admin/users/", fields, &[])
}

/// POST /admin/users/{id}/edit
///
/// A blank password keeps the stored hash.
pub async fn update_user(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    let password = form.text("password");
    let input = UpdateUserInput {
        username: Some(form.text("username").trim().to_string()),
        email: Some(form.text("email").trim().to_string()),
        full_name: Some(form.text("full_name")),
        password: Some(password).filter(|p| !p.is_empty()),
        is_active: Some(form.flag("is_active")),
        is_superuser: Some(form.flag("is_superuser")),
    };

    let granted = form.ids("permissions");
    let result = save_user(&state, id, input, &granted).await;

    match result {
        Ok(()) => Ok(Redirect::to("/admin/users/").into_response()),
        Err(err) => {
            let errors = user_form_errors(err)?;
            let permissions = state.permissions.list().await?;
            let fields = build_user_fields(&permissions, &UserFormValues::from_form(&form), true);
            let action = format!("/admin/users/{}/edit", id);
            render_form(&state, &auth, "Edit user", &action, "/admin/users/", fields, &errors)
        }
    }
}

/// POST /admin/users/{id}/delete
pub async fn delete_user(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Redirect, ApiError> {
    state.users.delete_user(id).await?;
    Ok(Redirect::to("/admin/users/"))
}

// ============================================================================
// Permissions
// ============================================================================

fn permission_fields(name: &str, description: &str) -> Vec<FormField> {
    vec![
        FormField::input("name", "Name", "text", name),
        FormField::input("description", "Description", "textarea", description),
    ]
}

fn permission_input(form: &FormData) -> PermissionInput {
    PermissionInput::new(form.text("name"), form.optional("description"))
}

/// GET /admin/permissions/
pub async fn list_permissions(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    let rows = state
        .permissions
        .list()
        .await?
        .into_iter()
        .map(|p| ListRow {
            id: p.id,
            cells: vec![p.id.to_string(), p.name, p.description.unwrap_or_default()],
            can_publish: false,
        })
        .collect();
    render_list(
        &state,
        &auth,
        "Permissions",
        "/admin/permissions/",
        &["ID", "Name", "Description"],
        rows,
    )
}

/// GET /admin/permissions/new
pub async fn new_permission(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    render_form(
        &state,
        &auth,
        "Create permission",
        "/admin/permissions/new",
        "/admin/permissions/",
        permission_fields("", ""),
        &[],
    )
}

/// POST /admin/permissions/new
pub async fn create_permission(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    match state.permissions.create(permission_input(&form)).await {
        Ok(_) => Ok(Redirect::to("/admin/permissions/").into_response()),
        Err(err) => {
            let errors = permission_form_errors(err)?;
            render_form(
                &state,
                &auth,
                "Create permission",
                "/admin/permissions/new",
                "/admin/permissions/",
                permission_fields(&form.text("name"), &form.text("description")),
                &errors,
            )
        }
    }
}

/// GET /admin/permissions/{id}/edit
pub async fn edit_permission(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
) -> Result<Response, ApiError> {
    let permission = state.permissions.get(id).await?;
    render_form(
        &state,
        &auth,
        &format!("Edit permission {}", permission.name),
        &format!("/admin/permissions/{}/edit", id),
        "/admin/permissions/",
        permission_fields(&permission.name, permission.description.as_deref().unwrap_or("")),
        &[],
    )
}

/// POST /admin/permissions/{id}/edit
pub async fn update_permission(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    match state.permissions.update(id, permission_input(&form)).await {
        Ok(_) => Ok(Redirect::to("/admin/permissions/").into_response()),
        Err(err) => {
            let errors = permission_form_errors(err)?;
            render_form(
                &state,
                &auth,
                "Edit permission",
                &format!("/admin/permissions/{}/edit", id),
                "/admin/permissions/",
                permission_fields(&form.text("name"), &form.text("description")),
                &errors,
            )
        }
    }
}

/// POST /admin/permissions/{id}/delete
pub async fn delete_permission(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Redirect, ApiError> {
    state.permissions.delete(id).await?;
    Ok(Redirect::to("/admin/permissions/"))
}

// ============================================================================
// Posts
// ============================================================================

const POST_COLUMNS: &[&str] = &["ID", "Title", "Status", "Author", "Posted", "Modified"];

fn post_fields(title: &str, content: &str, status: PostStatus, metadata: &str) -> Vec<FormField> {
    let statuses = [PostStatus::Draft, PostStatus::Published]
        .into_iter()
        .map(|s| SelectOption {
            value: s.to_string(),
            label: s.to_string(),
            selected: s == status,
        })
        .collect();
    vec![
        FormField::input("title", "Title", "text", title),
        FormField::input("content", "Content", "textarea", content),
        FormField::select("post_status", "Status", false, statuses),
        FormField::input("post_metadata", "Metadata (JSON object)", "textarea", metadata),
    ]
}

fn post_fields_from_form(form: &FormData) -> Vec<FormField> {
    let status: PostStatus = form.text("post_status").parse().unwrap_or_default();
    post_fields(
        &form.text("title"),
        &form.text("content"),
        status,
        &form.text("post_metadata"),
    )
}

/// Parse the form's status and metadata, collecting field errors
fn parse_post_extras(
    form: &FormData,
) -> Result<(PostStatus, Option<serde_json::Value>), Vec<FieldError>> {
    let mut errors = Vec::new();
    let status = form
        .optional("post_status")
        .map(|s| s.parse::<PostStatus>())
        .transpose()
        .unwrap_or_else(|_| {
            errors.push(FieldError::new("post_status", "Input should be 'DRAFT' or 'PUBLISHED'"));
            None
        })
        .unwrap_or_default();
    let metadata = match form.optional("post_metadata") {
        None => None,
        Some(raw) => match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(_) => {
                errors.push(FieldError::new("post_metadata", "Invalid JSON"));
                None
            }
        },
    };
    if errors.is_empty() {
        Ok((status, metadata))
    } else {
        Err(errors)
    }
}

/// GET /admin/posts/
pub async fn list_posts(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    let rows = state
        .posts
        .list_posts()
        .await?
        .into_iter()
        .map(|p| ListRow {
            id: p.id,
            can_publish: !p.is_published(),
            cells: vec![
                p.id.to_string(),
                p.title,
                p.post_status.to_string(),
                p.user_id.map(|id| id.to_string()).unwrap_or_default(),
                fmt_time(Some(p.post_date)),
                fmt_time(Some(p.post_modified)),
            ],
        })
        .collect();
    render_list(&state, &auth, "Posts", "/admin/posts/", POST_COLUMNS, rows)
}

/// GET /admin/posts/new
pub async fn new_post(
    State(state): State<AppState>,
    Auth(auth): Auth,
) -> Result<Response, ApiError> {
    render_form(
        &state,
        &auth,
        "Create post",
        "/admin/posts/new",
        "/admin/posts/",
        post_fields("", "", PostStatus::Draft, ""),
        &[],
    )
}

/// POST /admin/posts/new
pub async fn create_post(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    let outcome = match parse_post_extras(&form) {
        Ok((post_status, post_metadata)) => {
            let input = CreatePostInput {
                title: form.text("title"),
                content: form.text("content"),
                post_status,
                post_metadata,
            };
            let author = auth.user().and_then(|u| u.user_id());
            match state.posts.create_post(input, author).await {
                Ok(_) => Ok(()),
                Err(err) => Err(post_form_errors(err)?),
            }
        }
        Err(errors) => Err(errors),
    };

    match outcome {
        Ok(()) => Ok(Redirect::to("/admin/posts/").into_response()),
        Err(errors) => render_form(
            &state,
            &auth,
            "Create post",
            "/admin/posts/new",
            "/admin/posts/",
            post_fields_from_form(&form),
            &errors,
        ),
    }
}

/// GET /admin/posts/{id}/edit
pub async fn edit_post(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
) -> Result<Response, ApiError> {
    let post = state.posts.get_post(id).await?;
    let metadata = post
        .post_metadata
        .as_ref()
        .map(|m| serde_json::to_string_pretty(m).unwrap_or_default())
        .unwrap_or_default();
    render_form(
        &state,
        &auth,
        &format!("Edit post {}", post.title),
        &format!("/admin/posts/{}/edit", id),
        "/admin/posts/",
        post_fields(&post.title, &post.content, post.post_status, &metadata),
        &[],
    )
}

/// POST /admin/posts/{id}/edit
pub async fn update_post(
    State(state): State<AppState>,
    Auth(auth): Auth,
    ValidPath(id): ValidPath<i64>,
    ValidForm(raw): ValidForm<RawForm>,
) -> Result<Response, ApiError> {
    let form = FormData(raw);
    let outcome = match parse_post_extras(&form) {
        Ok((post_status, post_metadata)) => {
            let input = UpdatePostInput {
                title: Some(form.text("title")),
                content: Some(form.text("content")),
                post_status: Some(post_status),
                post_metadata: Some(post_metadata.unwrap_or(serde_json::Value::Null)),
            };
            match state.posts.update_post(id, input).await {
                Ok(_) => Ok(()),
                Err(err) => Err(post_form_errors(err)?),
            }
        }
        Err(errors) => Err(errors),
    };

    match outcome {
        Ok(()) => Ok(Redirect::to("/admin/posts/").into_response()),
        Err(errors) => render_form(
            &state,
            &auth,
            "Edit post",
            &format!("/admin/posts/{}/edit", id),
            "/admin/posts/",
            post_fields_from_form(&form),
            &errors,
        ),
    }
}

/// POST /admin/posts/{id}/publish
pub async fn publish_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Redirect, ApiError> {
    state.posts.publish_post(id).await?;
    Ok(Redirect::to("/admin/posts/"))
}

/// POST /admin/posts/{id}/delete
pub async fn delete_post(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<i64>,
) -> Result<Redirect, ApiError> {
    state.posts.delete_post(id).await?;
    Ok(Redirect::to("/admin/posts/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(pairs: &[(&str, &str)]) -> FormData {
        FormData(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_form_data_accessors() {
        let data = form(&[
            ("username", " alice "),
            ("email", ""),
            ("is_active", "true"),
            ("permissions", "1"),
            ("permissions", "3"),
            ("permissions", "x"),
        ]);
        assert_eq!(data.text("username"), " alice ");
        assert_eq!(data.optional("username").as_deref(), Some("alice"));
        assert_eq!(data.optional("email"), None);
        assert!(data.flag("is_active"));
        assert!(!data.flag("is_superuser"));
        assert_eq!(data.ids("permissions"), vec![1, 3]);
    }

    #[test]
    fn test_parse_post_extras() {
        let ok = form(&[("post_status", "published"), ("post_metadata", r#"{"tags":[]}"#)]);
        let (status, metadata) = parse_post_extras(&ok).unwrap();
        assert_eq!(status, PostStatus::Published);
        assert_eq!(metadata, Some(serde_json::json!({"tags": []})));

        let bad = form(&[("post_status", "ARCHIVED"), ("post_metadata", "{nope")]);
        let errors = parse_post_extras(&bad).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["post_status", "post_metadata"]);
    }

    #[test]
    fn test_user_fields_mark_granted_permissions() {
        let permissions = vec![
            Permission { id: 1, name: "read".into(), description: None },
            Permission { id: 2, name: "write".into(), description: None },
        ];
        let values = UserFormValues {
            username: "a".into(),
            granted: [2].into_iter().collect(),
            ..Default::default()
        };
        let fields = build_user_fields(&permissions, &values, true);

        let select = fields.iter().find(|f| f.name == "permissions").unwrap();
        assert_eq!(select.kind, "multiselect");
        assert!(!select.options[0].selected);
        assert!(select.options[1].selected);

        let password = fields.iter().find(|f| f.name == "password").unwrap();
        assert!(password.help.is_some());
    }
}
