use actix_session::Session;
use actix_web::{get, post, web, HttpResponse};
use log::{info, warn};
use validator::Validate;

use crate::{
    db::user_repository::UserRepository,
    errors::AppError,
    models::user::{LoginRequest, Role, SessionUser, User},
    utils::{run_db, security::verify_password},
    AppState,
};

pub const SESSION_USER_KEY: &str = "user_id";

/// The signed-in account behind an admin request.
#[derive(Debug)]
pub struct AdminContext {
    pub user: User,
    pub role: Role,
}

impl AdminContext {
    pub fn ensure_journal(&self, journal_id: i64) -> Result<(), AppError> {
        if self.role.can_access_journal(journal_id) {
            return Ok(());
        }
        warn!(
            "User {} denied access to journal {}",
            self.user.user_name, journal_id
        );
        Err(AppError::Forbidden(format!(
            "You do not have access to journal {}",
            journal_id
        )))
    }

    pub fn ensure_super_admin(&self) -> Result<(), AppError> {
        if self.role.is_super_admin() {
            return Ok(());
        }
        warn!("User {} is not a super-admin", self.user.user_name);
        Err(AppError::Forbidden(
            "This action requires a super-admin account".to_string(),
        ))
    }
}

/// Loads the session's account and role, or fails with `Unauthorized`.
pub async fn require_admin(session: &Session, state: &AppState) -> Result<AdminContext, AppError> {
    let user_id = match session.get::<i64>(SESSION_USER_KEY) {
        Ok(Some(id)) => id,
        Ok(None) => {
            return Err(AppError::Unauthorized(
                "Sign in to use the admin API".to_string(),
            ))
        }
        Err(e) => {
            warn!("Unreadable admin session: {}", e);
            session.purge();
            return Err(AppError::Unauthorized("Session is invalid".to_string()));
        }
    };

    run_db(&state.db, move |conn| {
        let users = UserRepository::new(conn);
        let user = users
            .find_by_id(user_id)?
            .filter(|u| u.is_active)
            .ok_or_else(|| {
                AppError::Unauthorized("Account is missing or inactive".to_string())
            })?;
        let role = users.resolve_role(&user)?;
        Ok(AdminContext { user, role })
    })
    .await
}

#[post("/login")]
pub async fn login(
    session: Session,
    state: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, AppError> {
    let request = body.into_inner();
    request.validate()?;

    let user_name = request.user_name.clone();
    // Lookup and bcrypt check both run on the blocking pool.
    let account = run_db(&state.db, move |conn| {
        let users = UserRepository::new(conn);
        let Some(user) = users.find_by_user_name(&request.user_name)? else {
            return Ok(None);
        };
        if !user.is_active || !verify_password(&request.password, &user.password_hash)? {
            return Ok(None);
        }
        let role = users.resolve_role(&user)?;
        Ok(Some(SessionUser { user, role }))
    })
    .await?;

    let Some(account) = account else {
        warn!("Admin login failed for {}", user_name);
        return Err(AppError::Unauthorized(
            "Invalid user name or password".to_string(),
        ));
    };

    session.renew();
    session
        .insert(SESSION_USER_KEY, account.user.id)
        .map_err(|e| AppError::Internal(format!("Session insert error: {}", e)))?;
    info!("Admin login successful for {}", account.user.user_name);
    Ok(HttpResponse::Ok().json(account))
}

#[post("/logout")]
pub async fn logout(session: Session) -> HttpResponse {
    match session.get::<i64>(SESSION_USER_KEY) {
        Ok(Some(id)) => info!("Admin logout for user {}", id),
        Ok(None) => info!("Admin logout without an active session"),
        Err(e) => warn!("Error reading session during logout: {}", e),
    }
    session.purge();
    HttpResponse::NoContent().finish()
}

#[get("/me")]
pub async fn me(session: Session, state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let AdminContext { user, role } = require_admin(&session, &state).await?;
    Ok(HttpResponse::Ok().json(SessionUser { user, role }))
}
