//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        audit::{Actor, AuditEvent, AuditEventType},
        user::{CreateUser, LoginResponse},
        Role, User, UserClaims,
    },
    repository::Repository,
};

use super::audit::AuditService;

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
    audit: AuditService,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig, audit: AuditService) -> Self {
        Self {
            repository,
            config,
            audit,
        }
    }

    /// Authenticate by username and password and issue a JWT
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<LoginResponse> {
        let user = self
            .repository
            .users_get_by_username(username.trim())
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            tracing::warn!("Failed login for user {}", user.username);
            return Err(AppError::Authentication("Invalid username or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!("User {} logged in", user.username);
        Ok(LoginResponse {
            token,
            token_type: "Bearer".to_string(),
            expires_in: self.config.jwt_expiration_hours as i64 * 3600,
            user,
        })
    }

    /// Create JWT token for a user
    pub fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.id.to_string(),
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        self.repository.users_get_by_id(id).await
    }

    pub async fn list(&self) -> AppResult<Vec<User>> {
        self.repository.users_list().await
    }

    pub async fn create_user(&self, data: CreateUser, actor: &Actor) -> AppResult<User> {
        let username = data.username.trim().to_string();
        let role = data.role;
        let result = self.insert_user(data).await;
        let mut event = AuditEvent::new(
            AuditEventType::UserCreated,
            actor,
            format!("Created user {}", username),
        )
        .detail("username", &username)
        .detail("role", role);
        if let Ok(user) = &result {
            event = event.detail("user_id", user.id);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    async fn insert_user(&self, data: CreateUser) -> AppResult<User> {
        data.validate()?;
        let hash = self.hash_password(&data.password)?;
        let user = self
            .repository
            .users_create(data.username.trim(), &hash, data.role, data.email.as_deref())
            .await?;
        tracing::info!("Created user {} with role {}", user.username, user.role);
        Ok(user)
    }

    /// Change a user's role. The last administrator cannot be demoted.
    pub async fn update_role(&self, id: i64, role: Role, actor: &Actor) -> AppResult<User> {
        let result = self.change_role(id, role).await;
        let mut event = AuditEvent::new(
            AuditEventType::UserUpdated,
            actor,
            format!("Changed role of user {} to {}", id, role),
        )
        .detail("user_id", id)
        .detail("role", role);
        if let Ok(user) = &result {
            event = event.detail("username", &user.username);
        }
        self.audit.record(event.outcome(&result)).await;
        result
    }

    async fn change_role(&self, id: i64, role: Role) -> AppResult<User> {
        let user = self.repository.users_get_by_id(id).await?;
        if user.role == Role::Admin && role != Role::Admin {
            self.ensure_other_admin_exists().await?;
        }
        let user = self.repository.users_update_role(id, role).await?;
        tracing::info!("User {} is now {}", user.username, user.role);
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64, requester: &UserClaims) -> AppResult<()> {
        let result = self.remove_user(id, requester).await;
        let mut event = AuditEvent::new(
            AuditEventType::UserDeleted,
            &Actor::from(requester),
            format!("Deleted user {}", id),
        )
        .detail("user_id", id);
        if let Ok(username) = &result {
            event = event.detail("username", username);
        }
        self.audit.record(event.outcome(&result)).await;
        result.map(|_| ())
    }

    /// Returns the deleted username.
    async fn remove_user(&self, id: i64, requester: &UserClaims) -> AppResult<String> {
        if id == requester.user_id {
            return Err(AppError::BadRequest("You cannot delete your own account".to_string()));
        }
        let user = self.repository.users_get_by_id(id).await?;
        if user.role == Role::Admin {
            self.ensure_other_admin_exists().await?;
        }
        self.repository.users_delete(id).await?;
        tracing::info!("Deleted user {}", user.username);
        Ok(user.username)
    }

    async fn ensure_other_admin_exists(&self) -> AppResult<()> {
        if self.repository.users_count_admins().await? <= 1 {
            return Err(AppError::Conflict(
                "At least one administrator account must remain".to_string(),
            ));
        }
        Ok(())
    }

    /// Create the configured admin account when no users exist yet.
    /// Returns the generated password when none was configured.
    pub async fn ensure_bootstrap_admin(&self) -> AppResult<Option<String>> {
        if self.repository.users_count().await? > 0 {
            return Ok(None);
        }

        let (password, generated) = match &self.config.bootstrap_admin_password {
            Some(password) => (password.clone(), false),
            None => (uuid::Uuid::new_v4().simple().to_string(), true),
        };
        let hash = self.hash_password(&password)?;
        self.repository
            .users_create(&self.config.bootstrap_admin_username, &hash, Role::Admin, None)
            .await?;
        tracing::info!(
            "Created bootstrap administrator {}",
            self.config.bootstrap_admin_username
        );
        Ok(generated.then_some(password))
    }
}
