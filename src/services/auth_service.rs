use super::is_unique_violation;
use crate::config::AdminConfig;
use crate::entities::{UserRole, user_entity as users};
use crate::error::{AppError, AppResult};
use crate::models::{AuthResponse, LoginRequest, RegisterRequest, UserResponse};
use crate::utils::*;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, Set,
};

#[derive(Clone)]
pub struct AuthService {
    pool: DatabaseConnection,
    jwt_service: JwtService,
}

impl AuthService {
    pub fn new(pool: DatabaseConnection, jwt_service: JwtService) -> Self {
        Self { pool, jwt_service }
    }

    /// 启动时确保配置中的管理员账号存在
    ///
    /// - 未配置 `[admin]` 时什么也不做
    /// - 账号不存在则创建；已存在则提升为管理员并启用（密码保持不变）
    pub async fn ensure_admin(&self, admin: &AdminConfig) -> AppResult<Option<users::Model>> {
        if !admin.is_configured() {
            return Ok(None);
        }

        let email = normalize_email(&admin.email);
        validate_email(&email)?;

        let existing = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.pool)
            .await?;

        let user = match existing {
            Some(user) if user.role == UserRole::Admin && user.is_active => user,
            Some(user) => {
                let id = user.id;
                let mut am = user.into_active_model();
                am.role = Set(UserRole::Admin);
                am.is_active = Set(true);
                am.updated_at = Set(Utc::now());
                let user = am.update(&self.pool).await?;
                log::info!("Promoted user {id} to admin");
                user
            }
            None => {
                validate_password(&admin.password)?;
                let now = Utc::now();
                let name = admin.name.trim();
                let user = users::ActiveModel {
                    email: Set(email),
                    password_hash: Set(hash_password(&admin.password)?),
                    name: Set(if name.is_empty() { "Administrator" } else { name }.to_string()),
                    role: Set(UserRole::Admin),
                    is_active: Set(true),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                }
                .insert(&self.pool)
                .await?;
                log::info!("Admin account created: id={}", user.id);
                user
            }
        };

        Ok(Some(user))
    }

    /// 教师自助注册；管理员账号来自配置的 `[admin]`
    pub async fn register(&self, request: RegisterRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.password)?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("Name is required".to_string()));
        }

        let taken = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .count(&self.pool)
            .await?;
        if taken > 0 {
            return Err(AppError::Conflict("Email is already registered".to_string()));
        }

        let password_hash = hash_password(&request.password)?;
        let now = Utc::now();

        let user = users::ActiveModel {
            email: Set(email),
            password_hash: Set(password_hash),
            name: Set(name.to_string()),
            role: Set(UserRole::Teacher),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Email is already registered".to_string())
            } else {
                e.into()
            }
        })?;

        log::info!("Teacher registered: id={}", user.id);
        self.issue_tokens(user)
    }

    pub async fn login(&self, request: LoginRequest) -> AppResult<AuthResponse> {
        let email = normalize_email(&request.email);

        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email.as_str()))
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("Invalid email or password".to_string()))?;

        if !verify_password(&request.password, &user.password_hash)? {
            return Err(AppError::AuthError("Invalid email or password".to_string()));
        }

        if !user.is_active {
            return Err(AppError::AuthError("Account is disabled".to_string()));
        }

        self.issue_tokens(user)
    }

    /// 用 refresh token 换取新的令牌对
    pub async fn refresh_token(&self, refresh_token: &str) -> AppResult<AuthResponse> {
        let claims = self.jwt_service.verify_refresh_token(refresh_token)?;
        let user = self.find_active_user(claims.user_id()?).await?;
        self.issue_tokens(user)
    }

    pub async fn me(&self, user_id: i64) -> AppResult<UserResponse> {
        let user = self.find_active_user(user_id).await?;
        Ok(user.into())
    }

    async fn find_active_user(&self, user_id: i64) -> AppResult<users::Model> {
        let user = users::Entity::find_by_id(user_id)
            .one(&self.pool)
            .await?
            .ok_or_else(|| AppError::AuthError("User no longer exists".to_string()))?;
        if !user.is_active {
            return Err(AppError::AuthError("Account is disabled".to_string()));
        }
        Ok(user)
    }

    fn issue_tokens(&self, user: users::Model) -> AppResult<AuthResponse> {
        let access_token =
            self.jwt_service
                .generate_access_token(user.id, &user.email, user.role)?;
        let refresh_token =
            self.jwt_service
                .generate_refresh_token(user.id, &user.email, user.role)?;

        Ok(AuthResponse {
            user: user.into(),
            access_token,
            refresh_token,
            expires_in: self.jwt_service.get_access_token_expires_in(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, h, 0, 0).unwrap()
    }

    fn user_row(role: UserRole, is_active: bool) -> users::Model {
        users::Model {
            id: 3,
            email: "ops@school.example".into(),
            password_hash: "$2b$04$unused".into(),
            name: "Ops".into(),
            role,
            is_active,
            created_at: at(8),
            updated_at: at(8),
        }
    }

    fn admin_config() -> AdminConfig {
        AdminConfig {
            email: " Ops@School.example ".into(),
            password: "Sup3rSecret".into(),
            name: "Ops".into(),
        }
    }

    fn service(pool: DatabaseConnection) -> AuthService {
        AuthService::new(pool, JwtService::new("test-secret", 60, 120))
    }

    #[actix_web::test]
    async fn test_ensure_admin_skips_when_not_configured() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let svc = service(db.clone());

        let created = svc.ensure_admin(&AdminConfig::default()).await.unwrap();
        assert!(created.is_none());
        assert!(db.into_transaction_log().is_empty());
    }

    #[actix_web::test]
    async fn test_ensure_admin_creates_missing_account() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<users::Model>::new()])
            .append_query_results([vec![user_row(UserRole::Admin, true)]])
            .into_connection();
        let svc = service(db.clone());

        let admin = svc.ensure_admin(&admin_config()).await.unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("INSERT INTO \"users\""));
        assert!(log.contains("ops@school.example"));
    }

    #[actix_web::test]
    async fn test_ensure_admin_promotes_existing_teacher() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(UserRole::Teacher, false)]])
            .append_query_results([vec![user_row(UserRole::Admin, true)]])
            .into_connection();
        let svc = service(db.clone());

        let admin = svc.ensure_admin(&admin_config()).await.unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert!(admin.is_active);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("UPDATE \"users\""));
        assert!(!log.contains("INSERT"));
    }

    #[actix_web::test]
    async fn test_ensure_admin_leaves_existing_admin_alone() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![user_row(UserRole::Admin, true)]])
            .into_connection();
        let svc = service(db.clone());

        assert!(svc.ensure_admin(&admin_config()).await.unwrap().is_some());
        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("UPDATE"));
        assert!(!log.contains("INSERT"));
    }
}
