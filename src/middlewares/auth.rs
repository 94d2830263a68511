use crate::entities::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::JwtService;
use actix_web::http::Method;
use actix_web::{
    Error, HttpMessage, HttpRequest,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::future::{Ready, ready};

/// 鉴权后注入请求扩展的当前用户
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

// 公开路径配置
struct PublicPaths {
    exact_paths: Vec<&'static str>,
    prefix_paths: Vec<&'static str>,
    excluded_paths: Vec<&'static str>,
}

impl PublicPaths {
    fn new() -> Self {
        Self {
            // 完全匹配的公开路径
            exact_paths: vec![
                "/swagger-ui",
                "/swagger-ui/",
                "/api-docs/openapi.json",
                "/health",
            ],
            // 前缀匹配的公开路径
            prefix_paths: vec!["/swagger-ui/", "/api-docs/", "/api/v1/auth/"],
            // 需要排除的路径（即使在公开前缀下也需要认证）
            // refresh 由 handler 自行校验 refresh token
            excluded_paths: vec!["/api/v1/auth/me"],
        }
    }

    fn is_public_path(&self, path: &str) -> bool {
        if self
            .excluded_paths
            .iter()
            .any(|&excluded| path.starts_with(excluded))
        {
            return false;
        }

        if self.exact_paths.contains(&path) {
            return true;
        }

        self.prefix_paths
            .iter()
            .any(|&prefix| path.starts_with(prefix))
    }
}

/// Extracts the bearer token from an `Authorization` header value.
pub fn bearer_token(req: &HttpRequest) -> Option<&str> {
    req.headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

pub struct AuthMiddleware {
    jwt_service: JwtService,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self { jwt_service }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            jwt_service: self.jwt_service.clone(),
            public_paths: PublicPaths::new(),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    jwt_service: JwtService,
    public_paths: PublicPaths,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // 放行所有 CORS 预检请求
        if req.method() == Method::OPTIONS {
            return Box::pin(self.service.call(req));
        }

        if self.public_paths.is_public_path(req.path()) {
            return Box::pin(self.service.call(req));
        }

        let token = req
            .headers()
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        let Some(token) = token else {
            let error = AppError::AuthError("Missing access token".to_string());
            return Box::pin(async move { Err(error.into()) });
        };

        let user = self
            .jwt_service
            .verify_access_token(token)
            .and_then(|claims| {
                Ok(AuthUser {
                    id: claims.user_id()?,
                    role: claims.role,
                })
            });

        match user {
            Ok(user) => {
                req.extensions_mut().insert(user);
                Box::pin(self.service.call(req))
            }
            Err(_) => {
                let error = AppError::AuthError("Invalid access token".to_string());
                Box::pin(async move { Err(error.into()) })
            }
        }
    }
}

/// 用于获取当前用户的辅助函数
pub fn current_user(req: &HttpRequest) -> AppResult<AuthUser> {
    req.extensions()
        .get::<AuthUser>()
        .copied()
        .ok_or_else(|| AppError::AuthError("Authentication required".to_string()))
}

/// Static role gate: the user's role must be one of `allowed`.
pub fn require_role(user: &AuthUser, allowed: &[UserRole]) -> AppResult<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::PermissionDenied)
    }
}

/// Current user, gated on role.
pub fn authorize(req: &HttpRequest, allowed: &[UserRole]) -> AppResult<AuthUser> {
    let user = current_user(req)?;
    require_role(&user, allowed)?;
    Ok(user)
}

pub const ADMIN_ONLY: &[UserRole] = &[UserRole::Admin];
pub const ANY_ROLE: &[UserRole] = &[UserRole::Teacher, UserRole::Admin];

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test as actix_test;
    use actix_web::{App, HttpResponse, web};

    #[test]
    fn test_public_paths() {
        let paths = PublicPaths::new();
        assert!(paths.is_public_path("/health"));
        assert!(paths.is_public_path("/api/v1/auth/login"));
        assert!(paths.is_public_path("/api/v1/auth/refresh"));
        assert!(paths.is_public_path("/swagger-ui/index.html"));
        assert!(!paths.is_public_path("/api/v1/auth/me"));
        assert!(!paths.is_public_path("/api/v1/scans"));
        assert!(!paths.is_public_path("/api/v1/drawings/1/run"));
    }

    #[test]
    fn test_require_role() {
        let teacher = AuthUser {
            id: 1,
            role: UserRole::Teacher,
        };
        let admin = AuthUser {
            id: 2,
            role: UserRole::Admin,
        };
        assert!(require_role(&admin, &[UserRole::Admin]).is_ok());
        assert!(matches!(
            require_role(&teacher, &[UserRole::Admin]),
            Err(AppError::PermissionDenied)
        ));
        assert!(require_role(&teacher, &[UserRole::Teacher, UserRole::Admin]).is_ok());
    }

    async fn whoami(req: HttpRequest) -> HttpResponse {
        match current_user(&req) {
            Ok(user) => HttpResponse::Ok().body(format!("{}:{}", user.id, user.role)),
            Err(_) => HttpResponse::Ok().body("anonymous"),
        }
    }

    #[actix_web::test]
    async fn test_middleware_injects_user() {
        let jwt = JwtService::new("test-secret", 3600, 7200);
        let token = jwt.generate_access_token(9, "a@b.c", UserRole::Admin).unwrap();
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt.clone()))
                .route("/api/v1/whoami", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/api/v1/whoami")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "9:admin");
    }

    #[actix_web::test]
    async fn test_middleware_rejects_missing_and_refresh_tokens() {
        let jwt = JwtService::new("test-secret", 3600, 7200);
        let refresh = jwt.generate_refresh_token(9, "a@b.c", UserRole::Admin).unwrap();
        let app = actix_test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt.clone()))
                .route("/api/v1/whoami", web::get().to(whoami))
                .route("/health", web::get().to(whoami)),
        )
        .await;

        let req = actix_test::TestRequest::get().uri("/api/v1/whoami").to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 401);

        let req = actix_test::TestRequest::get()
            .uri("/api/v1/whoami")
            .insert_header(("Authorization", format!("Bearer {refresh}")))
            .to_request();
        let err = actix_test::try_call_service(&app, req).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), 401);

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body, "anonymous");
    }
}
