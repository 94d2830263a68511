use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter

use qr_hunt_backend::{
    config::Config,
    database::{create_pool, run_migrations},
    external::MailService,
    handlers,
    middlewares::{AuthMiddleware, create_cors},
    services::*,
    swagger::swagger_config,
    tasks,
    utils::JwtService,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().expect("Failed to load configuration");

    // 创建数据库连接池
    let pool = create_pool(&config.database)
        .await
        .expect("Failed to create database connection pool");

    // 运行数据库迁移
    run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let jwt_service = JwtService::new(
        &config.jwt.secret,
        config.jwt.access_token_expires_in,
        config.jwt.refresh_token_expires_in,
    );

    let mail_service = MailService::new(config.mail.clone());
    if !mail_service.is_enabled() {
        log::warn!("Mail API key not configured, winner notifications will not be sent");
    }

    // 创建服务
    let auth_service = AuthService::new(pool.clone(), jwt_service.clone());

    // 引导管理员账号
    match auth_service.ensure_admin(&config.admin).await {
        Ok(Some(admin)) => log::info!("Admin account ready: id={}", admin.id),
        Ok(None) => log::warn!("No [admin] configured, admin-only endpoints are unreachable"),
        Err(e) => log::error!("Failed to bootstrap admin account: {e}"),
    }
    let station_service = StationService::new(pool.clone());
    let class_service = ClassService::new(pool.clone());
    let scan_service = ScanService::new(pool.clone());
    let drawing_service = DrawingService::new(pool.clone(), mail_service, config.hunt.clone());

    // 启动后台任务
    tasks::spawn_all(class_service.clone(), &config.hunt);

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    HttpServer::new(move || {
        App::new()
            .wrap(AuthMiddleware::new(jwt_service.clone()))
            .wrap(create_cors())
            .wrap(Logger::default())
            .app_data(web::JsonConfig::default().error_handler(handlers::json_error_handler))
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(auth_service.clone()))
            .app_data(web::Data::new(station_service.clone()))
            .app_data(web::Data::new(class_service.clone()))
            .app_data(web::Data::new(scan_service.clone()))
            .app_data(web::Data::new(drawing_service.clone()))
            .configure(swagger_config)
            .configure(handlers::health_config)
            .service(
                web::scope("/api/v1")
                    .configure(handlers::auth_config)
                    .configure(handlers::station_config)
                    .configure(handlers::class_config)
                    .configure(handlers::scan_config)
                    .configure(handlers::drawing_config),
            )
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run()
    .await
}
