use std::{net::TcpListener, time::Duration};

use actix_session::{config::PersistentSession, storage::RedisSessionStore, SessionMiddleware};
use actix_web::{
    cookie::{time, Key, SameSite},
    dev::Server,
    web, App, HttpServer,
};
use anyhow::Context;
use secrecy::ExposeSecret;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing_actix_web::TracingLogger;

use crate::{
    config::{Config, DBConfig},
    in_flight::InFlight,
    mail::{MailConsumer, Mailer, SmtpTransport},
    routes, shutdown,
};

const DB_CONNECT_ATTEMPTS: u32 = 10;

/// 组装好、尚未运行的应用
pub struct Application {
    port: u16,
    server: Server,
    mailer: web::Data<Mailer>,
    consumer: MailConsumer<SmtpTransport>,
    in_flight: InFlight,
}

impl Application {
    /// 任何一步失败都直接返回，不会开始提供服务
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let pool = connect_to_db(&config.database).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to migrate the database.")?;

        let session_store = RedisSessionStore::new(config.redis_uri.expose_secret())
            .await
            .context("failed to connect to the session store.")?;
        let secret_key = Key::try_from(config.web.hmac_secret.expose_secret().as_bytes())
            .map_err(|e| anyhow::anyhow!("invalid hmac secret: {e:?}"))?;

        let in_flight = InFlight::new();
        let (mailer, consumer) = Mailer::from_config(&config.mail, in_flight.clone())
            .context("failed to build the mail transport.")?;
        let mailer = web::Data::new(mailer);

        let listener = TcpListener::bind(config.web.server_address())
            .with_context(|| format!("failed to bind {}.", config.web.server_address()))?;
        let port = listener.local_addr()?.port();
        let server = run(
            listener,
            web::Data::new(pool),
            mailer.clone(),
            session_store,
            secret_key,
        )?;

        Ok(Self {
            port,
            server,
            mailer,
            consumer,
            in_flight,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 后台启动邮件消费循环和信号监听，前台运行 HTTP 服务
    ///
    /// 收到信号后先优雅停止 HTTP 服务，处理中的请求结束后不再有新的入队，
    /// 然后执行邮件清理，清理完成后本函数返回。
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let Self {
            port,
            server,
            mailer,
            consumer,
            in_flight,
        } = self;

        tokio::spawn(consumer.consume_loop());

        let server_handle = server.handle();
        let cleanup = tokio::spawn(async move {
            let trigger = async {
                shutdown::shutdown_signal().await;
                tracing::info!("stopping http server");
                server_handle.stop(true).await;
            };
            shutdown::listen_for_shutdown(trigger, &mailer, &in_flight).await;
        });

        tracing::info!(port, "starting server");
        // 信号处理已关闭，服务只会因为 `stop` 或错误而返回
        server.await?;

        if let Err(e) = cleanup.await {
            tracing::error!(error.message = %e, "cleanup task failed");
        }
        Ok(())
    }
}

pub fn run(
    listener: TcpListener,
    pool: web::Data<PgPool>,
    mailer: web::Data<Mailer>,
    session_store: RedisSessionStore,
    secret_key: Key,
) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                SessionMiddleware::builder(session_store.clone(), secret_key.clone())
                    .cookie_secure(true)
                    .cookie_same_site(SameSite::Lax)
                    .session_lifecycle(
                        PersistentSession::default().session_ttl(time::Duration::hours(24)),
                    )
                    .build(),
            )
            .wrap(TracingLogger::default())
            .app_data(pool.clone())
            .app_data(mailer.clone())
            .configure(configure)
    })
    .listen(listener)?
    // 信号由 `shutdown::listen_for_shutdown` 处理
    .disable_signals()
    .run();

    Ok(server)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health_check", web::get().to(routes::health_check))
        .route("/subscribe", web::post().to(routes::subscribe));
}

/// 数据库可能晚于应用启动，最多重试 [`DB_CONNECT_ATTEMPTS`] 次，间隔 1 秒
pub async fn connect_to_db(config: &DBConfig) -> anyhow::Result<PgPool> {
    let options = config
        .with_db()
        .context("invalid database connection string.")?;

    for attempt in 1..=DB_CONNECT_ATTEMPTS {
        match PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options.clone())
            .await
        {
            Ok(pool) => {
                tracing::info!("connected to database");
                return Ok(pool);
            }
            Err(e) => {
                tracing::warn!(attempt, error.message = %e, "postgres not yet ready...");
                if attempt < DB_CONNECT_ATTEMPTS {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    anyhow::bail!("cannot connect to database.")
}
