use std::future::Future;

use crate::{
    in_flight::InFlight,
    mail::{MailError, Mailer},
};

/// 等待 SIGINT 或 SIGTERM
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error.message = %e, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error.message = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// `trigger` 完成后执行 [`shutdown`]
/// 关闭过程中的错误只记录日志，调用方照常退出
pub async fn listen_for_shutdown<F>(trigger: F, mailer: &Mailer, in_flight: &InFlight)
where
    F: Future<Output = ()>,
{
    trigger.await;
    tracing::info!("received shutdown signal");

    if let Err(e) = shutdown(mailer, in_flight).await {
        tracing::error!(
            error.cause_chain = ?e,
            error.message = %e,
            "mailer did not shut down cleanly"
        );
    }
}

/// 等待所有在途任务结束，通知消费循环退出，再关闭邮件通道
///
/// 等待没有超时，卡住的任务会让关闭一直挂起。
#[tracing::instrument(name = "shutdown", skip_all)]
pub async fn shutdown(mailer: &Mailer, in_flight: &InFlight) -> Result<(), MailError> {
    tracing::info!(in_flight = in_flight.count(), "run cleanup task");
    in_flight.wait().await;

    let signalled = mailer.signal_done().await;

    tracing::info!("closing channels and shutting down application");
    mailer.close();

    signalled
}
