use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, oneshot};

use super::{DeliveryError, MailError, MailTransport, Message, SmtpTransport, Templates};
use crate::{
    config::MailConfig,
    in_flight::{InFlight, InFlightGuard},
};

/// 消费循环收到后回复，保证 done 信号是一次交接
type DoneSignal = oneshot::Sender<()>;

/// 队列中的邮件连同它的在途计数一起传递
struct Envelope {
    message: Message,
    tracked: InFlightGuard,
}

struct Channels {
    queue: mpsc::Sender<Envelope>,
    errors: mpsc::UnboundedSender<DeliveryError>,
    done: mpsc::Sender<DoneSignal>,
}

/// 邮件队列的生产端
///
/// 进程启动时构造一次，由应用持有。通道只会在 [`Mailer::close`] 中关闭一次，
/// 关闭后 [`Mailer::enqueue`] 返回 [`MailError::QueueClosed`]。
pub struct Mailer {
    channels: Mutex<Option<Channels>>,
    in_flight: InFlight,
    templates: Arc<Templates>,
}

/// 邮件队列的唯一消费端，见 [`MailConsumer::consume_loop`]
pub struct MailConsumer<T> {
    transport: T,
    templates: Arc<Templates>,
    queue: mpsc::Receiver<Envelope>,
    errors: mpsc::UnboundedReceiver<DeliveryError>,
    error_reporter: mpsc::UnboundedSender<DeliveryError>,
    done: mpsc::Receiver<DoneSignal>,
    observer: Option<mpsc::UnboundedSender<DeliveryError>>,
}

impl Mailer {
    /// 按配置构造 SMTP 投递通道
    pub fn from_config(
        config: &MailConfig,
        in_flight: InFlight,
    ) -> Result<(Self, MailConsumer<SmtpTransport>), MailError> {
        let transport = SmtpTransport::from_config(config)?;
        tracing::info!(
            host = %config.host,
            port = config.port,
            encryption = ?config.encryption,
            "mail transport configured"
        );
        Self::new(config, transport, in_flight)
    }

    pub fn new<T: MailTransport>(
        config: &MailConfig,
        transport: T,
        in_flight: InFlight,
    ) -> Result<(Self, MailConsumer<T>), MailError> {
        let templates = Arc::new(Templates::new()?);
        // `mpsc::channel` 不接受 0
        let (queue, queue_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (errors, errors_rx) = mpsc::unbounded_channel();
        let (done, done_rx) = mpsc::channel(1);

        let consumer = MailConsumer {
            transport,
            templates: Arc::clone(&templates),
            queue: queue_rx,
            errors: errors_rx,
            error_reporter: errors.clone(),
            done: done_rx,
            observer: None,
        };
        let mailer = Self {
            channels: Mutex::new(Some(Channels {
                queue,
                errors,
                done,
            })),
            in_flight,
            templates,
        };

        Ok((mailer, consumer))
    }

    /// 请求处理函数在第一个异步操作之前调用，持有到入队完成
    /// 关闭流程会等待所有 guard 释放后才关闭通道
    pub fn track(&self) -> InFlightGuard {
        self.in_flight.track()
    }

    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// 放入队列即返回，投递结果不会回传给调用方
    /// 队列已满时挂起，直到消费端取走一封
    #[tracing::instrument(
        name = "enqueue mail",
        skip_all,
        fields(recipient = %message.to, subject = %message.subject)
    )]
    pub async fn enqueue(&self, message: Message) -> Result<(), MailError> {
        let queue = self.with_channels(|c| c.queue.clone())?;
        let envelope = Envelope {
            message,
            tracked: self.in_flight.track(),
        };
        // 发送失败时 envelope 随错误一起丢弃，计数随之释放
        queue
            .send(envelope)
            .await
            .map_err(|_| MailError::QueueClosed)
    }

    /// 通知消费循环退出，并等待它确认
    pub async fn signal_done(&self) -> Result<(), MailError> {
        let done = self.with_channels(|c| c.done.clone())?;
        let (ack, acked) = oneshot::channel();
        done.send(ack)
            .await
            .map_err(|_| MailError::ConsumerStopped)?;
        acked.await.map_err(|_| MailError::ConsumerStopped)
    }

    /// 依次关闭邮件队列、错误通道和 done 信号，返回是否由本次调用关闭
    pub fn close(&self) -> bool {
        let Some(Channels {
            queue,
            errors,
            done,
        }) = self.lock().take()
        else {
            return false;
        };
        drop(queue);
        drop(errors);
        drop(done);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    fn with_channels<R>(&self, f: impl FnOnce(&Channels) -> R) -> Result<R, MailError> {
        self.lock().as_ref().map(f).ok_or(MailError::QueueClosed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Channels>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: MailTransport> MailConsumer<T> {
    /// 错误通道中的每条记录在写日志后再转发给 `observer`
    pub fn observe_errors(mut self, observer: mpsc::UnboundedSender<DeliveryError>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 单任务消费循环
    ///
    /// 每轮同时等待 done 信号、错误记录和新邮件，同时就绪时按这个顺序处理。
    /// 同一时刻最多只有一封邮件在投递，投递顺序与入队顺序一致。
    /// 收到 done 信号后立即返回，队列中剩余的邮件被丢弃。
    #[tracing::instrument(name = "mail consumer", skip_all)]
    pub async fn consume_loop(mut self) {
        tracing::info!("listening for mail");
        loop {
            tokio::select! {
                biased;
                signal = self.done.recv() => {
                    self.stop(signal);
                    return;
                }
                Some(error) = self.errors.recv() => self.report(error),
                Some(envelope) = self.queue.recv() => self.send(envelope).await,
            }
        }
    }

    #[tracing::instrument(
        name = "sending mail",
        skip_all,
        fields(recipient = %envelope.message.to, subject = %envelope.message.subject)
    )]
    async fn send(&self, envelope: Envelope) {
        // 投递结束后 `tracked` 才被释放
        let Envelope { message, tracked } = envelope;
        let delivered = match message.render(&self.templates) {
            Ok(body) => self.transport.deliver(&message, body).await,
            Err(e) => Err(e),
        };

        match delivered {
            Ok(()) => tracing::info!("mail delivered"),
            Err(source) => {
                let error = DeliveryError {
                    recipient: message.to.to_string(),
                    subject: message.subject,
                    source,
                };
                // 接收端由自己持有，不会失败
                let _ = self.error_reporter.send(error);
            }
        }
        drop(tracked);
    }

    fn report(&self, error: DeliveryError) {
        tracing::error!(
            error.cause_chain = ?error,
            error.message = %error,
            "failed to deliver mail"
        );
        if let Some(observer) = &self.observer {
            let _ = observer.send(error);
        }
    }

    fn stop(&mut self, signal: Option<DoneSignal>) {
        while let Ok(error) = self.errors.try_recv() {
            self.report(error);
        }
        tracing::info!(dropped = self.queue.len(), "mail consumer stopped");
        if let Some(ack) = signal {
            let _ = ack.send(());
        }
    }
}
