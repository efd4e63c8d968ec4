use tracing::{subscriber, Subscriber};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_log::LogTracer;
use tracing_subscriber::{fmt::MakeWriter, layer::SubscriberExt, EnvFilter, Registry};

/// 组装 bunyan 格式的订阅者
/// `RUST_LOG` 优先于传入的默认过滤级别
pub fn get_subscriber<Sink>(
    name: &str,
    default_filter: &str,
    sink: Sink,
) -> impl Subscriber + Send + Sync + 'static
where
    Sink: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let formatting_layer = BunyanFormattingLayer::new(name.into(), sink);

    Registry::default()
        .with(env_filter)
        .with(JsonStorageLayer)
        .with(formatting_layer)
}

/// 只能调用一次
pub fn init_subscriber(subscriber: impl Subscriber + Send + Sync + 'static) {
    // `actix-web`、`sqlx` 等依赖通过`log`输出，导入`trace`
    LogTracer::init().expect("failed to set logger.");
    subscriber::set_global_default(subscriber).expect("failed to set subscriber.");
}
