use std::fmt;

/// 输出错误及其完整的 source 链，供 `Debug` 实现和 `error.cause_chain` 日志字段使用
pub fn error_chain_fmt(e: &impl std::error::Error, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "{e}")?;
    let mut source = e.source();
    while let Some(cause) = source {
        writeln!(f, "Caused by:\n\t{cause}")?;
        source = cause.source();
    }
    Ok(())
}
