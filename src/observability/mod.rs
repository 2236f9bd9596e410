//! 可观测性：日志订阅器初始化

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 安装全局 tracing 订阅器：默认 info，可通过 RUST_LOG 覆盖（如 `RUST_LOG=hive=debug`）
///
/// 重复调用时忽略（测试里多次初始化不会 panic）。
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}
