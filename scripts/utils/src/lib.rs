//! 各脚本依赖的通用组件.

use log::LevelFilter;
use simple_logger::SimpleLogger;

pub mod paths;

const SEP: &str = "--------------------------------------------------------";

/// 简单分隔线.
#[inline]
pub fn sep() {
    println!("{SEP}");
}

/// 获得可并行核心数.
pub fn cpus() -> usize {
    std::thread::available_parallelism().map_or_else(|_| num_cpus::get(), usize::from)
}

/// 初始化日志. `verbose` 为真时输出 debug 级别.
///
/// 重复初始化时静默忽略.
pub fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let _ = SimpleLogger::new()
        .with_level(LevelFilter::Warn)
        .with_module_level("nv_berry", level)
        .with_module_level("grabber", level)
        .with_module_level("analysis", level)
        .with_module_level("utils", level)
        .init();
}
