use std::io::Write;
use std::str::FromStr;
use std::thread;

use log::LevelFilter;

/// Installs the process logger. `RUST_LOG` wins over `level` when set;
/// calling it twice is harmless.
pub fn init_logger(level: &str) {
    let default_level = LevelFilter::from_str(level).unwrap_or(LevelFilter::Info);
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let thread_name = thread::current();
            let name = thread_name.name().unwrap_or("unknown");
            writeln!(
                buf,
                "[{}] {:10.10} | {:20.20}:{:3}| {} {}",
                chrono::Local::now().format("%H:%M:%S.%3f"),
                name,
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .filter(None, default_level);
    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    let _ = builder.try_init();
}
