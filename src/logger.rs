//! `env_logger` with timestamps, `RUST_LOG` overrides the default `info` level

use std::env;
use std::io::Write;

use chrono::Utc;
use env_logger::Builder;
use log::LevelFilter;

pub fn init() {
    let mut builder = Builder::new();
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} {:<5} {}: {}",
            Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            record.level(),
            record.module_path().unwrap_or_default(),
            record.args()
        )
    });

    match env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse(&filters);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Info);
        }
    }

    builder.init();
}
