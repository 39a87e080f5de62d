//! EDUPLAY marketplace service.
//! This crate is for running the service from `eduplay_lib`. See `eduplay_lib` for details.

fn main() {
    let config = eduplay_lib::config::Config::new().expect("Can't load app config!");

    // Prepare sentry integration
    let _sentry = eduplay_lib::sentry_integration::init(config.sentry.as_ref());

    // Prepare logger
    eduplay_lib::logger::init();

    eduplay_lib::start_server(config, &None, || ());
}
