//! Process-wide tracing setup. The first `FfiApp` constructed installs the subscriber; every
//! later call finds one already set and leaves it alone.

use tracing_subscriber::EnvFilter;

/// Directives used when `RUST_LOG` is unset. The HTTP stack is chatty at debug level and only
/// its warnings are kept next to our own events.
const DEFAULT_DIRECTIVES: &str = "clario_core=debug,hyper=warn,hyper_util=warn,reqwest=warn,info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
}

/// Routes `tracing` output to the platform sink: os_log on iOS, logcat on Android and stderr
/// everywhere else. iOS additionally appends to `<data_dir>/clario.log`.
pub fn init_logging(#[allow(unused)] data_dir: &str) {
    #[cfg(target_os = "ios")]
    {
        use tracing_subscriber::prelude::*;

        let _ = std::fs::create_dir_all(data_dir);
        let file_layer = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(std::path::Path::new(data_dir).join("clario.log"))
            .ok()
            .map(|file| {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false)
                    .with_target(true)
            });

        let _ = tracing_subscriber::registry()
            .with(filter())
            .with(tracing_oslog::OsLogger::new("app.clario.core", "default"))
            .with(file_layer)
            .try_init();
    }

    #[cfg(target_os = "android")]
    {
        use tracing_subscriber::prelude::*;

        let _ = tracing_subscriber::registry()
            .with(paranoid_android::layer("clario").with_filter(filter()))
            .try_init();
    }

    #[cfg(not(any(target_os = "ios", target_os = "android")))]
    {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(true)
            .try_init();
    }
}
