//! Initialisation du système de logging `tracing`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::Config;

/// Initialise le subscriber global `tracing` à partir de la configuration.
///
/// Le filtre vient de `RUST_LOG` s'il est défini, sinon du niveau
/// `host.logger.min_level`. La sortie console est activée par
/// `host.logger.enable_console`. Un second appel est sans effet.
///
/// # Exemple
///
/// ```no_run
/// use pmoconfig::{get_config, init_logging};
///
/// init_logging(&get_config());
/// tracing::info!("✅ logging ready");
/// ```
pub fn init_logging(config: &Config) {
    let level = config
        .get_log_min_level()
        .unwrap_or_else(|_| "INFO".to_string())
        .to_lowercase();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let registry = Registry::default().with(filter);
    let result = if enable_console {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_ansi(true),
            )
            .try_init()
    } else {
        registry.try_init()
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
