//! Import every container the runtime knows about into the watch list.

use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, ConfigManager};
use crate::invoker::{CommandSpec, InvokeError, ProcessInvoker};
use crate::parser::parse_names;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("could not list containers: {0}")]
    Invoke(#[from] InvokeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// List all container names with `command` and merge them into the watch
/// list. Existing entries keep their position; new names are appended in
/// listing order.
///
/// Returns the names that were added.
pub async fn import_from_runtime(
    config: &ConfigManager,
    invoker: &dyn ProcessInvoker,
    command: &CommandSpec,
    timeout: Duration,
) -> Result<Vec<String>, ImportError> {
    let output = invoker.invoke(command, timeout).await?;
    let names = parse_names(&output.stdout);
    info!("Runtime lists {} containers", names.len());

    Ok(config.import_names(&names)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::testing::{Script, ScriptedInvoker};
    use crate::invoker::DEFAULT_DOCKER;

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn merges_listed_names() {
        let config = ConfigManager::in_memory();
        config.import_names(["a", "c"]).unwrap();
        let invoker = ScriptedInvoker::stdout("b\na\n\nd\n");
        let command = CommandSpec::docker_names(DEFAULT_DOCKER);

        let added = import_from_runtime(&config, invoker.as_ref(), &command, TIMEOUT)
            .await
            .unwrap();

        assert_eq!(added, vec!["b", "d"]);
        assert_eq!(config.get_config().watch_list(), ["a", "c", "b", "d"]);
        assert_eq!(invoker.commands(), vec![command]);
    }

    #[tokio::test]
    async fn nothing_new_emits_no_event() {
        let config = ConfigManager::in_memory();
        config.import_names(["web"]).unwrap();
        let mut events = config.subscribe();
        let invoker = ScriptedInvoker::stdout("web\n");

        let added = import_from_runtime(
            &config,
            invoker.as_ref(),
            &CommandSpec::docker_names(DEFAULT_DOCKER),
            TIMEOUT,
        )
        .await
        .unwrap();

        assert!(added.is_empty());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn runtime_failure_leaves_config_untouched() {
        let config = ConfigManager::in_memory();
        config.import_names(["web"]).unwrap();
        let invoker = ScriptedInvoker::new(Script::ExitFailure("daemon down".into()));

        let result = import_from_runtime(
            &config,
            invoker.as_ref(),
            &CommandSpec::docker_names(DEFAULT_DOCKER),
            TIMEOUT,
        )
        .await;

        assert!(matches!(result, Err(ImportError::Invoke(InvokeError::NonZeroExit { .. }))));
        assert_eq!(config.get_config().watch_list(), ["web"]);
    }
}
