//! Engine connection with bounded retries and a fixed backoff.

use std::thread;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::io::config::ConnectConfig;
use crate::io::engine::{Connector, Engine, EngineError, EngineResult};

/// Try to connect up to `policy.attempts` times, sleeping `policy.backoff_ms`
/// between attempts. Only [`EngineError::Connect`] is retried; any other error
/// is returned immediately.
#[instrument(skip_all, fields(attempts = policy.attempts, backoff_ms = policy.backoff_ms))]
pub fn connect_with_retry(
    connector: &mut dyn Connector,
    policy: &ConnectConfig,
) -> EngineResult<Box<dyn Engine>> {
    let backoff = Duration::from_millis(policy.backoff_ms);
    let mut last_err = EngineError::Connect("no connection attempts configured".to_string());

    for attempt in 1..=policy.attempts {
        match connector.connect() {
            Ok(engine) => {
                debug!(attempt, "connected to spreadsheet engine");
                return Ok(engine);
            }
            Err(err) if err.is_retryable() => {
                warn!(attempt, err = %err, "engine connection attempt failed");
                last_err = err;
                if attempt < policy.attempts {
                    thread::sleep(backoff);
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedConnector;

    fn policy(attempts: u32) -> ConnectConfig {
        ConnectConfig {
            attempts,
            backoff_ms: 0,
        }
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut connector = ScriptedConnector::failing(2);
        let engine = connect_with_retry(&mut connector, &policy(3));
        assert!(engine.is_ok());
        assert_eq!(connector.attempts(), 3);
    }

    #[test]
    fn gives_up_after_the_configured_attempts() {
        let mut connector = ScriptedConnector::failing(5);
        let err = connect_with_retry(&mut connector, &policy(3)).err().expect("should fail");
        assert!(matches!(err, EngineError::Connect(_)));
        assert_eq!(connector.attempts(), 3);
    }

    #[test]
    fn non_connect_errors_are_not_retried() {
        let mut connector = ScriptedConnector::broken();
        let err = connect_with_retry(&mut connector, &policy(5)).err().expect("should fail");
        assert!(matches!(err, EngineError::Failed(_)));
        assert_eq!(connector.attempts(), 1);
    }
}
