//! Built-in tasks, registered by the dispatcher binary.

use async_trait::async_trait;
use std::time::Duration;

use super::task::{TaskContext, TaskHandler, TaskResult};

/// Task: log its arguments. Useful for smoke-testing a deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoTask;

#[async_trait]
impl TaskHandler for EchoTask {
    fn name(&self) -> &'static str {
        "echo"
    }

    async fn perform(&self, ctx: &TaskContext) -> TaskResult {
        let args = serde_json::to_string(ctx.arguments()).unwrap_or_default();
        ctx.log_info(&format!("echo {}", args));
        Ok(())
    }
}

/// Task: sleep for `seconds` (float). Occupies a worker slot for load tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepTask;

#[async_trait]
impl TaskHandler for SleepTask {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn retry_strategy(&self) -> Vec<Duration> {
        vec![Duration::from_secs(1), Duration::from_secs(5)]
    }

    async fn perform(&self, ctx: &TaskContext) -> TaskResult {
        let seconds: f64 = ctx.argument("seconds")?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(crate::tasks::TaskError::terminal(format!(
                "seconds must be a non-negative number, got {}",
                seconds
            )));
        }
        ctx.log_info(&format!("sleeping {}s", seconds));
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(())
    }
}
