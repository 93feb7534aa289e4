use std::collections::VecDeque;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::aggregator::{BacktestResult, ResultAggregator};
use crate::error::PipelineResult;

/// Lines of worker stderr kept for the process-death report.
pub const STDERR_TAIL_LINES: usize = 100;

/// Spawn a worker, aggregate its stdout protocol stream and wait for it.
///
/// Stdout and stderr are replaced with pipes. Lines that are not protocol
/// messages are logged and skipped. A non-zero exit yields
/// [`PipelineError::ProcessDeath`](crate::error::PipelineError::ProcessDeath)
/// carrying the stderr tail.
pub async fn run_worker(mut command: Command) -> PipelineResult<BacktestResult> {
    command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn()?;
    info!(pid = ?child.id(), "worker spawned");

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stderr_handle = tokio::spawn(async move {
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        if let Some(stderr) = stderr {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                debug!(target: "worker", "{line}");
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }
        Vec::from(tail)
    });

    let mut aggregator = ResultAggregator::new();
    if let Some(stdout) = stdout {
        let mut reader = BufReader::new(stdout).lines();
        while let Some(line) = reader.next_line().await? {
            if let Err(e) = aggregator.ingest_line(&line) {
                warn!(error = %e, line = %line, "skipping worker line");
            }
        }
    }

    let status = child.wait().await?;
    let stderr_tail = stderr_handle.await.unwrap_or_else(|e| {
        warn!(error = %e, "stderr reader failed");
        Vec::new()
    });

    aggregator.exit(status.code(), stderr_tail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    fn shell(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[tokio::test]
    async fn clean_worker_yields_consolidated_result() {
        let script = r#"
            echo '{"type":"candle","candle":{"start":0,"open":1,"high":2,"low":0.5,"close":1.5}}'
            echo '{"log":"working"}'
            echo 'not a protocol line'
            echo '{"type":"trade","trade":{"id":7}}'
            echo '{"type":"report","report":{"trades":1}}'
            echo 'progress' >&2
        "#;
        let result = run_worker(shell(script)).await.unwrap();

        assert_eq!(result.candles.len(), 1);
        assert_eq!(result.candles[0].close, 1.5);
        assert_eq!(result.trades.len(), 1);
        assert_eq!(result.report, Some(serde_json::json!({ "trades": 1 })));
    }

    #[tokio::test]
    async fn failing_worker_is_process_death() {
        let script = r#"
            echo '{"type":"candle","candle":{"start":0,"open":1,"high":1,"low":1,"close":1}}'
            echo 'boom' >&2
            exit 1
        "#;
        let err = run_worker(shell(script)).await.unwrap_err();
        match err {
            PipelineError::ProcessDeath { status, stderr_tail } => {
                assert_eq!(status, Some(1));
                assert_eq!(stderr_tail, vec!["boom".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let err = run_worker(Command::new("/nonexistent/advisor-worker")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
