// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Timed task dispatch: cron- and tick-driven callbacks plus a lazy stream
//! of fire instants.

use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::Stream;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A schedule: a standard 5-field cron expression or a fixed millisecond
/// tick.  `once` limits the schedule to its first fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimedTask {
    Cron { expr: String, once: bool },
    Tick { period: Duration, once: bool },
}

impl TimedTask {
    pub fn cron(expr: impl Into<String>) -> Self {
        Self::Cron {
            expr: expr.into(),
            once: false,
        }
    }

    pub fn cron_once(expr: impl Into<String>) -> Self {
        Self::Cron {
            expr: expr.into(),
            once: true,
        }
    }

    pub fn tick(period: Duration) -> Self {
        Self::Tick {
            period,
            once: false,
        }
    }

    pub fn tick_once(period: Duration) -> Self {
        Self::Tick {
            period,
            once: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression `{expr}`: {source}")]
    InvalidCron {
        expr: String,
        source: cron::error::Error,
    },
    #[error("tick period must be non-zero")]
    ZeroTick,
}

/// Handle to a spawned schedule.  `cancel` is idempotent; the schedule
/// stops at its next suspension point.
#[derive(Debug, Clone)]
pub struct TimedTab {
    cancel: CancellationToken,
}

impl TimedTab {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[derive(Debug)]
enum ScheduleKind {
    Cron { schedule: cron::Schedule, once: bool },
    Tick { period: Duration, once: bool },
}

fn parse_schedule(task: &TimedTask) -> Result<ScheduleKind, ScheduleError> {
    match task {
        TimedTask::Cron { expr, once } => {
            // The cron crate wants a seconds field; a standard 5-field
            // expression gets one prepended.
            let full = if expr.split_whitespace().count() == 5 {
                format!("0 {expr}")
            } else {
                expr.clone()
            };
            let schedule =
                cron::Schedule::from_str(&full).map_err(|source| ScheduleError::InvalidCron {
                    expr: expr.clone(),
                    source,
                })?;
            Ok(ScheduleKind::Cron {
                schedule,
                once: *once,
            })
        }
        TimedTask::Tick { period, once } => {
            if period.is_zero() {
                return Err(ScheduleError::ZeroTick);
            }
            Ok(ScheduleKind::Tick {
                period: *period,
                once: *once,
            })
        }
    }
}

/// Spawn a schedule firing `callback(fire_instant, &tab)` until cancelled,
/// or after the first fire when the task is `once`.  Invalid schedules fail
/// here, not inside the background task.
pub fn spawn_timed<F>(task: TimedTask, mut callback: F) -> Result<TimedTab, ScheduleError>
where
    F: FnMut(DateTime<Utc>, &TimedTab) + Send + 'static,
{
    let kind = parse_schedule(&task)?;
    let tab = TimedTab {
        cancel: CancellationToken::new(),
    };
    let worker = tab.clone();

    tokio::spawn(async move {
        match kind {
            ScheduleKind::Tick { period, once } => loop {
                tokio::select! {
                    biased;
                    _ = worker.cancel.cancelled() => break,
                    _ = tokio::time::sleep(period) => {}
                }
                callback(Utc::now(), &worker);
                if once {
                    worker.cancel();
                    break;
                }
            },
            ScheduleKind::Cron { schedule, once } => loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    debug!("cron schedule has no further fire instants");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    biased;
                    _ = worker.cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                callback(next, &worker);
                if once {
                    worker.cancel();
                    break;
                }
            },
        }
    });

    Ok(tab)
}

/// Lazy, possibly-infinite stream of fire instants.
///
/// Fires that outpace the consumer queue in order; a waiting consumer is
/// woken directly by the next fire.  Dropping the stream cancels the
/// underlying schedule; calling [`iterate_timed`] again builds a fresh one.
pub struct TimedStream {
    inner: UnboundedReceiverStream<DateTime<Utc>>,
    tab: TimedTab,
}

impl TimedStream {
    pub fn tab(&self) -> &TimedTab {
        &self.tab
    }
}

impl Stream for TimedStream {
    type Item = DateTime<Utc>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for TimedStream {
    fn drop(&mut self) {
        self.tab.cancel();
    }
}

pub fn iterate_timed(task: TimedTask) -> Result<TimedStream, ScheduleError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let tab = spawn_timed(task, move |instant, tab| {
        // A closed receiver means the consumer is gone; stop the schedule.
        if tx.send(instant).is_err() {
            tab.cancel();
        }
    })?;
    Ok(TimedStream {
        inner: UnboundedReceiverStream::new(rx),
        tab,
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[test]
    fn five_field_cron_is_accepted() {
        assert!(parse_schedule(&TimedTask::cron("*/5 * * * *")).is_ok());
    }

    #[test]
    fn six_field_cron_is_accepted() {
        assert!(parse_schedule(&TimedTask::cron("0 */5 * * * *")).is_ok());
    }

    #[test]
    fn invalid_cron_is_rejected_at_parse_time() {
        let err = parse_schedule(&TimedTask::cron("not a cron expression")).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidCron { .. }));
    }

    #[test]
    fn zero_tick_is_rejected() {
        let err = parse_schedule(&TimedTask::tick(Duration::ZERO)).unwrap_err();
        assert!(matches!(err, ScheduleError::ZeroTick));
    }

    #[tokio::test(start_paused = true)]
    async fn tick_stream_yields_fires_in_order() {
        let mut stream = iterate_timed(TimedTask::tick(Duration::from_millis(10))).unwrap();
        let mut fires = Vec::new();
        for _ in 0..3 {
            fires.push(stream.next().await.unwrap());
        }
        assert_eq!(fires.len(), 3);
        assert!(fires.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn once_task_fires_exactly_once_then_ends() {
        let mut stream = iterate_timed(TimedTask::tick_once(Duration::from_millis(5))).unwrap();
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none(), "stream ends after the single fire");
        assert!(stream.tab().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_ends_the_stream() {
        let mut stream = iterate_timed(TimedTask::tick(Duration::from_millis(5))).unwrap();
        let first = stream.next().await;
        assert!(first.is_some());
        stream.tab().cancel();
        // Fires already queued may still drain; the stream must end after.
        while stream.next().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let tab = spawn_timed(TimedTask::tick(Duration::from_millis(5)), |_, _| {}).unwrap();
        tab.cancel();
        tab.cancel();
        assert!(tab.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_cancels_the_schedule() {
        let stream = iterate_timed(TimedTask::tick(Duration::from_millis(5))).unwrap();
        let tab = stream.tab().clone();
        drop(stream);
        assert!(tab.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_consumer_sees_queued_fires_in_order() {
        let mut stream = iterate_timed(TimedTask::tick(Duration::from_millis(1))).unwrap();
        // Let several fires queue up before consuming.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let a = stream.next().await.unwrap();
        let b = stream.next().await.unwrap();
        let c = stream.next().await.unwrap();
        assert!(a <= b && b <= c);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_receives_the_tab_and_can_self_cancel() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _tab = spawn_timed(TimedTask::tick(Duration::from_millis(2)), move |at, tab| {
            let _ = tx.send(at);
            tab.cancel();
        })
        .unwrap();
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none(), "self-cancel stops further fires");
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_iteration_creates_a_fresh_schedule() {
        let task = TimedTask::tick(Duration::from_millis(3));
        let mut first = iterate_timed(task.clone()).unwrap();
        assert!(first.next().await.is_some());
        drop(first);

        let mut second = iterate_timed(task).unwrap();
        assert!(second.next().await.is_some());
    }
}
