//! Dispatcher 指标导出模块
//!
//! 将 `MetricsSnapshot` 导出为 Prometheus 指标，并在内存中聚合会话统计。

use std::fmt;
use std::time::Duration;

use dispatcher::MetricsSnapshot;
use metrics::{counter, gauge, histogram};

/// 从 dispatcher 快照记录指标
///
/// 计数器使用 `absolute`，重复调用不会重复累加。
///
/// # Example
///
/// ```ignore
/// dispatcher.send_event(event);
/// record_dispatcher_snapshot(&dispatcher.metrics());
/// ```
pub fn record_dispatcher_snapshot(snapshot: &MetricsSnapshot) {
    gauge!("event_batcher_queue_len").set(snapshot.queue_len as f64);
    gauge!("event_batcher_posts_in_flight").set(snapshot.in_flight as f64);

    counter!("event_batcher_events_enqueued_total").absolute(snapshot.events_enqueued);
    counter!("event_batcher_batches_flushed_total").absolute(snapshot.batches_flushed);
    counter!("event_batcher_events_flushed_total").absolute(snapshot.events_flushed);
    counter!("event_batcher_forced_flushes_total").absolute(snapshot.forced_flushes);
    counter!("event_batcher_transport_failures_total").absolute(snapshot.transport_failures);
    counter!("event_batcher_storage_errors_total").absolute(snapshot.storage_errors);
    counter!("event_batcher_recovered_events_total").absolute(snapshot.recovered_events);
}

/// 记录事件提交
pub fn record_event_sent(event_name: Option<&str>, payload_bytes: usize) {
    counter!(
        "event_batcher_events_sent_total",
        "event_name" => event_name.unwrap_or("unnamed").to_string()
    )
    .increment(1);
    histogram!("event_batcher_event_payload_bytes").record(payload_bytes as f64);
}

/// 记录被跳过的输入行
pub fn record_line_skipped(reason: &str) {
    counter!(
        "event_batcher_lines_skipped_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 会话统计聚合器
///
/// CLI `run` 在内存中聚合输入统计，结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct SessionAggregator {
    /// 读取的输入行数
    pub lines_read: u64,

    /// 提交给 dispatcher 的事件数
    pub events_sent: u64,

    /// 跳过的行数 (非 JSON 对象)
    pub lines_skipped: u64,

    /// 事件负载大小 (字节)
    pub payload_bytes: RunningStats,
}

impl SessionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&mut self) {
        self.lines_read += 1;
    }

    pub fn record_sent(&mut self, event_name: Option<&str>, payload_bytes: usize) {
        self.events_sent += 1;
        self.payload_bytes.push(payload_bytes as f64);
        record_event_sent(event_name, payload_bytes);
    }

    pub fn record_skipped(&mut self, reason: &str) {
        self.lines_skipped += 1;
        record_line_skipped(reason);
    }

    /// 结合 dispatcher 快照生成摘要
    pub fn summary(&self, snapshot: MetricsSnapshot, elapsed: Duration) -> SessionSummary {
        SessionSummary {
            lines_read: self.lines_read,
            events_sent: self.events_sent,
            lines_skipped: self.lines_skipped,
            elapsed,
            payload_bytes: StatsSummary::from(&self.payload_bytes),
            dispatcher: snapshot,
        }
    }
}

/// 会话摘要
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub lines_read: u64,
    pub events_sent: u64,
    pub lines_skipped: u64,
    pub elapsed: Duration,
    pub payload_bytes: StatsSummary,
    pub dispatcher: MetricsSnapshot,
}

impl SessionSummary {
    /// 平均批大小
    pub fn mean_batch_size(&self) -> f64 {
        if self.dispatcher.batches_flushed == 0 {
            0.0
        } else {
            self.dispatcher.events_flushed as f64 / self.dispatcher.batches_flushed as f64
        }
    }

    /// 投递失败率 (%)
    pub fn failure_rate(&self) -> f64 {
        if self.dispatcher.batches_flushed == 0 {
            0.0
        } else {
            self.dispatcher.transport_failures as f64 / self.dispatcher.batches_flushed as f64
                * 100.0
        }
    }

    /// 每秒事件数
    pub fn events_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.events_sent as f64 / secs
        } else {
            0.0
        }
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.dispatcher;
        writeln!(f, "=== Event Batcher Session Summary ===")?;
        writeln!(f, "Duration: {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(
            f,
            "Lines read: {} (skipped {})",
            self.lines_read, self.lines_skipped
        )?;
        writeln!(
            f,
            "Events sent: {} ({:.2}/s)",
            self.events_sent,
            self.events_per_sec()
        )?;
        writeln!(f, "Payload bytes: {}", self.payload_bytes)?;
        writeln!(
            f,
            "Batches flushed: {} ({} forced, mean size {:.2})",
            d.batches_flushed,
            d.forced_flushes,
            self.mean_batch_size()
        )?;
        writeln!(
            f,
            "Transport failures: {} ({:.2}%)",
            d.transport_failures,
            self.failure_rate()
        )?;
        writeln!(f, "Recovered events: {}", d.recovered_events)?;
        if d.storage_errors > 0 {
            writeln!(f, "Storage errors: {}", d.storage_errors)?;
        }
        write!(f, "Pending events: {}", d.queue_len)
    }
}

/// 统计摘要
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            return write!(f, "N/A");
        }
        write!(
            f,
            "min={:.0}, max={:.0}, mean={:.1}, std={:.1} (n={})",
            self.min, self.max, self.mean, self.std_dev, self.count
        )
    }
}

/// 在线统计 (Welford)
#[derive(Debug, Clone, Copy, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for value in [10.0, 20.0, 30.0, 40.0] {
            stats.push(value);
        }

        assert_eq!(stats.count(), 4);
        assert!((stats.mean() - 25.0).abs() < 1e-10);
        assert!((stats.min() - 10.0).abs() < 1e-10);
        assert!((stats.max() - 40.0).abs() < 1e-10);
        assert!((stats.variance() - 166.666_666_666_666_66).abs() < 1e-6);
    }

    #[test]
    fn test_session_aggregator() {
        let mut session = SessionAggregator::new();
        session.record_line();
        session.record_sent(Some("page_view"), 64);
        session.record_line();
        session.record_skipped("not_an_object");

        assert_eq!(session.lines_read, 2);
        assert_eq!(session.events_sent, 1);
        assert_eq!(session.lines_skipped, 1);
        assert_eq!(session.payload_bytes.count(), 1);
    }

    #[test]
    fn test_summary_rates() {
        let snapshot = MetricsSnapshot {
            batches_flushed: 4,
            events_flushed: 10,
            transport_failures: 1,
            ..MetricsSnapshot::default()
        };
        let summary = SessionAggregator::new().summary(snapshot, Duration::from_secs(2));

        assert!((summary.mean_batch_size() - 2.5).abs() < 1e-10);
        assert!((summary.failure_rate() - 25.0).abs() < 1e-10);
        assert_eq!(summary.events_per_sec(), 0.0);
    }

    #[test]
    fn test_summary_display() {
        let mut session = SessionAggregator::new();
        session.record_line();
        session.record_sent(None, 32);
        let snapshot = MetricsSnapshot {
            queue_len: 1,
            events_enqueued: 1,
            ..MetricsSnapshot::default()
        };

        let output = session
            .summary(snapshot, Duration::from_millis(500))
            .to_string();
        assert!(output.contains("Events sent: 1"));
        assert!(output.contains("Pending events: 1"));
        assert!(!output.contains("Storage errors"));
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        record_dispatcher_snapshot(&MetricsSnapshot::default());
        record_line_skipped("empty");
    }
}
