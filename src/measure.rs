//! 计时与报表模块
//!
//! 提供以语句文本为键的测量点聚合：每条语句的执行被一个作用域内的
//! [`MeasurePoint`] 包裹，作用域退出时自动计入；执行失败的语句调用
//! [`MeasurePoint::discard`]，不产生样本。累积结果可渲染为纯文本或
//! CSV 报表。
//!
//! # 示例
//!
//! ```rust
//! use mysql_database_replay_querylog::measure::{BenchMonitor, ReportFormat};
//!
//! let monitor = BenchMonitor::new();
//! {
//!     let point = monitor.start_point("SELECT 1");
//!     // ... 执行语句 ...
//!     point.collect();
//! }
//!
//! let report = monitor.render(ReportFormat::Text);
//! assert!(report.contains("SELECT 1"));
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 报表输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// 对齐的纯文本表格
    Text,
    /// 逗号分隔，标签带引号转义
    Csv,
}

impl ReportFormat {
    /// 从字符串选择格式：`"csv"`（大小写不敏感）得到 CSV，其余一律纯文本
    pub fn get(format: &str) -> Self {
        if format.eq_ignore_ascii_case("csv") {
            Self::Csv
        } else {
            Self::Text
        }
    }
}

/// 单个测量点的聚合数据
#[derive(Debug, Clone)]
struct PointStats {
    count: u64,
    total: Duration,
    min: Duration,
    max: Duration,
}

impl PointStats {
    fn record(&mut self, elapsed: Duration) {
        self.count += 1;
        self.total += elapsed;
        if elapsed < self.min {
            self.min = elapsed;
        }
        if elapsed > self.max {
            self.max = elapsed;
        }
    }
}

/// 测量点的只读快照
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PointSummary {
    /// 测量点标签（语句文本）
    pub label: String,

    /// 样本数
    pub count: u64,

    /// 累计耗时
    pub total: Duration,

    /// 最小单次耗时
    pub min: Duration,

    /// 最大单次耗时
    pub max: Duration,
}

impl PointSummary {
    /// 平均单次耗时
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count as u32
        }
    }
}

struct MonitorInner {
    /// 标签首次出现的顺序，报表按此顺序输出
    order: Vec<String>,
    stats: HashMap<String, PointStats>,
}

/// 基准计时监视器
///
/// 线程安全：所有会话工作线程共享同一个监视器并发记录。
pub struct BenchMonitor {
    inner: Mutex<MonitorInner>,
}

impl BenchMonitor {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MonitorInner {
                order: Vec::new(),
                stats: HashMap::new(),
            }),
        }
    }

    /// 开启一个测量点
    ///
    /// 返回的 [`MeasurePoint`] 在作用域退出时自动计入；
    /// 显式调用 [`collect`](MeasurePoint::collect) 或
    /// [`discard`](MeasurePoint::discard) 可提前结束。
    pub fn start_point(&self, label: &str) -> MeasurePoint<'_> {
        MeasurePoint {
            monitor: self,
            label: Some(label.to_string()),
            start: Instant::now(),
        }
    }

    /// 计入一个样本
    fn record(&self, label: String, elapsed: Duration) {
        let mut inner = self.inner.lock().expect("monitor lock poisoned");
        match inner.stats.get_mut(&label) {
            Some(stats) => stats.record(elapsed),
            None => {
                inner.order.push(label.clone());
                inner.stats.insert(
                    label,
                    PointStats {
                        count: 1,
                        total: elapsed,
                        min: elapsed,
                        max: elapsed,
                    },
                );
            }
        }
    }

    /// 当前全部测量点的快照，按标签首次出现顺序排列
    pub fn snapshot(&self) -> Vec<PointSummary> {
        let inner = self.inner.lock().expect("monitor lock poisoned");
        inner
            .order
            .iter()
            .map(|label| {
                let stats = &inner.stats[label];
                PointSummary {
                    label: label.clone(),
                    count: stats.count,
                    total: stats.total,
                    min: stats.min,
                    max: stats.max,
                }
            })
            .collect()
    }

    /// 渲染累积结果
    pub fn render(&self, format: ReportFormat) -> String {
        let points = self.snapshot();
        match format {
            ReportFormat::Text => render_text(&points),
            ReportFormat::Csv => render_csv(&points),
        }
    }
}

impl Default for BenchMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// 作用域计时点
///
/// Drop 时计入样本，保证任何退出路径都会结束该测量点。
pub struct MeasurePoint<'m> {
    monitor: &'m BenchMonitor,
    /// None 表示已经收集或丢弃
    label: Option<String>,
    start: Instant,
}

impl MeasurePoint<'_> {
    /// 立即结束并计入样本
    pub fn collect(mut self) {
        self.finish();
    }

    /// 结束但不计入样本（语句执行失败时使用）
    pub fn discard(mut self) {
        self.label = None;
    }

    fn finish(&mut self) {
        if let Some(label) = self.label.take() {
            self.monitor.record(label, self.start.elapsed());
        }
    }
}

impl Drop for MeasurePoint<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1_000.0
}

fn render_text(points: &[PointSummary]) -> String {
    let label_width = points
        .iter()
        .map(|p| p.label.len())
        .chain(std::iter::once("Measurement Point".len()))
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    out.push_str(&format!(
        "| {:<label_width$} | {:>8} | {:>12} | {:>12} | {:>12} | {:>12} |\n",
        "Measurement Point", "#", "Average (ms)", "Min (ms)", "Max (ms)", "Total (ms)",
    ));
    for point in points {
        out.push_str(&format!(
            "| {:<label_width$} | {:>8} | {:>12.3} | {:>12.3} | {:>12.3} | {:>12.3} |\n",
            point.label,
            point.count,
            millis(point.average()),
            millis(point.min),
            millis(point.max),
            millis(point.total),
        ));
    }
    out
}

fn render_csv(points: &[PointSummary]) -> String {
    let mut out = String::from("point,count,average_ms,min_ms,max_ms,total_ms\n");
    for point in points {
        out.push_str(&format!(
            "\"{}\",{},{:.3},{:.3},{:.3},{:.3}\n",
            point.label.replace('"', "\"\""),
            point.count,
            millis(point.average()),
            millis(point.min),
            millis(point.max),
            millis(point.total),
        ));
    }
    out
}
