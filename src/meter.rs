// meter.rs
// Description: Running averages for loss and accuracy reporting.
//              AverageMeter keeps val, sum, count and avg; ProgressMeter formats a set of
//              meters into one progress line per batch and one summary line per epoch.
//              Lines are printed to stdout and emitted on the "logger" tracing target.
// History:
// - 2026-10-16: Add AverageMeter, Summary and ProgressMeter.
// - 2026-10-17: Add SumReducer hook for all_reduce.

use std::fmt;
use std::str::FromStr;

use crate::error::MetricsError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Summary {
    None,
    #[default]
    Average,
    Sum,
    Count,
}

impl FromStr for Summary {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Summary::None),
            "average" | "avg" => Ok(Summary::Average),
            "sum" => Ok(Summary::Sum),
            "count" => Ok(Summary::Count),
            _ => Err(MetricsError::InvalidSummaryType(s.to_string())),
        }
    }
}

impl TryFrom<i32> for Summary {
    type Error = MetricsError;

    fn try_from(i_code: i32) -> Result<Self, Self::Error> {
        match i_code {
            0 => Ok(Summary::None),
            1 => Ok(Summary::Average),
            2 => Ok(Summary::Sum),
            3 => Ok(Summary::Count),
            other => Err(MetricsError::InvalidSummaryType(other.to_string())),
        }
    }
}

/// Fixed point number format in the `":[width][.precision]f"` form.
/// Precision defaults to 6, width pads on the left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeterFormat {
    opt_width: Option<usize>,
    i_precision: usize,
}

impl Default for MeterFormat {
    fn default() -> Self {
        Self {
            opt_width: None,
            i_precision: 6,
        }
    }
}

impl MeterFormat {
    pub fn format(&self, d_value: f64) -> String {
        match self.opt_width {
            Some(i_w) => format!("{:>w$.p$}", d_value, w = i_w, p = self.i_precision),
            None => format!("{:.p$}", d_value, p = self.i_precision),
        }
    }
}

impl FromStr for MeterFormat {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MetricsError::InvalidFormat(s.to_string());
        let s_body = s
            .strip_prefix(':')
            .and_then(|r| r.strip_suffix('f'))
            .ok_or_else(invalid)?;

        let (s_width, opt_precision) = match s_body.split_once('.') {
            Some((s_w, s_p)) => (s_w, Some(s_p)),
            None => (s_body, None),
        };

        let opt_width = if s_width.is_empty() {
            None
        } else {
            Some(s_width.parse::<usize>().map_err(|_| invalid())?)
        };
        let i_precision = match opt_precision {
            None => 6,
            Some(s_p) => s_p.parse::<usize>().map_err(|_| invalid())?,
        };

        Ok(Self { opt_width, i_precision })
    }
}

/// Cross worker sum reduction of `(sum, count)`.
pub trait SumReducer {
    fn reduce_sum(&self, a_values: [f64; 2]) -> [f64; 2];
}

/// Single process reducer: the local totals are already global.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalReducer;

impl SumReducer for LocalReducer {
    fn reduce_sum(&self, a_values: [f64; 2]) -> [f64; 2] {
        a_values
    }
}

/// Computes and stores the average and current value.
#[derive(Clone, Debug, PartialEq)]
pub struct AverageMeter {
    s_name: String,
    fmt: MeterFormat,
    summary_type: Summary,
    d_val: f64,
    d_avg: f64,
    d_sum: f64,
    d_count: f64,
}

impl AverageMeter {
    pub fn new(s_name: &str, s_fmt: &str, summary_type: Summary) -> Result<Self, MetricsError> {
        Ok(Self {
            s_name: s_name.to_string(),
            fmt: s_fmt.parse()?,
            summary_type,
            d_val: 0.0,
            d_avg: 0.0,
            d_sum: 0.0,
            d_count: 0.0,
        })
    }

    /// `":f"` format with an average summary.
    pub fn named(s_name: &str) -> Self {
        Self {
            s_name: s_name.to_string(),
            fmt: MeterFormat::default(),
            summary_type: Summary::Average,
            d_val: 0.0,
            d_avg: 0.0,
            d_sum: 0.0,
            d_count: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.s_name
    }

    pub fn val(&self) -> f64 {
        self.d_val
    }

    pub fn avg(&self) -> f64 {
        self.d_avg
    }

    pub fn sum(&self) -> f64 {
        self.d_sum
    }

    pub fn count(&self) -> f64 {
        self.d_count
    }

    pub fn summary_type(&self) -> Summary {
        self.summary_type
    }

    pub fn reset(&mut self) {
        self.d_val = 0.0;
        self.d_avg = 0.0;
        self.d_sum = 0.0;
        self.d_count = 0.0;
    }

    pub fn update(&mut self, d_val: f64, i_n: usize) {
        self.d_val = d_val;
        self.d_sum += d_val * i_n as f64;
        self.d_count += i_n as f64;
        self.recompute_avg();
    }

    /// Drops the history and seeds the meter with one update.
    pub fn reset2update(&mut self, d_val: f64, i_n: usize) {
        self.reset();
        self.update(d_val, i_n);
    }

    pub fn all_reduce(&mut self) {
        self.all_reduce_with(&LocalReducer);
    }

    pub fn all_reduce_with<R: SumReducer>(&mut self, reducer: &R) {
        let [d_sum, d_count] = reducer.reduce_sum([self.d_sum, self.d_count]);
        self.d_sum = d_sum;
        self.d_count = d_count;
        self.recompute_avg();
    }

    fn recompute_avg(&mut self) {
        self.d_avg = if self.d_count == 0.0 { 0.0 } else { self.d_sum / self.d_count };
    }

    pub fn summary(&self) -> String {
        match self.summary_type {
            Summary::None => String::new(),
            Summary::Average => format!("{} {:.5}", self.s_name, self.d_avg),
            Summary::Sum => format!("{} {:.5}", self.s_name, self.d_sum),
            Summary::Count => format!("{} {:.5}", self.s_name, self.d_count),
        }
    }
}

impl fmt::Display for AverageMeter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.s_name,
            self.fmt.format(self.d_val),
            self.fmt.format(self.d_avg)
        )
    }
}

pub struct ProgressMeter {
    i_num_batches: usize,
    v_meters: Vec<AverageMeter>,
    s_prefix: String,
}

impl ProgressMeter {
    pub fn new(i_num_batches: usize, v_meters: Vec<AverageMeter>, s_prefix: &str) -> Self {
        Self {
            i_num_batches,
            v_meters,
            s_prefix: s_prefix.to_string(),
        }
    }

    pub fn meters(&self) -> &[AverageMeter] {
        &self.v_meters
    }

    pub fn meters_mut(&mut self) -> &mut [AverageMeter] {
        &mut self.v_meters
    }

    pub fn meter_mut(&mut self, s_name: &str) -> Option<&mut AverageMeter> {
        self.v_meters.iter_mut().find(|m| m.name() == s_name)
    }

    pub fn reset(&mut self) {
        for m in self.v_meters.iter_mut() {
            m.reset();
        }
    }

    fn batch_prefix(&self, i_batch: usize) -> String {
        let i_digits = self.i_num_batches.to_string().len();
        format!(
            "{}[{:0w$}/{}]",
            self.s_prefix,
            i_batch,
            self.i_num_batches,
            w = i_digits
        )
    }

    pub fn format_batch(&self, i_batch: usize) -> String {
        let mut v_entries: Vec<String> = Vec::with_capacity(self.v_meters.len() + 1);
        v_entries.push(self.batch_prefix(i_batch));
        v_entries.extend(self.v_meters.iter().map(|m| m.to_string()));
        v_entries.join(" ")
    }

    pub fn format_summary(&self) -> String {
        let mut v_entries: Vec<String> = Vec::with_capacity(self.v_meters.len() + 1);
        v_entries.push(format!("{} *", self.s_prefix));
        v_entries.extend(self.v_meters.iter().map(|m| m.summary()));
        v_entries.join(" ")
    }

    /// Prints the batch line to stdout, emits it as an info event on the `logger`
    /// target and returns it.
    pub fn display(&self, i_batch: usize) -> String {
        let s_line = self.format_batch(i_batch);
        emit(&s_line);
        s_line
    }

    /// Same as `display` for the summary line.
    pub fn display_summary(&self) -> String {
        let s_line = self.format_summary();
        emit(&s_line);
        s_line
    }
}

fn emit(s_line: &str) {
    println!("{}", s_line);
    tracing::info!(target: "logger", "{}", s_line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_update_tracks_mean() {
        let mut m = AverageMeter::named("Loss");
        let v_vals = [0.5, 1.5, 2.0, 4.0];
        for &d in v_vals.iter() {
            m.update(d, 1);
        }
        assert_abs_diff_eq!(m.avg(), 2.0, epsilon = 1e-12);
        assert_eq!(m.val(), 4.0);
        assert_eq!(m.count(), 4.0);

        m.update(10.0, 4);
        assert_abs_diff_eq!(m.avg(), 48.0 / 8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_and_reset2update() {
        let mut m = AverageMeter::named("Acc");
        m.update(3.0, 2);
        m.reset();
        assert_eq!((m.val(), m.avg(), m.sum(), m.count()), (0.0, 0.0, 0.0, 0.0));

        m.update(1.0, 1);
        m.reset2update(7.0, 3);
        assert_eq!((m.val(), m.avg(), m.sum(), m.count()), (7.0, 7.0, 21.0, 3.0));
    }

    struct DoublingReducer;

    impl SumReducer for DoublingReducer {
        fn reduce_sum(&self, a_values: [f64; 2]) -> [f64; 2] {
            [a_values[0] * 2.0, a_values[1] * 2.0 + 2.0]
        }
    }

    #[test]
    fn test_all_reduce() {
        let mut m = AverageMeter::named("Loss");
        m.update(2.0, 2);
        m.all_reduce();
        assert_eq!((m.sum(), m.count(), m.avg()), (4.0, 2.0, 2.0));

        m.all_reduce_with(&DoublingReducer);
        assert_eq!((m.sum(), m.count()), (8.0, 6.0));
        assert_abs_diff_eq!(m.avg(), 8.0 / 6.0, epsilon = 1e-12);

        let mut m_empty = AverageMeter::named("Empty");
        m_empty.all_reduce();
        assert_eq!(m_empty.avg(), 0.0);
    }

    #[test]
    fn test_display_formats() {
        let mut m = AverageMeter::new("Loss", ":.3f", Summary::Average).unwrap();
        m.update(1.0, 1);
        m.update(2.0, 1);
        assert_eq!(m.to_string(), "Loss 2.000 (1.500)");

        let mut m = AverageMeter::new("Acc", ":6.2f", Summary::Average).unwrap();
        m.update(97.5, 1);
        assert_eq!(m.to_string(), "Acc  97.50 ( 97.50)");

        let m = AverageMeter::named("Time");
        assert_eq!(m.to_string(), "Time 0.000000 (0.000000)");

        assert!(AverageMeter::new("Bad", "6.2f", Summary::Average).is_err());
        assert!(AverageMeter::new("Bad", ":d", Summary::Average).is_err());
        assert!(AverageMeter::new("Bad", ":x.2f", Summary::Average).is_err());
    }

    #[test]
    fn test_summary_by_type() {
        let mut m = AverageMeter::new("Loss", ":f", Summary::Sum).unwrap();
        m.update(1.25, 2);
        assert_eq!(m.summary(), "Loss 2.50000");

        let mut m = AverageMeter::new("Acc", ":f", Summary::Average).unwrap();
        m.update(0.5, 1);
        assert_eq!(m.summary(), "Acc 0.50000");

        let mut m = AverageMeter::new("N", ":f", Summary::Count).unwrap();
        m.update(0.5, 3);
        assert_eq!(m.summary(), "N 3.00000");

        let m = AverageMeter::new("Quiet", ":f", Summary::None).unwrap();
        assert_eq!(m.summary(), "");
    }

    #[test]
    fn test_summary_parsing_rejects_unknown() {
        assert_eq!("SUM".parse::<Summary>().unwrap(), Summary::Sum);
        assert_eq!(Summary::try_from(3).unwrap(), Summary::Count);
        assert!(matches!("median".parse::<Summary>(), Err(MetricsError::InvalidSummaryType(_))));
        assert!(matches!(Summary::try_from(7), Err(MetricsError::InvalidSummaryType(_))));
    }

    #[test]
    fn test_progress_lines() {
        let mut pm = ProgressMeter::new(
            120,
            vec![
                AverageMeter::new("Loss", ":.2f", Summary::Average).unwrap(),
                AverageMeter::new("Acc", ":.1f", Summary::Sum).unwrap(),
            ],
            "Epoch: [3]",
        );
        pm.meter_mut("Loss").unwrap().update(0.5, 1);
        pm.meter_mut("Acc").unwrap().update(90.0, 1);

        assert_eq!(pm.display(7), "Epoch: [3][007/120] Loss 0.50 (0.50) Acc 90.0 (90.0)");
        assert_eq!(pm.display_summary(), "Epoch: [3] * Loss 0.50000 Acc 90.00000");

        pm.reset();
        assert!(pm.meters().iter().all(|m| m.count() == 0.0));
        assert!(pm.meter_mut("missing").is_none());
    }

    #[derive(Clone, Default)]
    struct CaptureWriter(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CaptureWriter {
        type Writer = CaptureWriter;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_display_lines_reach_logger_target() {
        let capture = CaptureWriter::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_target(true)
            .finish();

        let mut meter = AverageMeter::named("Loss");
        meter.update(0.5, 1);
        let progress = ProgressMeter::new(12, vec![meter], "Test: ");
        let (s_batch, s_summary) = tracing::subscriber::with_default(subscriber, || {
            (progress.display(3), progress.display_summary())
        });

        let s_logged = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let v_lines: Vec<&str> = s_logged.lines().collect();
        assert_eq!(v_lines.len(), 2);
        assert!(v_lines[0].contains("INFO"));
        assert!(v_lines[0].contains("logger:"));
        assert!(v_lines[0].ends_with(&s_batch));
        assert!(v_lines[1].contains("logger:"));
        assert!(v_lines[1].ends_with(&s_summary));
    }
}
