use std::time::Instant;

use crate::{prettyprint_usize, PROGRESS_FREQUENCY_SECONDS};

pub fn elapsed_seconds(since: Instant) -> f64 {
    let dt = since.elapsed();
    (dt.as_secs() as f64) + (f64::from(dt.subsec_nanos()) * 1e-9)
}

pub fn prettyprint_time(seconds: f64) -> String {
    format!("{:.4}s", seconds)
}

struct Progress {
    label: String,
    processed_items: usize,
    total_items: usize,
    started_at: Instant,
    last_printed_at: Instant,
}

impl Progress {
    fn new(label: &str, total_items: usize) -> Progress {
        Progress {
            label: label.to_string(),
            processed_items: 0,
            total_items,
            started_at: Instant::now(),
            last_printed_at: Instant::now(),
        }
    }

    // Returns when done
    fn next(&mut self) -> Option<(f64, String)> {
        self.processed_items += 1;
        if self.processed_items > self.total_items {
            // Callers miscounting is harmless; just stop reporting.
            return None;
        }

        if self.processed_items == self.total_items {
            let elapsed = elapsed_seconds(self.started_at);
            let line = format!(
                "{} ({})... {}",
                self.label,
                prettyprint_usize(self.total_items),
                prettyprint_time(elapsed)
            );
            info!("{}", line);
            return Some((elapsed, line));
        } else if elapsed_seconds(self.last_printed_at) >= PROGRESS_FREQUENCY_SECONDS {
            self.last_printed_at = Instant::now();
            info!(
                "{}: {}/{}... {}",
                self.label,
                prettyprint_usize(self.processed_items),
                prettyprint_usize(self.total_items),
                prettyprint_time(elapsed_seconds(self.started_at))
            );
        }
        None
    }
}

enum StackEntry {
    TimerSpan(TimerSpan),
    Progress(Progress),
}

struct TimerSpan {
    name: String,
    started_at: Instant,
    nested_results: Vec<String>,
    nested_time: f64,
}

/// Hierarchial magic. Times nested phases, reports progress through long loops, and accumulates
/// warnings so they can be reviewed together at the end instead of scrolling through the log.
pub struct Timer {
    results: Vec<String>,
    stack: Vec<StackEntry>,

    outermost_name: String,

    notes: Vec<String>,
    warnings: Vec<String>,
}

impl Timer {
    pub fn new<I: AsRef<str>>(raw_name: I) -> Timer {
        let name = raw_name.as_ref();
        let mut t = Timer {
            results: Vec::new(),
            stack: Vec::new(),
            outermost_name: name.to_string(),
            notes: Vec::new(),
            warnings: Vec::new(),
        };
        t.start(name);
        t
    }

    // TODO Shouldn't use this much.
    pub fn throwaway() -> Timer {
        Timer::new("throwaway")
    }

    /// Log immediately, but also repeat at the end, to avoid having to scroll up and find
    /// interesting debug stuff.
    pub fn note<I: Into<String>>(&mut self, raw_line: I) {
        let line = raw_line.into();
        info!("{}", line);
        self.notes.push(line);
    }

    /// Record a data-quality problem. Logged now and summarized when the Timer finishes.
    pub fn warn<I: Into<String>>(&mut self, raw_line: I) {
        let line = raw_line.into();
        warn!("{}", line);
        self.warnings.push(line);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    // Used to end the scope of a timer early.
    pub fn done(self) {}

    pub fn start<I: AsRef<str>>(&mut self, raw_name: I) {
        let name = raw_name.as_ref();
        info!("{}...", name);
        self.stack.push(StackEntry::TimerSpan(TimerSpan {
            name: name.to_string(),
            started_at: Instant::now(),
            nested_results: Vec::new(),
            nested_time: 0.0,
        }));
    }

    pub fn stop<I: AsRef<str>>(&mut self, raw_name: I) {
        let name = raw_name.as_ref();
        let span = match self.stack.pop() {
            Some(StackEntry::TimerSpan(s)) => s,
            Some(StackEntry::Progress(p)) => {
                panic!("stop({}) while Progress({}) is top of the stack", name, p.label)
            }
            None => panic!("stop({}) with nothing on the stack", name),
        };
        assert_eq!(span.name, name);
        let elapsed = elapsed_seconds(span.started_at);
        let line = format!("{} took {}", name, prettyprint_time(elapsed));

        let padding = "  ".repeat(self.stack.len());
        match self.stack.last_mut() {
            Some(StackEntry::TimerSpan(ref mut s)) => {
                s.nested_results.push(format!("{}- {}", padding, line));
                s.nested_results.extend(span.nested_results);
                s.nested_time += elapsed;
            }
            Some(StackEntry::Progress(_)) => unreachable!(),
            None => {
                self.results.push(format!("{}- {}", padding, line));
                self.results.extend(span.nested_results);
            }
        }

        info!("{}", line);
    }

    pub fn start_iter<I: AsRef<str>>(&mut self, raw_name: I, total_items: usize) {
        if total_items == 0 {
            return;
        }
        let name = raw_name.as_ref();
        if let Some(StackEntry::Progress(p)) = self.stack.last() {
            panic!(
                "Can't start_iter({}) while Progress({}) is top of the stack",
                name, p.label
            );
        }

        self.stack
            .push(StackEntry::Progress(Progress::new(name, total_items)));
    }

    pub fn next(&mut self) {
        let maybe_result =
            if let Some(StackEntry::Progress(ref mut progress)) = self.stack.last_mut() {
                progress.next()
            } else {
                panic!("Can't next() while a TimerSpan is top of the stack");
            };
        if let Some((elapsed, result)) = maybe_result {
            self.stack.pop();
            self.add_result(elapsed, result);
        }
    }

    fn add_result(&mut self, elapsed: f64, line: String) {
        let padding = "  ".repeat(self.stack.len());
        match self.stack.last_mut() {
            Some(StackEntry::TimerSpan(ref mut s)) => {
                s.nested_results.push(format!("{}- {}", padding, line));
                s.nested_time += elapsed;
            }
            Some(StackEntry::Progress(_)) => unreachable!(),
            None => {
                self.results.push(format!("{}- {}", padding, line));
            }
        }
    }
}

impl std::ops::Drop for Timer {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let stop_name = self.outermost_name.clone();

        // Unfinished progress loops are fine to abandon
        while let Some(StackEntry::Progress(_)) = self.stack.last() {
            self.stack.pop();
        }
        match self.stack.last() {
            Some(StackEntry::TimerSpan(ref s)) if s.name == stop_name => {
                self.stop(&stop_name);
            }
            Some(StackEntry::TimerSpan(ref s)) => {
                warn!("dropping Timer {} while {} is still running", stop_name, s.name);
                return;
            }
            _ => {}
        }

        for line in &self.results {
            info!("{}", line);
        }

        if !self.notes.is_empty() {
            info!("{} notes:", self.notes.len());
            for line in &self.notes {
                info!("{}", line);
            }
        }
        if !self.warnings.is_empty() {
            warn!("{} warnings:", self.warnings.len());
            for line in &self.warnings {
                warn!("{}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_spans_and_warnings() {
        let mut timer = Timer::new("outer");
        timer.start("inner");
        timer.start_iter("loop", 3);
        for _ in 0..3 {
            timer.next();
        }
        timer.warn("something odd");
        timer.stop("inner");
        assert_eq!(timer.warnings(), &["something odd".to_string()]);
        timer.done();
    }
}
