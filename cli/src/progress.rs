use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use flowpilot_core::api::{FlowProgress, FlowSnapshot, FlowStatus, ProgressTracker, Task, TaskStatus};

const OVERALL_TEMPLATE: &str =
    "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}";
const TASK_TEMPLATE: &str = "  {spinner:.green} {msg}";
const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Terminal progress for one flow.
///
/// Draws an overall bar plus one spinner per in-flight task. The overall
/// length tracks the task count, which grows when follow-ups arrive.
pub struct ProgressMonitor {
    enabled: bool,
    state: Mutex<MonitorState>,
}

struct MonitorState {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: HashMap<String, ProgressBar>,
    finished: bool,
}

impl ProgressMonitor {
    /// `enabled = false` keeps every bar hidden, e.g. when stderr is not a TTY.
    pub fn new(enabled: bool) -> Self {
        let multi = if enabled {
            MultiProgress::new()
        } else {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        };
        let overall = if enabled {
            multi.add(ProgressBar::new(0))
        } else {
            ProgressBar::hidden()
        };
        overall.set_style(
            ProgressStyle::default_bar()
                .template(OVERALL_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        overall.set_message("planning...");

        Self {
            enabled,
            state: Mutex::new(MonitorState {
                multi,
                overall,
                task_bars: HashMap::new(),
                finished: false,
            }),
        }
    }

    #[cfg(test)]
    fn active_spinners(&self) -> usize {
        self.state.lock().map(|s| s.task_bars.len()).unwrap_or(0)
    }

    #[cfg(test)]
    fn position(&self) -> (u64, Option<u64>) {
        self.state
            .lock()
            .map(|s| (s.overall.position(), s.overall.length()))
            .unwrap_or((0, None))
    }
}

fn spinner(multi: &MultiProgress, task: &Task, enabled: bool) -> ProgressBar {
    let bar = if enabled {
        multi.add(ProgressBar::new_spinner())
    } else {
        ProgressBar::hidden()
    };
    bar.set_style(
        ProgressStyle::default_spinner()
            .template(TASK_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_message(format!("⏳ {} {}", task.id, task.title));
    if enabled {
        bar.enable_steady_tick(Duration::from_millis(100));
    }
    bar
}

fn task_line(task: &Task) -> String {
    let icon = match task.status {
        TaskStatus::Completed => "✅",
        TaskStatus::Failed => "❌",
        TaskStatus::Cancelled => "⛔",
        _ => "⏭",
    };
    let elapsed = match (task.started_at, task.completed_at) {
        (Some(start), Some(end)) => format!(" ({}ms)", (end - start).num_milliseconds().max(0)),
        _ => String::new(),
    };
    format!("{icon} {} {}{elapsed}", task.id, task.title)
}

fn overall_message(status: FlowStatus, progress: &FlowProgress) -> String {
    match status {
        FlowStatus::Idle | FlowStatus::Planning => "planning...".to_string(),
        FlowStatus::Running => format!("{} running", progress.in_progress),
        FlowStatus::Paused => "paused".to_string(),
        FlowStatus::Completed => "✅ flow completed".to_string(),
        FlowStatus::Failed => "❌ flow failed".to_string(),
        FlowStatus::Cancelled => "⛔ flow cancelled".to_string(),
    }
}

impl ProgressTracker for ProgressMonitor {
    fn on_snapshot(&self, snapshot: &FlowSnapshot) {
        let Ok(mut guard) = self.state.lock() else {
            return;
        };
        let state = &mut *guard;
        if state.finished {
            return;
        }

        for task in &snapshot.tasks {
            if task.status == TaskStatus::InProgress && !state.task_bars.contains_key(&task.id) {
                let bar = spinner(&state.multi, task, self.enabled);
                state.task_bars.insert(task.id.clone(), bar);
            } else if task.status.is_terminal() {
                if let Some(bar) = state.task_bars.remove(&task.id) {
                    bar.finish_with_message(task_line(task));
                }
            }
        }

        let progress = FlowProgress::from_snapshot(snapshot);
        state.overall.set_length(progress.total as u64);
        state.overall.set_position(progress.finished() as u64);
        state
            .overall
            .set_message(overall_message(snapshot.flow.status, &progress));

        if snapshot.flow.status.is_terminal() {
            // Tasks still spinning here were cut off by the stop.
            for (_, bar) in state.task_bars.drain() {
                bar.finish_and_clear();
            }
            state
                .overall
                .finish_with_message(overall_message(snapshot.flow.status, &progress));
            state.finished = true;
        }
    }
}

impl Drop for ProgressMonitor {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            for (_, bar) in state.task_bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}
