use std::io::Write;
use std::sync::Mutex;

use mangaba_core::traits::StatusObserver;
use mangaba_core::types::{ExecutionStep, StepStatus};

/// Prints one line per step transition.
///
/// Runs synchronously inside the executor, so no transition can be dropped
/// the way a lagging broadcast receiver drops events.
pub struct ProgressPrinter<W> {
    out: Mutex<(W, Vec<StepStatus>)>,
}

impl<W: Write + Send> ProgressPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new((out, Vec::new())),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok((w, _)) => w,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

impl<W: Write + Send> StatusObserver for ProgressPrinter<W> {
    fn on_update(&self, steps: &[ExecutionStep]) {
        let Ok(mut guard) = self.out.lock() else {
            return;
        };
        let (out, seen) = &mut *guard;
        seen.resize(steps.len(), StepStatus::Pending);

        for (step, last) in steps.iter().zip(seen.iter_mut()) {
            if step.status == *last {
                continue;
            }
            *last = step.status;
            let _ = match (&step.status, &step.error) {
                (StepStatus::Error, Some(err)) => {
                    writeln!(out, "[{}: error] {}", step.node_id, err)
                }
                (status, _) => writeln!(out, "[{}: {}]", step.node_id, status),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(id: &str, status: StepStatus) -> ExecutionStep {
        let mut step = ExecutionStep::pending(id);
        step.status = status;
        step
    }

    #[test]
    fn prints_each_transition_once() {
        let printer = ProgressPrinter::new(Vec::new());
        printer.on_update(&[step("a", StepStatus::Running), step("b", StepStatus::Pending)]);
        printer.on_update(&[step("a", StepStatus::Completed), step("b", StepStatus::Pending)]);
        let mut failed = step("b", StepStatus::Error);
        failed.error = Some("Unknown node type: x".into());
        printer.on_update(&[step("a", StepStatus::Completed), failed]);

        let text = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(
            text,
            "[a: running]\n[a: completed]\n[b: error] Unknown node type: x\n"
        );
    }

    #[test]
    fn long_runs_lose_no_transitions() {
        let printer = ProgressPrinter::new(Vec::new());
        let mut steps: Vec<_> = (0..300).map(|i| step(&format!("n{i}"), StepStatus::Pending)).collect();
        for i in 0..steps.len() {
            steps[i].status = StepStatus::Running;
            printer.on_update(&steps);
            steps[i].status = StepStatus::Completed;
            printer.on_update(&steps);
        }
        let text = String::from_utf8(printer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 600);
    }
}
