//! Completion Detector.
//!
//! Evaluated at the start of every turn, before the model is asked anything.

use std::sync::Arc;

use sandpiper_core::message::{Message, Role};
use sandpiper_core::session::SessionState;

use crate::history::LoopReport;
use crate::policy::{OutcomeSignals, SignalPolicy};
use crate::prompts;

/// What the loop should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Ask the model with tools bound, as usual.
    Continue,
    /// Make one tool-less call with the completion-forcing prompt, then stop.
    ForceSummary { reason: ForceReason },
    /// The last response already carried the summary block.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceReason {
    /// A clean write marked the main task complete.
    TaskCompleted,
    /// A terminal repetition loop after a completion signal.
    LoopAfterSuccess,
}

impl std::fmt::Display for ForceReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TaskCompleted => "task_completed",
            Self::LoopAfterSuccess => "loop_after_success",
        })
    }
}

pub struct CompletionDetector {
    /// Tool results scanned for a completion signal.
    completion_lookback: usize,
    signals: Arc<dyn SignalPolicy>,
}

impl Default for CompletionDetector {
    fn default() -> Self {
        Self::new(20)
    }
}

impl CompletionDetector {
    pub fn new(completion_lookback: usize) -> Self {
        Self {
            completion_lookback,
            signals: Arc::new(OutcomeSignals),
        }
    }

    pub fn with_signals(mut self, signals: Arc<dyn SignalPolicy>) -> Self {
        self.signals = signals;
        self
    }

    /// Decide the next step, in priority order.
    pub fn evaluate(
        &self,
        last_response: Option<&Message>,
        state: &SessionState,
        report: &LoopReport,
        log: &[Message],
    ) -> Verdict {
        if last_response.is_some_and(prompts::is_terminal_response) {
            return Verdict::Stop;
        }

        if state.ready_to_summarize() {
            return Verdict::ForceSummary {
                reason: ForceReason::TaskCompleted,
            };
        }

        if report.detected && report.terminal {
            if self.recent_completion_signal(state, log) {
                return Verdict::ForceSummary {
                    reason: ForceReason::LoopAfterSuccess,
                };
            }
            tracing::warn!(
                class = ?report.class,
                run_length = report.run_length,
                "Terminal repetition loop with no completion signal; continuing"
            );
        }

        Verdict::Continue
    }

    /// A completion signal among the latest tool results of the current task.
    fn recent_completion_signal(&self, state: &SessionState, log: &[Message]) -> bool {
        let start = state.task_start.min(log.len());
        log[start..]
            .iter()
            .rev()
            .filter(|m| m.role == Role::Tool)
            .take(self.completion_lookback)
            .any(|m| self.signals.is_completion_signal(m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{LoopClass, LoopRules, detect_repetition_loop};
    use sandpiper_core::message::MessageToolCall;
    use sandpiper_core::tool::ToolOutcome;

    fn build_pair(i: usize) -> [Message; 2] {
        let id = format!("c{i}");
        [
            Message::assistant_with_calls(
                "",
                vec![MessageToolCall {
                    id: id.clone(),
                    name: "run_command".into(),
                    arguments: r#"{"command":"npm run build"}"#.into(),
                }],
            ),
            Message::tool_result(id, "run_command", "[exit code: 1]\nerror TS2304")
                .with_outcome(ToolOutcome::CommandFailed),
        ]
    }

    fn looping_log(with_success: bool) -> Vec<Message> {
        let mut log = vec![Message::user("add a footer")];
        if with_success {
            log.push(Message::assistant_with_calls(
                "",
                vec![MessageToolCall {
                    id: "w".into(),
                    name: "write_files".into(),
                    arguments: r#"{"files":[{"path":"src/Footer.tsx","content":"x"}]}"#.into(),
                }],
            ));
            log.push(
                Message::tool_result("w", "write_files", "Successfully wrote 1 file(s): src/Footer.tsx")
                    .with_outcome(ToolOutcome::WriteSuccess),
            );
        }
        for i in 0..6 {
            log.extend(build_pair(i));
        }
        log
    }

    fn verdict(log: &[Message], state: &SessionState) -> Verdict {
        let report = detect_repetition_loop(log, LoopRules::default(), &OutcomeSignals);
        CompletionDetector::default().evaluate(log.last(), state, &report, log)
    }

    #[test]
    fn summary_marker_stops() {
        let reply = Message::assistant(format!("{}\ndone\n{}", prompts::SUMMARY_START, prompts::SUMMARY_END));
        let v = CompletionDetector::default().evaluate(
            Some(&reply),
            &SessionState::new(),
            &LoopReport::none(),
            &[],
        );
        assert_eq!(v, Verdict::Stop);
    }

    #[test]
    fn completed_task_forces_summary() {
        let mut state = SessionState::new();
        state.main_task_completed = true;
        let v = CompletionDetector::default().evaluate(None, &state, &LoopReport::none(), &[]);
        assert_eq!(
            v,
            Verdict::ForceSummary {
                reason: ForceReason::TaskCompleted
            }
        );
    }

    #[test]
    fn pending_write_errors_keep_going() {
        let mut state = SessionState::new();
        state.main_task_completed = true;
        state.has_pending_write_errors = true;
        let v = CompletionDetector::default().evaluate(None, &state, &LoopReport::none(), &[]);
        assert_eq!(v, Verdict::Continue);
    }

    #[test]
    fn terminal_loop_after_success_forces_summary() {
        let log = looping_log(true);
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.terminal);
        assert_eq!(report.class, Some(LoopClass::ToolResult));
        assert_eq!(
            verdict(&log, &SessionState::new()),
            Verdict::ForceSummary {
                reason: ForceReason::LoopAfterSuccess
            }
        );
    }

    #[test]
    fn terminal_loop_without_success_continues() {
        let log = looping_log(false);
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected && report.terminal);
        assert_eq!(verdict(&log, &SessionState::new()), Verdict::Continue);
    }

    #[test]
    fn signal_from_previous_task_does_not_count() {
        let mut log = looping_log(true);
        let task_start = log.len();
        log.push(Message::user("add a dark mode toggle"));
        for i in 10..16 {
            log.extend(build_pair(i));
        }
        let mut state = SessionState::new();
        state.reset_for_new_task(task_start);

        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        assert!(report.detected && report.terminal);
        assert_eq!(
            verdict(&log, &SessionState::new()),
            Verdict::ForceSummary {
                reason: ForceReason::LoopAfterSuccess
            }
        );
        assert_eq!(verdict(&log, &state), Verdict::Continue);
    }

    #[test]
    fn signal_outside_lookback_does_not_count() {
        let log = looping_log(true);
        let report = detect_repetition_loop(&log, LoopRules::default(), &OutcomeSignals);
        let v = CompletionDetector::new(3).evaluate(log.last(), &SessionState::new(), &report, &log);
        assert_eq!(v, Verdict::Continue);
    }
}
