//! Classification of a finished child into a status code and a reply stream.

/// Offset added to a signal number to form a status code, as shells do.
pub const SIGNAL_STATUS_BASE: i32 = 128;
/// Synthetic status when the requested program does not exist.
pub const STATUS_NOT_FOUND: i32 = 127;
/// Synthetic status when the program exists but could not be run.
pub const STATUS_CANNOT_EXECUTE: i32 = 126;

/// How the child process ended, as reported by the final reap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
}

/// Which capture target is relayed back to the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitReport {
    pub termination: Termination,
    /// The deadline elapsed and the child was killed.
    pub timed_out: bool,
}

impl ExitReport {
    pub fn status_code(&self) -> i32 {
        match self.termination {
            Termination::Exited(code) => code,
            Termination::Signaled(signal) => SIGNAL_STATUS_BASE + signal,
        }
    }

    /// Stdout only for a clean, successful exit; stderr for everything else.
    pub fn selected_stream(&self) -> Stream {
        match self.termination {
            Termination::Exited(0) if !self.timed_out => Stream::Stdout,
            _ => Stream::Stderr,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(termination: Termination, timed_out: bool) -> ExitReport {
        ExitReport {
            termination,
            timed_out,
        }
    }

    #[test]
    fn success_selects_stdout() {
        let report = report(Termination::Exited(0), false);
        assert_eq!(report.status_code(), 0);
        assert_eq!(report.selected_stream(), Stream::Stdout);
    }

    #[test]
    fn non_zero_exit_selects_stderr() {
        let report = report(Termination::Exited(1), false);
        assert_eq!(report.status_code(), 1);
        assert_eq!(report.selected_stream(), Stream::Stderr);
    }

    #[test]
    fn signal_death_reports_shell_style_code() {
        let report = report(Termination::Signaled(9), true);
        assert_eq!(report.status_code(), 137);
        assert_eq!(report.selected_stream(), Stream::Stderr);
    }

    #[test]
    fn clean_exit_racing_the_deadline_still_counts_as_killed() {
        let report = report(Termination::Exited(0), true);
        assert_eq!(report.selected_stream(), Stream::Stderr);
    }
}
