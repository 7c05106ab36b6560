/// Exit statuses of the planner stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerExit {
    PlanFound,
    CriticalError,
    InputError,
    Unsupported,
    Unsolvable,
    UnsolvedIncomplete,
    OutOfMemory,
    Timeout,
    TimeoutAndMemory,
}

impl PlannerExit {
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => PlannerExit::PlanFound,
            1 => PlannerExit::CriticalError,
            2 => PlannerExit::InputError,
            3 => PlannerExit::Unsupported,
            4 => PlannerExit::Unsolvable,
            5 => PlannerExit::UnsolvedIncomplete,
            6 => PlannerExit::OutOfMemory,
            7 => PlannerExit::Timeout,
            8 => PlannerExit::TimeoutAndMemory,
            _ => return None,
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            PlannerExit::PlanFound => "plan found",
            PlannerExit::CriticalError => "critical error",
            PlannerExit::InputError => "input error",
            PlannerExit::Unsupported => "unsupported feature requested",
            PlannerExit::Unsolvable => "task is provably unsolvable",
            PlannerExit::UnsolvedIncomplete => "search ended without finding a solution",
            PlannerExit::OutOfMemory => "out of memory",
            PlannerExit::Timeout => "timeout",
            PlannerExit::TimeoutAndMemory => "timeout and out of memory",
        }
    }
}

/// Human-readable reason for a non-zero exit.
pub fn describe(code: i32) -> String {
    match PlannerExit::from_code(code) {
        Some(exit) => format!("exit code {code} ({})", exit.description()),
        None => format!("exit code {code}"),
    }
}
