use clap::ValueEnum;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeMode {
    /// As the scenario says
    Auto,
    /// Record random ranges during full downloads
    Generate,
    /// Replay recorded ranges and verify them
    Replay,
    /// Full timed downloads only
    Off,
}
