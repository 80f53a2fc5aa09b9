pub mod dataset_analyzer;
pub mod flag_plotter;

pub use dataset_analyzer::{DatasetAnalyzer, DatasetStatistics, VariableStats};
pub use flag_plotter::FlagPlotter;
