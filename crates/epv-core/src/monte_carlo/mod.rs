pub mod distributions;
pub mod simulation;
