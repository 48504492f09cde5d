//! Myo-Simulation: synthetic plate recordings
//!
//! Deterministic (seeded) force waveforms and raw magnetometer arrays for
//! exercising calibration, detection and metrics without instrument files.

pub mod flux;
pub mod plate_simulator;
pub mod twitch_patterns;

pub use flux::{millitesla_to_memsic_counts, synthesize_memsic_plate, MemsicPlate, MemsicSimConfig, PointDipole};
pub use plate_simulator::{NoiseConfig, PlateSimConfig, PlateSimulator};
pub use twitch_patterns::TwitchPattern;
