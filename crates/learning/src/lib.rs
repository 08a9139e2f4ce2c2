pub mod calibrator;
pub mod tracker;
