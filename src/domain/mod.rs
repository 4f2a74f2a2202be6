pub mod calibration;
pub mod models;
pub mod motor;
pub mod registry;
pub mod settings;
