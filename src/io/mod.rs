pub mod csv;

pub use csv::{write_telemetry, write_telemetry_file};
