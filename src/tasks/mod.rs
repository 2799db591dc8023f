pub mod gps_task;
pub mod telemetry_task;
