pub mod exit;
pub mod status;
pub mod ui;
