pub mod bulletin;
pub mod calc;
pub mod core;
pub mod grades;
pub mod settings;
