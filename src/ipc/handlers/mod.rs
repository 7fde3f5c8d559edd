pub mod announcements;
pub mod assessments;
pub mod core;
pub mod halaqah;
pub mod import;
pub mod setoran;
pub mod setup;
pub mod students;
pub mod wali;
