pub mod appreciations;
pub mod core;
pub mod curriculum;
pub mod directory;
pub mod finance;
pub mod grades;
pub mod promotion;
pub mod reports;
