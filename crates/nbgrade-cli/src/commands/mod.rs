pub mod check;
pub mod exercise;
pub mod grade;
