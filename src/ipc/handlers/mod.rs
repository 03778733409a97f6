pub mod core;
pub mod groups;
pub mod profiles;
pub mod quizzes;
pub mod reports;
pub mod sessions;
pub mod trash;
