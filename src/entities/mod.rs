pub mod prelude;

pub mod analyses;
pub mod users;
