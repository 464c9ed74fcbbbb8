pub use super::analyses::Entity as Analyses;
pub use super::users::Entity as Users;
