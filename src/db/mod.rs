pub mod companies;
pub mod identities;
pub mod profiles;
pub mod projects;
pub mod refresh_tokens;
pub mod tasks;
