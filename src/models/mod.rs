pub mod company;
pub mod identity;
pub mod profile;
pub mod project;
pub mod refresh_token;
pub mod task;

pub use company::Company;
pub use identity::{Identity, IdentityCredentials, IdentityMetadata};
pub use profile::{CompanyId, Profile, ProfileRow, Role};
pub use project::{NewProject, Project, ProjectChanges, ProjectInput};
pub use refresh_token::RefreshToken;
pub use task::{NewTask, Task, TaskChanges, TaskInput, TaskStatus};
