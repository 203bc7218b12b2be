pub mod project;

pub use project::{DeleteSemantics, ProjectResource};
