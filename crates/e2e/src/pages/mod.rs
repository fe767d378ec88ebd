//! Page objects for the areas of the web UI the scenarios touch.
//!
//! Each type borrows the session's [`Page`](crate::page::Page) and exposes
//! typed queries and actions; selector strings live only here.

mod files;
mod login;
mod viewer;

pub use files::FileList;
pub use login::{LoginForm, UserMenu};
pub use viewer::{MediaKind, Viewer};
