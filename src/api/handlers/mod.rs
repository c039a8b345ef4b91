mod areas;
mod auth;
mod files;
mod health;
mod links;

pub use areas::list_areas;
pub use auth::{
    check_recovery_token, current_session, login, logout, request_recovery, reset_password,
};
pub use files::{create_file, delete_file, download_file, file_grid, list_files, update_file};
pub use health::health;
pub use links::{create_link, delete_link, list_links, update_link};
