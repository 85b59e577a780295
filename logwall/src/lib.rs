//! Terminal follower for a logwall agent: prints the live log stream the way
//! `tail -f` prints several files, optionally with host stats.

pub mod cli;
pub mod profiles;
pub mod render;
pub mod types;
pub mod ws;
