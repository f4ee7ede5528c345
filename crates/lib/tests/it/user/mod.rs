//! User service tests, organized by flow.

mod create;
mod dbs;
mod lockout;
mod logout;
mod sessions;
