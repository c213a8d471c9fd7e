//! taskdesk - task tracking with role-gated views
//!
//! This library provides the core of the taskdesk CLI: sessions, profile
//! lookup, the route guard, the task status machine and the query composer
//! that turns view filters into backend queries.
//!
//! # Core Concepts
//!
//! - **Sessions**: the current sign-in, plus change notifications
//! - **Profiles**: role and department for an identity, looked up per check
//! - **Route Guard**: decides Checking, Denied or Authorized for a route
//! - **Tasks**: pending, then in-progress, then completed; never backwards
//! - **Queries**: date, priority, status and owner filters over a scope
//!
//! # Module Organization
//!
//! - `backend`: the `Backend` trait with in-memory and file-backed stores
//! - `session`: session store and auth listeners
//! - `profile`: roles and the profile resolver
//! - `guard`: routes, the guard state machine and navigation
//! - `task`: task model, status transitions and the task service
//! - `filter`: filter sets, scopes and query composition
//! - `app`: wires the services together for one client
//! - `dashboard`, `report`, `announcement`: the views built on top
//! - `cli`: command-line interface using clap
//! - `config`: configuration loading from `taskdesk.toml`
//! - `events`: JSONL event stream
//! - `lock`: file locking and atomic writes for the local store

pub mod announcement;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod events;
pub mod filter;
pub mod guard;
pub mod lock;
pub mod output;
pub mod profile;
pub mod report;
pub mod session;
pub mod task;

pub use error::{Error, Result};
