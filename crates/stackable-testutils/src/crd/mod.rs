//! Custom resources of third-party operators that tests assert on.

pub mod alertmanager_config;
