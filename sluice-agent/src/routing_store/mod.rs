//! Routing stores the agent can drive.

pub mod proxysql;
