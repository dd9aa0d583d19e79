pub mod auth;
pub mod health;
pub mod mcp;
pub mod oauth;
pub mod security;
pub mod well_known;
