pub mod authz;
pub mod grants;
pub mod health;
