pub mod email;
pub mod magic_link;
pub mod session;
