pub mod bearer;
pub mod issuer;
