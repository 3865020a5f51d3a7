pub mod jwt;
pub mod time;

pub use jwt::{parse_token, token_expires_in, ParsedToken};
pub use time::now_millis;
