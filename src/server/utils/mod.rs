pub mod password_utils;
pub mod signature_utils;
pub mod token_utils;
