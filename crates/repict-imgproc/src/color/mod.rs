mod gray;
pub use gray::*;
